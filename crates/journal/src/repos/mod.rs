//! Typed repositories over the journal.
//!
//! Each repository is implemented for every [`Journal`](crate::Journal), so
//! callers holding an `Arc<dyn Journal>` get the typed methods directly.

pub mod datasets;
pub mod subprojects;
pub mod tenants;

pub use datasets::{ContentMode, DatasetListing, DatasetPage, DatasetRepo, DirectoryContent};
pub use subprojects::SubprojectRepo;
pub use tenants::TenantRepo;

use crate::error::JournalResult;
use crate::journal::Journal;
use crate::key::Entity;
use crate::query::Query;

/// Page size used when a repository drains a whole query.
pub(crate) const DRAIN_PAGE_SIZE: usize = 500;

/// Run `query` to exhaustion, following cursors.
pub(crate) async fn drain<J: Journal + ?Sized>(
    journal: &J,
    query: Query,
) -> JournalResult<Vec<Entity>> {
    let base = query.limit(DRAIN_PAGE_SIZE);
    let mut next = base.clone();
    let mut out = Vec::new();
    loop {
        let page = journal.run_query(&next).await?;
        out.extend(page.entities);
        match page.end_cursor {
            Some(cursor) => next = base.clone().start(cursor),
            None => return Ok(out),
        }
    }
}

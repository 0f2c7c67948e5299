//! Dataset records, one namespace per subproject.
//!
//! A dataset is stored under the name `{path}{name}`, so two datasets with the
//! same name in different directories never collide.

use super::drain;
use crate::error::{JournalError, JournalResult};
use crate::journal::Journal;
use crate::key::{DATASETS_KIND, Entity, Key};
use crate::query::{FilterOp, Query};
use async_trait::async_trait;
use sdms_core::{DatasetId, DatasetRecord, dataset_namespace};

fn dataset_key<J: Journal + ?Sized>(
    journal: &J,
    tenant: &str,
    subproject: &str,
    path: &str,
    name: &str,
) -> Key {
    journal.create_key(
        &dataset_namespace(tenant, subproject),
        DATASETS_KIND,
        &format!("{path}{name}"),
    )
}

fn record_key<J: Journal + ?Sized>(journal: &J, record: &DatasetRecord) -> Key {
    dataset_key(
        journal,
        &record.tenant,
        &record.subproject,
        &record.path,
        &record.name,
    )
}

fn id_key<J: Journal + ?Sized>(journal: &J, id: &DatasetId) -> Key {
    dataset_key(journal, id.tenant(), id.subproject(), id.path(), id.name())
}

/// Options for a paginated dataset listing.
#[derive(Clone, Debug, Default)]
pub struct DatasetListing {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    /// Only datasets carrying every one of these tags.
    pub gtags: Vec<String>,
}

/// One page of datasets.
#[derive(Clone, Debug, Default)]
pub struct DatasetPage {
    pub datasets: Vec<DatasetRecord>,
    pub next_cursor: Option<String>,
}

/// What a content listing returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentMode {
    #[default]
    All,
    Datasets,
    Directories,
}

/// Dataset names and immediate sub-directories of one path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryContent {
    pub datasets: Vec<String>,
    /// Directory names relative to the listed path, each ending in `/`.
    pub directories: Vec<String>,
}

/// Repository for datasets.
#[async_trait]
pub trait DatasetRepo: Send + Sync {
    async fn get_dataset(&self, id: &DatasetId) -> JournalResult<Option<DatasetRecord>>;

    /// Insert or overwrite a dataset.
    async fn save_dataset(&self, record: &DatasetRecord) -> JournalResult<()>;

    /// Insert a dataset, failing with `AlreadyExists` if the key is taken.
    async fn insert_dataset(&self, record: &DatasetRecord) -> JournalResult<()>;

    /// Delete a dataset record. Returns whether it existed.
    async fn delete_dataset(&self, id: &DatasetId) -> JournalResult<bool>;

    async fn dataset_exists(&self, id: &DatasetId) -> JournalResult<bool>;

    /// List the datasets of a subproject, one page at a time.
    async fn list_datasets(
        &self,
        tenant: &str,
        subproject: &str,
        listing: &DatasetListing,
    ) -> JournalResult<DatasetPage>;

    /// List the datasets directly in `path` and the directories below it.
    async fn list_content(
        &self,
        tenant: &str,
        subproject: &str,
        path: &str,
        mode: ContentMode,
    ) -> JournalResult<DirectoryContent>;

    /// Delete every dataset record of a subproject. Returns the count removed.
    async fn delete_all_datasets(&self, tenant: &str, subproject: &str) -> JournalResult<u64>;
}

#[async_trait]
impl<J: Journal + ?Sized> DatasetRepo for J {
    async fn get_dataset(&self, id: &DatasetId) -> JournalResult<Option<DatasetRecord>> {
        match self.get(&id_key(self, id)).await? {
            Some(entity) => Ok(Some(entity.to_record()?)),
            None => Ok(None),
        }
    }

    async fn save_dataset(&self, record: &DatasetRecord) -> JournalResult<()> {
        let entity = Entity::from_record(record_key(self, record), record)?;
        self.save(&entity).await
    }

    async fn insert_dataset(&self, record: &DatasetRecord) -> JournalResult<()> {
        let entity = Entity::from_record(record_key(self, record), record)?;
        self.insert(&entity).await
    }

    async fn delete_dataset(&self, id: &DatasetId) -> JournalResult<bool> {
        self.delete(&id_key(self, id)).await
    }

    async fn dataset_exists(&self, id: &DatasetId) -> JournalResult<bool> {
        Ok(self.get(&id_key(self, id)).await?.is_some())
    }

    async fn list_datasets(
        &self,
        tenant: &str,
        subproject: &str,
        listing: &DatasetListing,
    ) -> JournalResult<DatasetPage> {
        let mut query = Query::new(dataset_namespace(tenant, subproject), DATASETS_KIND);
        for tag in &listing.gtags {
            query = query.filter("gtags", FilterOp::Contains, tag.as_str());
        }
        if let Some(cursor) = &listing.cursor {
            query = query.start(cursor.as_str());
        }
        if let Some(limit) = listing.limit {
            query = query.limit(limit);
        }

        let page = self.run_query(&query).await?;
        let datasets = page
            .entities
            .iter()
            .map(|e| e.to_record::<DatasetRecord>().map_err(JournalError::from))
            .collect::<JournalResult<Vec<_>>>()?;
        Ok(DatasetPage {
            datasets,
            next_cursor: page.end_cursor,
        })
    }

    async fn list_content(
        &self,
        tenant: &str,
        subproject: &str,
        path: &str,
        mode: ContentMode,
    ) -> JournalResult<DirectoryContent> {
        let namespace = dataset_namespace(tenant, subproject);
        let mut content = DirectoryContent::default();

        if mode != ContentMode::Directories {
            let query = Query::new(&namespace, DATASETS_KIND)
                .filter("path", FilterOp::Eq, path)
                .select(["name"]);
            content.datasets = drain(self, query)
                .await?
                .into_iter()
                .filter_map(|e| e.data.get("name").and_then(|v| v.as_str()).map(String::from))
                .collect();
        }

        if mode != ContentMode::Datasets {
            let query = Query::new(&namespace, DATASETS_KIND)
                .filter("path", FilterOp::Prefix, path)
                .select(["path"]);
            for entity in drain(self, query).await? {
                let Some(nested) = entity.data.get("path").and_then(|v| v.as_str()) else {
                    continue;
                };
                let Some(rest) = nested.strip_prefix(path) else {
                    continue;
                };
                if let Some(end) = rest.find('/') {
                    let dir = &rest[..=end];
                    if !content.directories.iter().any(|d| d == dir) {
                        content.directories.push(dir.to_string());
                    }
                }
            }
        }

        Ok(content)
    }

    async fn delete_all_datasets(&self, tenant: &str, subproject: &str) -> JournalResult<u64> {
        let query = Query::new(dataset_namespace(tenant, subproject), DATASETS_KIND).select(["name"]);
        let mut deleted = 0;
        for entity in drain(self, query).await? {
            if self.delete(&entity.key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

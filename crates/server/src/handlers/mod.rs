//! HTTP request handlers.

pub mod blob;
pub mod common;
pub mod dataset;
pub mod status;
pub mod subproject;
pub mod tenant;

pub use blob::*;
pub use dataset::*;
pub use status::*;
pub use subproject::*;
pub use tenant::*;

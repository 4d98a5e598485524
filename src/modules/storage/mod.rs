//! Storage module for file management
//!
//! Uploaded originals and generated previews on the local filesystem,
//! served back under `/static`.

mod local_storage;

pub use local_storage::{LocalStorage, RESULTS_URL_PREFIX, UPLOADS_URL_PREFIX};

mod common;
mod data_sources;
mod document_versions;

pub use data_sources::SqliteDataSourceRepo;
pub use document_versions::SqliteDocumentVersionRepo;

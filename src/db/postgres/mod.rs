mod data_sources;
mod document_versions;

pub use data_sources::PostgresDataSourceRepo;
pub use document_versions::PostgresDocumentVersionRepo;

mod data_sources;
mod document_versions;

pub use data_sources::*;
pub use document_versions::*;

mod data_source;
mod document_version;

pub use data_source::*;
pub use document_version::*;

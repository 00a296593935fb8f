use serde::{Deserialize, Serialize};

/// A document source, owner of document versions.
///
/// Immutable once created. `internal_id` is the externally stable identifier
/// that appears in blob paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: i64,
    pub project_id: i64,
    pub internal_id: String,
}

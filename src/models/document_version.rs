use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a document version.
///
/// - `active`: the live version of a document
/// - `deleted`: marked deleted by the write path, waiting to be scrubbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    #[default]
    Active,
    Deleted,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Active => "active",
            VersionStatus::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for VersionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(VersionStatus::Active),
            "deleted" => Ok(VersionStatus::Deleted),
            _ => Err(format!("Invalid version status: {}", s)),
        }
    }
}

/// One row of the `document_versions` table.
///
/// Several rows of the same document may share a `hash` when identical content
/// is uploaded more than once; they all address the same blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: i64,
    pub data_source_id: i64,
    /// Logical document key, stable across versions.
    pub document_id: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Digest of the version's content.
    pub hash: String,
    pub status: VersionStatus,
}

impl DocumentVersion {
    pub fn is_live(&self) -> bool {
        self.status == VersionStatus::Active
    }

    /// The scrub unit this version belongs to.
    pub fn scrub_unit(&self) -> ScrubUnit {
        ScrubUnit {
            data_source_id: self.data_source_id,
            document_id: self.document_id.clone(),
            hash: self.hash.clone(),
        }
    }
}

/// The `(data_source_id, document_id, hash)` triple a scrub decision is made for.
///
/// Exists only for the duration of a scrub run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScrubUnit {
    pub data_source_id: i64,
    pub document_id: String,
    pub hash: String,
}

impl fmt::Display for ScrubUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.data_source_id, self.document_id, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_status_round_trips_through_str() {
        for status in [VersionStatus::Active, VersionStatus::Deleted] {
            assert_eq!(status.as_str().parse::<VersionStatus>().unwrap(), status);
        }
        assert!("archived".parse::<VersionStatus>().is_err());
    }

    #[test]
    fn test_scrub_unit_from_version() {
        let version = DocumentVersion {
            id: 7,
            data_source_id: 3,
            document_id: "doc-42".to_string(),
            created_at: 100,
            hash: "h1".to_string(),
            status: VersionStatus::Deleted,
        };

        let unit = version.scrub_unit();
        assert_eq!(unit.data_source_id, 3);
        assert_eq!(unit.document_id, "doc-42");
        assert_eq!(unit.hash, "h1");
        assert_eq!(unit.to_string(), "3:doc-42:h1");
        assert!(!version.is_live());
    }
}

//! Blob path layout for document content.
//!
//! Every version's blobs live under
//! `{project_id}/{internal_id}/{blake3_hex(document_id)}/{hash}/`. Document
//! IDs are arbitrary user strings, so they are hashed before landing in a path.

/// Lowercase hex BLAKE3 digest of a document ID.
///
/// Must match the digest the ingestion write path uses, or listings will miss
/// the blobs they are supposed to clean up.
pub fn document_id_hash(document_id: &str) -> String {
    blake3::hash(document_id.as_bytes()).to_hex().to_string()
}

/// Resolve the storage path that holds every blob of one document version.
pub fn resolve_blob_path(
    project_id: i64,
    internal_id: &str,
    document_id: &str,
    hash: &str,
) -> String {
    format!(
        "{}/{}/{}/{}",
        project_id,
        internal_id,
        document_id_hash(document_id),
        hash
    )
}

/// Prefix to list for a resolved path.
///
/// The trailing separator keeps hash `h1` from matching objects under `h10`.
pub fn listing_prefix(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_hash_is_blake3_hex() {
        // BLAKE3 of the empty input
        assert_eq!(
            document_id_hash(""),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );

        let digest = document_id_hash("doc-42");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_eq!(digest, document_id_hash("doc-42"));
        assert_ne!(digest, document_id_hash("doc-43"));
    }

    #[test]
    fn test_resolve_blob_path() {
        let path = resolve_blob_path(1, "i1", "doc-42", "h1");
        assert_eq!(path, format!("1/i1/{}/h1", document_id_hash("doc-42")));
    }

    #[test]
    fn test_document_ids_with_separators_stay_in_one_segment() {
        let path = resolve_blob_path(1, "i1", "../../etc/passwd", "h1");
        assert_eq!(path.split('/').count(), 4);
        assert!(!path.contains(".."));
    }

    #[test]
    fn test_listing_prefix() {
        assert_eq!(listing_prefix("1/i1/abc/h1"), "1/i1/abc/h1/");
        assert_eq!(listing_prefix("1/i1/abc/h1/"), "1/i1/abc/h1/");
    }
}

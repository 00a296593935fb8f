//! Per-run deduplication of scrub work.
//!
//! Several deleted rows can name the same unit, and several units can resolve
//! to the same blob path. The guard makes sure each is processed once per run
//! even when the units of a batch run concurrently.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::models::ScrubUnit;

/// Something a scrub run should only act on once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// A `(data_source_id, document_id, hash)` triple.
    Unit(ScrubUnit),
    /// A full blob path as returned by a listing.
    BlobPath(String),
}

impl From<ScrubUnit> for DedupKey {
    fn from(unit: ScrubUnit) -> Self {
        DedupKey::Unit(unit)
    }
}

/// Set of keys already acted on during one run.
///
/// Created fresh for every run and dropped with it; never persisted.
#[derive(Debug, Default)]
pub struct DedupGuard {
    seen: Mutex<HashSet<DedupKey>>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, key: &DedupKey) -> bool {
        self.seen.lock().contains(key)
    }

    pub fn mark_seen(&self, key: DedupKey) {
        self.seen.lock().insert(key);
    }

    /// Check-and-mark in one step. Returns `true` if the caller now owns the key.
    ///
    /// Concurrent units must use this rather than `seen` followed by
    /// `mark_seen`, which leaves a window where both observe "unseen".
    pub fn claim(&self, key: DedupKey) -> bool {
        self.seen.lock().insert(key)
    }

    /// Give a key back so a later unit in the same run may retry it.
    pub fn release(&self, key: &DedupKey) {
        self.seen.lock().remove(key);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn unit(doc: &str, hash: &str) -> DedupKey {
        DedupKey::Unit(ScrubUnit {
            data_source_id: 1,
            document_id: doc.to_string(),
            hash: hash.to_string(),
        })
    }

    #[test]
    fn test_seen_and_mark_seen() {
        let guard = DedupGuard::new();
        let key = unit("doc-42", "h1");

        assert!(!guard.seen(&key));
        guard.mark_seen(key.clone());
        assert!(guard.seen(&key));
        assert!(!guard.seen(&unit("doc-42", "h2")));
    }

    #[test]
    fn test_claim_is_exclusive_until_released() {
        let guard = DedupGuard::new();
        let path = DedupKey::BlobPath("1/i1/abc/h1/content".to_string());

        assert!(guard.claim(path.clone()));
        assert!(!guard.claim(path.clone()));

        guard.release(&path);
        assert!(guard.claim(path));
    }

    #[test]
    fn test_key_kinds_do_not_collide() {
        let guard = DedupGuard::new();
        guard.mark_seen(DedupKey::BlobPath("1:doc:h1".to_string()));

        let unit_key = DedupKey::Unit(ScrubUnit {
            data_source_id: 1,
            document_id: "doc".to_string(),
            hash: "h1".to_string(),
        });
        assert!(!guard.seen(&unit_key));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let guard = DedupGuard::new();
        let winners = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    if guard.claim(unit("doc-42", "h1")) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(guard.len(), 1);
    }
}

//! Container id generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide sequence number; makes ids unique even when two
/// creations land on the same second.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a unique container id.
///
/// Format: `sbx-{unix seconds}-{sequence}-{4 random hex chars}`. The
/// sequence guarantees in-process uniqueness; the random suffix keeps
/// container names from colliding with leftovers of a previous process
/// on the same engine.
pub fn container_id() -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let entropy: [u8; 2] = rand::random();
    format!(
        "sbx-{}-{}-{}",
        chrono::Utc::now().timestamp(),
        seq,
        hex::encode(entropy)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| container_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_ids_unique_under_concurrency() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| container_id()).collect::<Vec<_>>()))
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "duplicate id generated");
            }
        }
        assert_eq!(all.len(), 2000);
    }

    #[test]
    fn test_id_shape() {
        let id = container_id();
        assert!(id.starts_with("sbx-"));
        assert_eq!(id.split('-').count(), 4);
    }
}

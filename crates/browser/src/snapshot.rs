use sha2::{Digest, Sha256};

/// Content fingerprint used to decide whether a freshly polled snapshot
/// differs from the last one observed. A plain content hash: two snapshots
/// with equal hashes are treated as identical even if unrelated page regions
/// changed trivially, an accepted false-negative tradeoff for load.
pub fn fingerprint(snapshot: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snapshot.as_bytes());
    format!("{:x}", hasher.finalize())
}

const COMPOSING_MARKERS: [&str; 4] = ["is typing", "typing…", "typing...", "composing a reply"];

/// Cheap text heuristic for "the other party is mid-reply". Matching is
/// case-insensitive on a fixed marker list; false negatives only make the
/// watchdog slightly too eager.
pub fn suggests_remote_composing(snapshot: &str) -> bool {
    let lowered = snapshot.to_ascii_lowercase();
    COMPOSING_MARKERS.iter().any(|marker| lowered.contains(marker))
}

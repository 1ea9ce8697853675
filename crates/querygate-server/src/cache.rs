use moka::sync::Cache;
use querygate_core::ValidationError;
use sha2::{Digest, Sha256};

/// Validation verdicts keyed by statement hash. Verdicts depend only on the
/// SQL text and the process-wide policy, so they never go stale.
pub type Verdict = Result<(), ValidationError>;

pub struct ServerCaches {
    pub verdicts: Cache<String, Verdict>,
}

impl ServerCaches {
    pub fn new(max_entries: u64) -> Self {
        Self {
            verdicts: Cache::new(max_entries),
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

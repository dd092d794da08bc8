// Restart-stable numeric encoding of institution and department names
use sha2::{Digest, Sha256};

pub const AFFILIATION_DIM: usize = 2;

/// Number of buckets names are spread over
pub const AFFILIATION_BUCKETS: u64 = 100;

/// Map a name to a bucket value in `[0, 1)`.
///
/// Pure function of the string bytes; absent or blank names map to `0.0`.
#[inline]
pub fn stable_bucket(name: Option<&str>) -> f32 {
    let name = match name {
        Some(name) if !name.trim().is_empty() => name,
        _ => return 0.0,
    };

    let digest = Sha256::digest(name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(prefix) % AFFILIATION_BUCKETS;
    bucket as f32 / AFFILIATION_BUCKETS as f32
}

/// Write `[institution, department]` into `out`
#[inline]
pub fn encode_affiliation(institution: Option<&str>, department: Option<&str>, out: &mut [f32]) {
    debug_assert_eq!(out.len(), AFFILIATION_DIM);
    out[0] = stable_bucket(institution);
    out[1] = stable_bucket(department);
}

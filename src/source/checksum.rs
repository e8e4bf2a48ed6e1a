use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Content address of a whole package.
///
/// Per-file digests are sorted before being concatenated and hashed, so the
/// result does not depend on archive entry order.
pub fn combined_checksum<S: AsRef<str>>(sums: &[S]) -> String {
    let mut sorted: Vec<&str> = sums.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sha256_hex(sorted.concat().as_bytes())
}

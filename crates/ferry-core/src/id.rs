//! Short opaque identifiers for sessions and parties.

/// Length in characters of a generated identifier.
pub const ID_LEN: usize = 6;

/// Generate a short random token: 3 random bytes, hex-encoded.
///
/// The token is a rendezvous key, not a capability secret; it only has to
/// avoid accidental collision for the lifetime of one transfer. A failing
/// randomness source is fatal to the process.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 3];
    getrandom::getrandom(&mut bytes).expect("system randomness source failed");
    hex::encode(bytes)
}

/// Whether `id` has the shape of a generated session identifier
/// (exactly [`ID_LEN`] lowercase hex characters).
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

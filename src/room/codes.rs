//! Room-code generation.

use rand::RngExt;

/// Generate an uppercase-letter room code of the requested length.
/// Uppercase-only codes are easy to read out loud at a party.
pub fn generate_room_code(length: usize) -> String {
    const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..ROOM_CODE_CHARS.len());
            ROOM_CODE_CHARS[idx] as char
        })
        .collect()
}

use rand::Rng;
use rand::rngs::OsRng;

pub const CODE_LEN: usize = 8;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random booking confirmation code, 8 chars over `[A-Z0-9]`.
///
/// Drawn from the OS entropy source. Uniqueness is enforced by the database
/// constraint; callers retry on the (negligible) collision.
pub fn generate_booking_code() -> String {
    let mut rng = OsRng;
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

//! Random identifiers.
//!
//! Driver tokens are bearer capabilities, not secrets in the cryptographic
//! sense: whoever holds the token may drive the session. Session IDs are
//! meant to be read aloud and typed, so the human alphabet drops characters
//! that are easy to confuse.

use rand::Rng;

/// Length of a driver token.
pub const DRIVER_TOKEN_LEN: usize = 16;

/// Length of a human session ID.
pub const SESSION_ID_LEN: usize = 10;

/// Prefix shared by every automated session ID.
pub const AUTOMATED_PREFIX: &str = "AUTO";

/// Number of digits after [`AUTOMATED_PREFIX`].
pub const AUTOMATED_DIGITS: usize = 6;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

// No 0/O, 1/l/I.
const SESSION_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

const DIGITS: &[u8] = b"0123456789";

fn sample<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len).map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())])).collect()
}

/// Generate a 16-character alphanumeric driver token.
pub fn generate_driver_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    sample(rng, TOKEN_ALPHABET, DRIVER_TOKEN_LEN)
}

/// Generate an automated session ID: `AUTO` followed by six digits.
pub fn generate_automated_session_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut id = String::with_capacity(AUTOMATED_PREFIX.len() + AUTOMATED_DIGITS);
    id.push_str(AUTOMATED_PREFIX);
    id.push_str(&sample(rng, DIGITS, AUTOMATED_DIGITS));
    id
}

/// Generate a 10-character human session ID.
pub fn generate_session_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    sample(rng, SESSION_ALPHABET, SESSION_ID_LEN)
}

/// Whether `session_id` has the shape of an automated session ID.
pub fn is_automated_session_id(session_id: &str) -> bool {
    session_id.len() == AUTOMATED_PREFIX.len() + AUTOMATED_DIGITS
        && session_id
            .strip_prefix(AUTOMATED_PREFIX)
            .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
}

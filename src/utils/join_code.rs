// src/utils/join_code.rs

use rand::Rng;

use crate::config::JOIN_CODE_LENGTH;

/// Upper-case letters and digits without the look-alikes 0/O, 1/I/L.
const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generates a random course join code.
pub fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    (0..JOIN_CODE_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Join codes are typed by hand, so accept lower case and stray spaces.
pub fn normalize_join_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

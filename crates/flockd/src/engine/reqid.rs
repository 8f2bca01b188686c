//! `reqid` generation: base32 of 15 random bytes, 24 characters.

use data_encoding::BASE32_NOPAD;
use rand::RngCore;

pub fn generate() -> String {
    let mut bytes = [0u8; 15];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_24_char_token() {
        let id = generate();
        assert_eq!(id.len(), 24);
    }

    #[test]
    fn generates_distinct_tokens() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }
}

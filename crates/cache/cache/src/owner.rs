use rand_core::{OsRng, RngCore};

/// Number of random bytes behind an owner token (40 hex characters).
const OWNER_TOKEN_BYTES: usize = 20;

/// Generate a fresh lock owner token.
///
/// Tokens only need to be unique across concurrent holders of the same lock
/// name; they are drawn from the operating system RNG and hex encoded.
pub fn generate_owner() -> String {
    let mut bytes = [0u8; OWNER_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn token_is_forty_lowercase_hex_chars() {
        let owner = generate_owner();
        assert_eq!(owner.len(), 40);
        assert!(
            owner
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn tokens_do_not_repeat() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_owner()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}

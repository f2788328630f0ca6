// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! 256-bit random token generation, shared by the master token and mirrored
//! from the session crate's `token::generate` (both render 32 random bytes
//! as 64 lowercase hex characters via `rand`).

use rand::RngCore;

pub fn generate() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::generate;

    #[test]
    fn generates_64_hex_chars() {
        let token = generate();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn generates_distinct_tokens() {
        assert_ne!(generate(), generate());
    }
}

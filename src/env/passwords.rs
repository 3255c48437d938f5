// src/env/passwords.rs

use rand::Rng;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

// No quotes, backticks, backslashes, pipes or colons: values are persisted as
// `KEY='value'` and some are embedded in URLs.
const EXTENDED: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()_-+=/?<>.,";

/// Generate a random secret of `length` characters.
///
/// `safe` restricts the alphabet to ASCII letters and digits.
pub fn generate_password(length: usize, safe: bool) -> String {
    let charset = if safe { ALPHANUMERIC } else { EXTENDED };
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_passwords_are_alphanumeric() {
        let pw = generate_password(64, true);
        assert_eq!(pw.len(), 64);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn extended_passwords_avoid_quotes() {
        let pw = generate_password(256, false);
        assert!(!pw.contains('\''));
        assert!(!pw.contains('"'));
        assert!(!pw.contains('\\'));
    }
}

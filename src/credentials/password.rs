//! Password hashing and strength policy.

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::rngs::OsRng;

pub const MIN_LENGTH: usize = 8;
pub const POLICY_MESSAGE: &str = "Please enter a password with 8+ characters, at least one uppercase, one lowercase, one number and one special character";

/// Whether `password` satisfies the strength policy.
#[must_use]
pub fn meets_policy(password: &str) -> bool {
    password.chars().count() >= MIN_LENGTH
        && password.chars().any(char::is_lowercase)
        && password.chars().any(char::is_uppercase)
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric())
}

/// Hash a password with Argon2id and a random salt (PHC string).
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| anyhow!("failed to hash password"))
}

/// Check `password` against a stored PHC hash.
///
/// # Errors
/// Returns an error if the stored hash cannot be parsed.
pub fn verify(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid password hash"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn policy_requires_every_class() {
        assert!(meets_policy("Sup3r$ecret"));
        assert!(!meets_policy("Sh0r$"));
        assert!(!meets_policy("alllower1$"));
        assert!(!meets_policy("ALLUPPER1$"));
        assert!(!meets_policy("NoDigits$$"));
        assert!(!meets_policy("NoSymbol11"));
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let stored = hash("Sup3r$ecret").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify("Sup3r$ecret", &stored).unwrap());
        assert!(!verify("Wr0ng$ecret", &stored).unwrap());
        assert!(verify("Sup3r$ecret", "not-a-hash").is_err());
    }
}

//! Password hashing (bcrypt).
//!
//! Hashing is deliberately slow; async callers should run it on a blocking
//! thread.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,

    #[error("bcrypt cost {0} is outside 4..=31")]
    InvalidCost(u32),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// Hashes and checks passwords at a fixed bcrypt cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, PasswordError> {
        if !(4..=31).contains(&cost) {
            return Err(PasswordError::InvalidCost(cost));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Salted bcrypt hash of `plain` in modular crypt format (`$2b$...`).
    pub fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        if plain.is_empty() {
            return Err(PasswordError::Empty);
        }
        Ok(bcrypt::hash(plain, self.cost)?)
    }

    /// `true` only if `plain` matches `hash`. A malformed hash never matches.
    pub fn verify(&self, plain: &str, hash: &str) -> bool {
        match bcrypt::verify(plain, hash) {
            Ok(matches) => matches,
            Err(err) => {
                tracing::warn!(error = %err, "stored password hash is unreadable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PasswordHasher {
        PasswordHasher::new(4).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let hasher = fast();
        let hash = hasher.hash("correct horse").unwrap();

        assert!(hash.starts_with("$2"));
        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("battery staple", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = fast();
        assert_ne!(hasher.hash("pw").unwrap(), hasher.hash("pw").unwrap());
    }

    #[test]
    fn empty_password_is_rejected() {
        assert!(matches!(fast().hash(""), Err(PasswordError::Empty)));
    }

    #[test]
    fn cost_outside_bcrypt_range_is_rejected() {
        assert!(matches!(PasswordHasher::new(3), Err(PasswordError::InvalidCost(3))));
        assert!(matches!(PasswordHasher::new(32), Err(PasswordError::InvalidCost(32))));
        assert_eq!(PasswordHasher::default().cost(), 12);
    }

    #[test]
    fn garbage_hash_never_matches() {
        assert!(!fast().verify("pw", "not-a-bcrypt-hash"));
        assert!(!fast().verify("pw", ""));
    }
}

/// Argon2id hashing for passwords and refresh tokens
use crate::error::{ApiError, ApiResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::sync::Arc;

/// Cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Params {
    /// OWASP minimum for Argon2id
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl Argon2Params {
    /// Cheapest parameters argon2 accepts; test builds only
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Salted one-way hasher producing PHC strings
#[derive(Clone)]
pub struct SecretHasher {
    params: Params,
    /// Hash with the same cost as real ones; matched when there is no real one
    decoy: Arc<str>,
}

impl SecretHasher {
    pub fn new(params: Argon2Params) -> ApiResult<Self> {
        let params = Params::new(params.memory_kib, params.iterations, params.parallelism, None)
            .map_err(|e| ApiError::Config(format!("Invalid argon2 parameters: {}", e)))?;
        let mut hasher = Self {
            params,
            decoy: Arc::from(""),
        };
        hasher.decoy = Arc::from(hasher.hash("ledger-api decoy")?);
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, secret: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(format!("Hashing failed: {}", e)))
    }

    /// Constant-time comparison through the PHC verifier; never plain equality
    pub fn verify(&self, secret: &str, stored: &str) -> ApiResult<bool> {
        let parsed = PasswordHash::new(stored)
            .map_err(|e| ApiError::Internal(format!("Stored hash is malformed: {}", e)))?;

        match self.argon2().verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(ApiError::Internal(format!("Hash verification failed: {}", e))),
        }
    }

    /// `hash` on the blocking pool
    pub async fn hash_blocking(&self, secret: String) -> ApiResult<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| ApiError::Internal(format!("Hashing task failed: {}", e)))?
    }

    /// `verify` on the blocking pool
    pub async fn verify_blocking(&self, secret: String, stored: String) -> ApiResult<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &stored))
            .await
            .map_err(|e| ApiError::Internal(format!("Hashing task failed: {}", e)))?
    }

    /// Same work as `verify_blocking` for a missing account; always false
    pub async fn verify_decoy_blocking(&self, secret: String) -> ApiResult<bool> {
        self.verify_blocking(secret, self.decoy.to_string())
            .await
            .map(|_| false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> SecretHasher {
        SecretHasher::new(Argon2Params::insecure_fast()).unwrap()
    }

    #[test]
    fn test_hash_verifies_own_plaintext_only() {
        let hasher = hasher();
        let stored = hasher.hash("correct horse battery staple").unwrap();

        assert!(stored.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse battery staple", &stored).unwrap());
        assert!(!hasher.verify("correct horse battery stapler", &stored).unwrap());
        assert!(!hasher.verify("", &stored).unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = hasher();
        let a = hasher.hash("same").unwrap();
        let b = hasher.hash("same").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, "same");
    }

    #[test]
    fn test_malformed_stored_hash_errors() {
        assert!(hasher().verify("anything", "plaintext-not-a-hash").is_err());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = Argon2Params {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(SecretHasher::new(params).is_err());
    }

    #[tokio::test]
    async fn test_decoy_costs_a_real_verify_and_never_matches() {
        let hasher = hasher();
        assert!(hasher.decoy.starts_with("$argon2id$v=19$m=8,t=1,p=1$"));
        assert!(!hasher
            .verify_decoy_blocking("ledger-api decoy".to_string())
            .await
            .unwrap());
        assert!(!hasher.verify_decoy_blocking(String::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let hasher = hasher();
        let stored = hasher.hash_blocking("token".to_string()).await.unwrap();
        assert!(hasher
            .verify_blocking("token".to_string(), stored)
            .await
            .unwrap());
    }
}

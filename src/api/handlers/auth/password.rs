//! Argon2id password hashing with a tunable work factor.
//!
//! The work factor maps to the Argon2 time cost; memory and parallelism are
//! pinned so a single knob controls latency. Hashing and verification are
//! CPU-bound, so async callers go through `spawn_blocking` and never stall
//! the request workers.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
};
use rand::{RngCore, rngs::OsRng};

pub const DEFAULT_WORK_FACTOR: u32 = 12;

/// 19 MiB, the OWASP baseline for Argon2id.
const MEMORY_COST_KIB: u32 = 19 * 1024;
const PARALLELISM: u32 = 1;

#[derive(Clone, Copy, Debug)]
pub struct PasswordHasher {
    work_factor: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_WORK_FACTOR)
    }
}

impl PasswordHasher {
    /// A zero work factor is clamped up rather than rejected; the CLI layer
    /// validates user input before it gets here.
    #[must_use]
    pub fn new(work_factor: u32) -> Self {
        Self {
            work_factor: work_factor.max(1),
        }
    }

    #[must_use]
    pub fn work_factor(&self) -> u32 {
        self.work_factor
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(MEMORY_COST_KIB, self.work_factor, PARALLELISM, None)
            .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a plaintext password into a PHC string.
    ///
    /// # Errors
    /// Returns an error if salt generation or hashing fails.
    pub fn hash(&self, password: &str) -> Result<String> {
        let mut salt_bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut salt_bytes)
            .context("failed to generate password salt")?;
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|err| anyhow!("failed to encode password salt: {err}"))?;

        self.argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash password: {err}"))
    }

    /// Verify a plaintext password against a stored PHC string.
    ///
    /// The digest carries its own parameters, so verification works for
    /// hashes produced under any work factor.
    #[must_use]
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Hash off the async path.
    ///
    /// # Errors
    /// Returns an error if the blocking task fails or hashing fails.
    pub async fn hash_blocking(self, password: String) -> Result<String> {
        tokio::task::spawn_blocking(move || self.hash(&password))
            .await
            .context("password hashing task failed")?
    }

    /// Verify off the async path.
    ///
    /// # Errors
    /// Returns an error if the blocking task fails.
    pub async fn verify_blocking(self, password: String, digest: String) -> Result<bool> {
        tokio::task::spawn_blocking(move || self.verify(&password, &digest))
            .await
            .context("password verification task failed")
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_WORK_FACTOR, PasswordHasher};
    use anyhow::Result;

    // Low work factor keeps the suite fast; the parameter mapping is the
    // same at any cost.
    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::new(1)
    }

    #[test]
    fn default_work_factor() {
        assert_eq!(PasswordHasher::default().work_factor(), DEFAULT_WORK_FACTOR);
        assert_eq!(PasswordHasher::new(0).work_factor(), 1);
    }

    #[test]
    fn hash_and_verify_round_trip() -> Result<()> {
        let hasher = fast_hasher();
        let digest = hasher.hash("correct horse battery staple")?;
        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse battery staple", &digest));
        assert!(!hasher.verify("wrong password", &digest));
        Ok(())
    }

    #[test]
    fn salts_differ_between_hashes() -> Result<()> {
        let hasher = fast_hasher();
        let first = hasher.hash("hunter2hunter2")?;
        let second = hasher.hash("hunter2hunter2")?;
        assert_ne!(first, second);
        assert!(hasher.verify("hunter2hunter2", &first));
        assert!(hasher.verify("hunter2hunter2", &second));
        Ok(())
    }

    #[test]
    fn verify_rejects_garbage_digest() {
        assert!(!fast_hasher().verify("password", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn blocking_wrappers_round_trip() -> Result<()> {
        let hasher = fast_hasher();
        let digest = hasher.hash_blocking("s3cret-passw0rd".to_string()).await?;
        assert!(
            hasher
                .verify_blocking("s3cret-passw0rd".to_string(), digest)
                .await?
        );
        Ok(())
    }
}

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

/// Opaque password hashing used by the login and password-change handlers.
pub trait PasswordService: Send + Sync {
    fn hash(&self, plain: &str) -> anyhow::Result<String>;
    fn compare(&self, plain: &str, digest: &str) -> anyhow::Result<bool>;

    /// Compares against `digest`, or spends one hash when there is no account
    /// so both rejections take about as long.
    fn compare_or_decoy(&self, plain: &str, digest: Option<&str>) -> anyhow::Result<bool> {
        match digest {
            Some(digest) => self.compare(plain, digest),
            None => {
                self.hash(plain)?;
                Ok(false)
            }
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Argon2PasswordService;

impl PasswordService for Argon2PasswordService {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
        Ok(digest.to_string())
    }

    fn compare(&self, plain: &str, digest: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(digest)
            .map_err(|e| anyhow::anyhow!("Invalid password hash: {}", e))?;
        match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("Password verification error: {}", e)),
        }
    }
}

//! User credentials

use crate::order::Principal;
use crate::store::LedgerStore;
use crate::{LoyaltyServiceError, Result};
use std::sync::Arc;

/// Hash a password with a fresh random salt (PHC string format)
pub fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::SaltString;
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| LoyaltyServiceError::PasswordHash { message: e.to_string() })?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// Registered logins and their password hashes
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn LedgerStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Create a user; a taken login is [`LoyaltyServiceError::UserExists`]
    pub async fn register(&self, login: &str, password: &str) -> Result<Principal> {
        let hash = hash_blocking(password.to_string()).await?;
        if !self.store.create_user(login, &hash).await? {
            return Err(LoyaltyServiceError::UserExists { login: login.to_string() });
        }
        tracing::info!("Registered user {}", login);
        Ok(Principal::new(login))
    }

    /// Check credentials; unknown logins and wrong passwords look the same
    pub async fn verify(&self, login: &str, password: &str) -> Result<Principal> {
        let Some(hash) = self.store.password_hash(login).await? else {
            return Err(LoyaltyServiceError::InvalidCredentials);
        };

        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| LoyaltyServiceError::Internal { message: e.to_string() })?;

        if matches {
            Ok(Principal::new(login))
        } else {
            Err(LoyaltyServiceError::InvalidCredentials)
        }
    }
}

// Argon2 blocks for tens of milliseconds; run it on the blocking pool
async fn hash_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| LoyaltyServiceError::Internal { message: e.to_string() })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not a phc string"));
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_password("s3cret").unwrap(), hash_password("s3cret").unwrap());
    }

    #[tokio::test]
    async fn test_register_and_verify() {
        let users = UserDirectory::new(Arc::new(InMemoryStore::new()));

        let principal = tokio_test::assert_ok!(users.register("alice", "s3cret").await);
        assert_eq!(principal, Principal::new("alice"));
        assert_eq!(tokio_test::assert_ok!(users.verify("alice", "s3cret").await), principal);
    }

    #[tokio::test]
    async fn test_duplicate_login_keeps_first_password() {
        let users = UserDirectory::new(Arc::new(InMemoryStore::new()));
        users.register("alice", "s3cret").await.unwrap();

        let err = users.register("alice", "other").await.unwrap_err();
        assert!(matches!(err, LoyaltyServiceError::UserExists { .. }));
        assert!(users.verify("alice", "s3cret").await.is_ok());
        assert!(matches!(
            users.verify("alice", "other").await,
            Err(LoyaltyServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_unknown_login_is_invalid_credentials() {
        let users = UserDirectory::new(Arc::new(InMemoryStore::new()));
        assert!(matches!(
            users.verify("ghost", "anything").await,
            Err(LoyaltyServiceError::InvalidCredentials)
        ));
    }
}

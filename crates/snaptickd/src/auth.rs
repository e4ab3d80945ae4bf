//! In-memory user accounts and access-token issuance.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Email already registered")]
    EmailTaken,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// Registered users, keyed by email.
#[derive(Default)]
pub struct UserStore {
    users: RwLock<Vec<User>>,
}

impl UserStore {
    /// Add a user unless the email is already taken.
    pub async fn register(&self, user: User) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email) {
            return Err(AuthError::EmailTaken);
        }
        tracing::info!(email = %user.email, role = %user.role, "user registered");
        users.push(user);
        Ok(())
    }

    pub async fn find(&self, email: &str) -> Option<User> {
        self.users.read().await.iter().find(|u| u.email == email).cloned()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Constant-time check of `password` against a PHC-formatted hash. Malformed hashes never verify.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            tracing::warn!(error = %err, "stored password hash is malformed");
            false
        }
    }
}

/// Access token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies HS256 access tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Use the configured secret, or a random per-process one.
    pub fn from_config(secret: Option<&str>, ttl_hours: i64) -> Self {
        match secret {
            Some(secret) => Self::new(secret.as_bytes(), ttl_hours),
            None => {
                tracing::warn!("SNAPTICK_JWT_SECRET not set; generated a random secret, tokens will not survive a restart");
                let secret = format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple());
                Self::new(secret.as_bytes(), ttl_hours)
            }
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.email.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(decode::<Claims>(token, &self.decoding, &Validation::default())?.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User {
            name: "Asha".into(),
            email: email.into(),
            password_hash: hash_password("hunter22").unwrap(),
            role: "instructor".into(),
        }
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_email() {
        let store = UserStore::default();
        store.register(user("a@school.edu")).await.unwrap();
        assert!(matches!(
            store.register(user("a@school.edu")).await,
            Err(AuthError::EmailTaken)
        ));
        store.register(user("b@school.edu")).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.find("b@school.edu").await.is_some());
        assert!(store.find("c@school.edu").await.is_none());
    }

    #[test]
    fn test_token_roundtrip() {
        let issuer = TokenIssuer::new(b"test-secret", 1);
        let token = issuer.issue(&user("a@school.edu")).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "a@school.edu");
        assert_eq!(claims.role, "instructor");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let token = TokenIssuer::new(b"one", 1).issue(&user("a@school.edu")).unwrap();
        assert!(TokenIssuer::new(b"two", 1).verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = TokenIssuer::new(b"test-secret", -2);
        let token = issuer.issue(&user("a@school.edu")).unwrap();
        assert!(issuer.verify(&token).is_err());
    }
}

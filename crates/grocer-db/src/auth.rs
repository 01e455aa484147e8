use anyhow::{Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SESSION_DAYS: i64 = 30;
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

/// Cheap shape check before anything touches the database.
pub fn credentials_look_valid(email: &str, password: &str) -> bool {
    let email = email.trim();
    email.len() >= 3 && email.contains('@') && password.len() >= MIN_PASSWORD_LEN
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Bad password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Signs a session token. Returns the token and its expiry.
pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> Result<(String, DateTime<Utc>)> {
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: expires_at.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, expires_at))
}

/// Validates signature and expiry.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn token_round_trips_with_same_secret_only() {
        let user_id = Uuid::new_v4();
        let (token, expires_at) = create_token("s3cret", user_id, "a@example.com").unwrap();
        assert!(expires_at > Utc::now());

        let claims = decode_token("s3cret", &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "a@example.com");

        assert!(decode_token("other", &token).is_err());
    }

    #[test]
    fn credential_shape() {
        assert!(credentials_look_valid("a@example.com", "longenough"));
        assert!(!credentials_look_valid("nope", "longenough"));
        assert!(!credentials_look_valid("a@example.com", "short"));
    }
}

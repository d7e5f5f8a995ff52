use anyhow::{Result, anyhow};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Access token payload: `{userId, username, role}` plus timing claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i32,
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    pub user_id: i32,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct CryptoUtils;

impl CryptoUtils {
    // Hashes a password with bcrypt at the given cost
    pub fn hash_password(password: &str, rounds: u32) -> Result<String> {
        bcrypt::hash(password, rounds).map_err(|e| anyhow!("Failed to hash password: {}", e))
    }

    // Checks a password against a stored bcrypt hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        bcrypt::verify(password, hash).map_err(|e| anyhow!("Failed to verify password: {}", e))
    }

    // Signs a short-lived access token
    pub fn issue_access_token(
        user_id: i32,
        username: &str,
        role: &str,
        secret: &str,
        ttl: Duration,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            username: username.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| anyhow!("Failed to sign access token: {}", e))
    }

    // Verifies signature and expiry of an access token
    pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| anyhow!("Failed to verify access token: {}", e))
    }

    // Signs a long-lived refresh token with the refresh secret
    pub fn issue_refresh_token(user_id: i32, secret: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = RefreshClaims {
            user_id,
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| anyhow!("Failed to sign refresh token: {}", e))
    }

    pub fn verify_refresh_token(token: &str, secret: &str) -> Result<RefreshClaims> {
        let claims = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| anyhow!("Failed to verify refresh token: {}", e))?;

        if claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(anyhow!("Token is not a refresh token"));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "access-secret";
    const REFRESH_SECRET: &str = "refresh-secret";

    #[test]
    fn access_token_carries_identity() {
        let token =
            CryptoUtils::issue_access_token(7, "siti", "family", SECRET, Duration::hours(24))
                .unwrap();
        let claims = CryptoUtils::verify_access_token(&token, SECRET).unwrap();

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "siti");
        assert_eq!(claims.role, "family");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn access_token_uses_camel_case_user_id() {
        let claims = Claims {
            user_id: 1,
            username: "a".into(),
            role: "admin".into(),
            iat: 0,
            exp: 1,
        };
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["userId"], 1);
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let token =
            CryptoUtils::issue_access_token(1, "admin", "admin", SECRET, Duration::hours(1))
                .unwrap();
        assert!(CryptoUtils::verify_access_token(&token, "other").is_err());

        let expired =
            CryptoUtils::issue_access_token(1, "admin", "admin", SECRET, Duration::hours(-2))
                .unwrap();
        assert!(CryptoUtils::verify_access_token(&expired, SECRET).is_err());
    }

    #[test]
    fn refresh_tokens_are_not_access_tokens() {
        let refresh =
            CryptoUtils::issue_refresh_token(3, REFRESH_SECRET, Duration::days(7)).unwrap();
        assert_eq!(
            CryptoUtils::verify_refresh_token(&refresh, REFRESH_SECRET)
                .unwrap()
                .user_id,
            3
        );
        assert!(CryptoUtils::verify_access_token(&refresh, REFRESH_SECRET).is_err());

        let access =
            CryptoUtils::issue_access_token(3, "u", "elderly", REFRESH_SECRET, Duration::hours(1))
                .unwrap();
        assert!(CryptoUtils::verify_refresh_token(&access, REFRESH_SECRET).is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = CryptoUtils::hash_password("rahasia123", 4).unwrap();
        assert_ne!(hash, "rahasia123");
        assert!(CryptoUtils::verify_password("rahasia123", &hash).unwrap());
        assert!(!CryptoUtils::verify_password("salah", &hash).unwrap());
    }
}

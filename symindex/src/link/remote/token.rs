use crate::config::ServiceUser;
use crate::error::Result;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
#[cfg(test)]
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Issuer claim on every minted token
pub const ISSUER: &str = "symindex";

/// Lifetime of a minted token. Tokens are minted per operation.
pub const TOKEN_LIFETIME_SECS: i64 = 30;

/// Claims carried by a service-account token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub uid: i64,
    #[serde(default)]
    pub gid: i64,
}

/// Mints short-lived HS256 tokens for the configured service user.
#[derive(Clone)]
pub struct TokenManager {
    secret: String,
    user: ServiceUser,
}

impl TokenManager {
    pub fn new(secret: impl Into<String>, user: ServiceUser) -> Self {
        TokenManager {
            secret: secret.into(),
            user,
        }
    }

    pub fn mint(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: self.user.id.clone(),
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
            username: self.user.username.clone(),
            uid: self.user.uid,
            gid: self.user.gid,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Decode and validate a token minted with the same secret.
    #[cfg(test)]
    pub(crate) fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("user", &self.user.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(secret: &str) -> TokenManager {
        TokenManager::new(
            secret,
            ServiceUser {
                id: "svc-1".into(),
                username: "indexer".into(),
                uid: 0,
                gid: 0,
            },
        )
    }

    #[test]
    fn test_mint_and_verify() {
        let tokens = manager("change-me");
        let token = tokens.mint().unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "svc-1");
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp - claims.iat, TOKEN_LIFETIME_SECS);
    }

    #[test]
    fn test_verify_rejects_other_secret() {
        let token = manager("secret-a").mint().unwrap();
        assert!(manager("secret-b").verify(&token).is_err());
    }
}

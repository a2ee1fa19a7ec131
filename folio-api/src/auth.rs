use async_trait::async_trait;
use chrono::{Duration, Utc};
use folio_core::identity::{Caller, IdentityResolver, Role};
use folio_core::{CoreError, CoreResult};
use folio_shared::UserId;
use folio_store::app_config::AuthConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Numeric user id, as a string
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// HS256 bearer tokens signed with the configured secret
pub struct JwtIdentityResolver {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiration_seconds: u64,
}

impl JwtIdentityResolver {
    pub fn new(secret: &[u8], expiration_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            expiration_seconds,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.expose().as_bytes(), config.jwt_expiration_seconds)
    }

    /// Sign a token for `user_id`, valid for the configured lifetime
    pub fn issue(&self, user_id: UserId, role: Role) -> CoreResult<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: (Utc::now() + Duration::seconds(self.expiration_seconds as i64)).timestamp()
                as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| CoreError::InvalidRequest(format!("Token encoding failed: {}", e)))
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> CoreResult<Caller> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer token");
                CoreError::Unauthorized("invalid or expired token".into())
            })?;

        let user_id = token_data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| CoreError::Unauthorized("token subject is not a user id".into()))?;

        Ok(Caller {
            user_id: UserId(user_id),
            role: token_data.claims.role,
        })
    }
}

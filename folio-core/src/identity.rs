use async_trait::async_trait;
use folio_shared::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

/// Resolved identity of whoever is calling the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Verify a bearer token. Fails with `Unauthorized`.
    async fn resolve(&self, token: &str) -> CoreResult<Caller>;

    async fn resolve_buyer(&self, token: &str) -> CoreResult<UserId> {
        Ok(self.resolve(token).await?.user_id)
    }

    /// A valid token without the admin role yields `Forbidden`
    async fn resolve_admin(&self, token: &str) -> CoreResult<UserId> {
        let caller = self.resolve(token).await?;
        if !caller.is_admin() {
            tracing::warn!(user_id = %caller.user_id, "Privileged operation attempted by non-admin");
            return Err(CoreError::Forbidden("admin role required".into()));
        }
        Ok(caller.user_id)
    }
}

/// Fixed token table, for development setups and tests
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityResolver {
    tokens: HashMap<String, Caller>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: i64, role: Role) -> Self {
        self.tokens.insert(
            token.into(),
            Caller {
                user_id: UserId(user_id),
                role,
            },
        );
        self
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, token: &str) -> CoreResult<Caller> {
        self.tokens
            .get(token)
            .copied()
            .ok_or_else(|| CoreError::Unauthorized("invalid token".into()))
    }
}

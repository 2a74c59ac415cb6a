//! Credential verification at connection time
//!
//! Verification is delegated to an `IdentityVerifier`. The server ships a
//! static token table for development and tests; a deployment plugs in its
//! identity provider behind the same trait.

use crate::error::AuthError;
use serde::Deserialize;
use shared::TOKEN_QUERY_PARAM;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Claims extracted from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Stable subject identifier, the sole key for user lookup
    pub sub: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Claims {
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            preferred_username: None,
            username: None,
            name: None,
        }
    }

    /// Best display name the claims offer, falling back to "Anonymous".
    pub fn display_name(&self) -> String {
        [&self.preferred_username, &self.username, &self.name]
            .into_iter()
            .flatten()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
            .unwrap_or("Anonymous")
            .to_string()
    }
}

pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// Fixed token -> claims table.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Claims>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, claims: Claims) -> Self {
        self.tokens.insert(token.into(), claims);
        self
    }

    /// Loads a JSON object mapping each token to its claims.
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let text = fs::read_to_string(path)
            .map_err(|e| AuthError::TokenTable(format!("{}: {}", path.display(), e)))?;
        let tokens: HashMap<String, Claims> = serde_json::from_str(&text)
            .map_err(|e| AuthError::TokenTable(format!("{}: {}", path.display(), e)))?;
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        match self.tokens.get(token) {
            Some(claims) if !claims.sub.trim().is_empty() => Ok(claims.clone()),
            _ => Err(AuthError::InvalidToken),
        }
    }
}

/// Pulls the bearer credential from an `Authorization` header value or,
/// failing that, from the `token` query parameter.
pub fn extract_token(authorization: Option<&str>, query: Option<&str>) -> Option<String> {
    if let Some(token) = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Some(token.to_string());
    }

    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == TOKEN_QUERY_PARAM)
        .map(|(_, value)| value.to_string())
        .filter(|token| !token.is_empty())
}

// src/auth.rs
use anyhow::{Context, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use crate::app_log;

/// Claims the portal puts in its session tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub onboardingstatus: Option<bool>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl Claims {
    pub fn user_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.sub.as_deref())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.exp, Some(exp) if exp <= now)
    }

    /// Default dashboard for the token's role.
    pub fn landing_route(&self) -> &'static str {
        match self.role.as_deref() {
            Some("admin") => "/admin-dashboard",
            Some("employee") if self.onboardingstatus.unwrap_or(false) => "/feeds",
            Some("employee") => "/onbordingform",
            Some("employer") => "/employer-dashboard",
            Some("instructor") => "/instructor-dashboard",
            _ => "/login",
        }
    }
}

/// Opaque bearer credential. The core only ever reads it.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Decode the claims without checking the signature; the backend is the
    /// verifier, the client only needs identity, role and expiry.
    pub fn claims(&self) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(&self.0, &DecodingKey::from_secret(&[]), &validation)
            .context("Failed to decode session token claims")?;
        Ok(data.claims)
    }

    /// Tokens that are not JWTs are treated as opaque and never expire here.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.claims()
            .map(|claims| claims.is_expired_at(now))
            .unwrap_or(false)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Injected holder of the signed-in user's credential.
///
/// Cloning shares the same underlying slot; every clone observes `sign_in`
/// and `sign_out` through [`SessionStore::subscribe`].
#[derive(Clone)]
pub struct SessionStore {
    slot: Arc<watch::Sender<Option<SessionToken>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    pub fn with_token(token: SessionToken) -> Self {
        let store = Self::new();
        store.sign_in(token);
        store
    }

    pub fn sign_in(&self, token: SessionToken) {
        if token.as_str().is_empty() {
            app_log!(warn, "Ignoring empty session token");
            return;
        }
        self.slot.send_replace(Some(token));
    }

    pub fn sign_out(&self) {
        self.slot.send_replace(None);
    }

    /// The usable token, if any. Expired tokens read as absent.
    pub fn current(&self) -> Option<SessionToken> {
        let token = self.slot.borrow().clone()?;
        if token.is_expired_at(chrono::Utc::now().timestamp()) {
            app_log!(debug, "Session token expired");
            return None;
        }
        Some(token)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionToken>> {
        self.slot.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a token persisted by the login flow. A missing or blank file means
/// nobody is signed in.
pub async fn load_token_file(path: &Path) -> Result<Option<SessionToken>> {
    if !tokio::fs::try_exists(path)
        .await
        .with_context(|| format!("Failed to inspect token file: {}", path.display()))?
    {
        return Ok(None);
    }

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read token file: {}", path.display()))?;
    let token = SessionToken::new(raw);

    if token.as_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(token))
    }
}

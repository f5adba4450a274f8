//! Bearer token authentication with cookie sessions
//!
//! A request carrying `Authorization: <scope> <jwt>` is identified by the
//! token's `sub` claim. A valid token also opens a session; its id is handed
//! back to the client in the `SESSIONID` cookie, and later requests carrying
//! only that cookie are identified from the session until the token expires.
//! Presenting the same token again resumes its session, so the table holds at
//! most one live session per distinct token.

use super::{Authenticator, Identity};
use crate::core::request::RequestHead;
use crate::core::stats::{Metric, MetricKind};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cookie carrying the session id
pub const SESSION_COOKIE: &str = "SESSIONID";

/// Session lifetime when the token has no `exp` claim
const DEFAULT_SESSION_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

#[derive(Debug, Clone)]
struct Session {
    subject: String,
    expires_at: i64,
}

type TokenDigest = [u8; 32];

#[derive(Debug, Default)]
struct SessionTable {
    by_id: HashMap<String, Session>,
    by_token: HashMap<TokenDigest, String>,
}

impl SessionTable {
    fn purge(&mut self, now: i64) {
        self.by_id.retain(|_, session| session.expires_at > now);
        let by_id = &self.by_id;
        self.by_token.retain(|_, id| by_id.contains_key(id));
    }
}

/// JWT bearer authenticator (HS256 by default)
pub struct JwtSessionAuthenticator {
    key: DecodingKey,
    validation: Validation,
    scope: String,
    sessions: RwLock<SessionTable>,
}

impl JwtSessionAuthenticator {
    pub fn new(secret: &[u8]) -> Self {
        JwtSessionAuthenticator {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            scope: "bearer".to_string(),
            sessions: RwLock::new(SessionTable::default()),
        }
    }

    /// Authorization scheme to accept (compared case-insensitively)
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.validation.algorithms = algorithms;
        self
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        let now = Utc::now().timestamp();
        self.sessions
            .read()
            .by_id
            .values()
            .filter(|session| session.expires_at > now)
            .count()
    }

    fn verify(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                debug!("Ignoring expired bearer token");
                None
            }
            Err(e) => {
                warn!("Bearer token found, but failed to decode: {}", e);
                None
            }
        }
    }

    /// Session id for `token`, opening one unless the token already has a live session
    fn open_session(&self, token: &str, subject: &str, exp: Option<i64>) -> String {
        let now = Utc::now().timestamp();
        let digest: TokenDigest = Sha256::digest(token.as_bytes()).into();

        let mut sessions = self.sessions.write();
        sessions.purge(now);
        if let Some(id) = sessions.by_token.get(&digest) {
            return id.clone();
        }

        let id = Uuid::new_v4().simple().to_string();
        sessions.by_id.insert(
            id.clone(),
            Session {
                subject: subject.to_string(),
                expires_at: exp.unwrap_or(now + DEFAULT_SESSION_SECS),
            },
        );
        sessions.by_token.insert(digest, id.clone());
        id
    }

    fn from_session(&self, id: &str) -> Option<String> {
        let now = Utc::now().timestamp();
        self.sessions
            .read()
            .by_id
            .get(id)
            .filter(|session| session.expires_at > now)
            .map(|session| session.subject.clone())
    }
}

impl Authenticator for JwtSessionAuthenticator {
    fn name(&self) -> &str {
        "jwt"
    }

    fn authenticate(&self, request: &RequestHead) -> Option<Identity> {
        for header in request.headers.get_all("authorization") {
            let Some((scheme, token)) = header.split_once(' ') else {
                continue;
            };
            if !scheme.eq_ignore_ascii_case(&self.scope) {
                continue;
            }

            let token = token.trim();
            let Some(claims) = self.verify(token) else {
                continue;
            };
            let Some(subject) = claims.sub else {
                debug!("Bearer token has no subject");
                continue;
            };
            let session = self.open_session(token, &subject, claims.exp);
            // The client already holds this session
            if request.cookie(SESSION_COOKIE) == Some(session.as_str()) {
                return Some(Identity::new(subject));
            }
            return Some(Identity::new(subject).with_session(session));
        }

        let id = request.cookie(SESSION_COOKIE)?;
        self.from_session(id).map(Identity::new)
    }

    fn metrics(&self) -> Vec<Metric> {
        vec![Metric::new("authn_jwt_session_count", self.session_count() as f64)
            .with_help("Number of live bearer token sessions")
            .with_kind(MetricKind::Gauge)]
    }
}

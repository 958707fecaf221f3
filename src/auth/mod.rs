//! Credential chain for one Google principal.
//!
//! master token -> session token -> per-scope access token
//!
//! `TokenCache` owns every tier and is the only thing that mutates them. Each
//! tier is derived lazily, with exactly one upstream round trip per derivation
//! and no internal retry. The upstream exchange itself sits behind
//! `TokenExchange` so the caching policy stays independent of the wire format.
//!
//! The cache is not internally synchronized; callers hand out `&mut` access.
//! Sharing one principal across workers requires wrapping the cache in a mutex.

pub mod gpsoauth;

use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, SyncError};

pub use gpsoauth::GpsOAuthExchange;

pub const SESSION_TOKEN_DURATION: Duration = Duration::from_secs(24 * 60 * 60);
pub const ACCESS_TOKEN_DURATION: Duration = Duration::from_secs(60 * 60);

/// Scope for the camera frontend (event manifests and clip downloads).
pub const NEST_SCOPE: &str = "oauth2:https://www.googleapis.com/auth/nest-account";
/// Scope for home graph device discovery.
pub const HOMEGRAPH_SCOPE: &str = "oauth2:https://www.googleapis.com/auth/homegraph";

/// Long-lived account secret. Never logged; wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterToken(String);

impl MasterToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Same-length mask for configuration display.
    pub fn masked(&self) -> String {
        if self.0.is_empty() {
            "(not set)".to_string()
        } else {
            "*".repeat(self.0.len())
        }
    }
}

impl std::fmt::Debug for MasterToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterToken(<redacted>)")
    }
}

#[derive(Clone)]
pub struct SessionToken {
    value: String,
    issued_at: Instant,
}

impl SessionToken {
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    fn is_valid_at(&self, now: Instant, lifetime: Duration) -> bool {
        now.saturating_duration_since(self.issued_at) < lifetime
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Clone)]
pub struct AccessToken {
    value: String,
    issued_at: Instant,
    scope: String,
}

impl AccessToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.value)
    }

    fn is_valid_for(&self, scope: &str, now: Instant, lifetime: Duration) -> bool {
        self.scope == scope && now.saturating_duration_since(self.issued_at) < lifetime
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// One round trip to the identity provider per call.
pub trait TokenExchange: Send {
    /// Derive a session credential from the master token.
    fn session_token(
        &mut self,
        username: &str,
        master: &MasterToken,
        android_id: &str,
    ) -> Result<String>;

    /// Derive a bearer token for `scope`. `session` is the credential returned
    /// by the last accepted `session_token` call; exchanges that authenticate
    /// every scope with the master credential may ignore it.
    fn access_token(
        &mut self,
        username: &str,
        master: &MasterToken,
        session: &str,
        android_id: &str,
        scope: &str,
    ) -> Result<String>;
}

pub type Clock = Box<dyn Fn() -> Instant + Send>;

pub struct TokenCache {
    username: String,
    master: MasterToken,
    android_id: String,
    exchange: Box<dyn TokenExchange>,
    clock: Clock,
    session_lifetime: Duration,
    access_lifetime: Duration,
    session: Option<SessionToken>,
    access: Option<AccessToken>,
}

impl TokenCache {
    pub fn new(
        username: impl Into<String>,
        master: MasterToken,
        exchange: Box<dyn TokenExchange>,
    ) -> Self {
        let username = username.into();
        let android_id = derive_android_id(&username);
        Self {
            username,
            master,
            android_id,
            exchange,
            clock: Box::new(Instant::now),
            session_lifetime: SESSION_TOKEN_DURATION,
            access_lifetime: ACCESS_TOKEN_DURATION,
            session: None,
            access: None,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_lifetimes(mut self, session: Duration, access: Duration) -> Self {
        self.session_lifetime = session;
        self.access_lifetime = access;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn android_id(&self) -> &str {
        &self.android_id
    }

    /// Returns a valid access token for `scope`, deriving missing, expired or
    /// differently-scoped tiers on the way.
    pub fn access_token(&mut self, scope: &str) -> Result<AccessToken> {
        let now = (self.clock)();
        if let Some(token) = &self.access {
            if token.is_valid_for(scope, now, self.access_lifetime) {
                return Ok(token.clone());
            }
        }

        log::debug!("getting new access token for scope {}", scope);
        let session = self.session_token()?;
        let value = self
            .exchange
            .access_token(
                &self.username,
                &self.master,
                &session.value,
                &self.android_id,
                scope,
            )
            .map_err(as_auth_error)?;
        let token = AccessToken {
            value,
            issued_at: (self.clock)(),
            scope: scope.to_string(),
        };
        self.access = Some(token.clone());
        Ok(token)
    }

    fn session_token(&mut self) -> Result<SessionToken> {
        let now = (self.clock)();
        if let Some(session) = &self.session {
            if session.is_valid_at(now, self.session_lifetime) {
                return Ok(session.clone());
            }
        }

        if self.master.is_empty() {
            return Err(SyncError::Auth("unable to obtain master token".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(SyncError::Auth("username is not set".to_string()));
        }

        log::debug!("getting new session token");
        let value = self
            .exchange
            .session_token(&self.username, &self.master, &self.android_id)
            .map_err(as_auth_error)?;
        let session = SessionToken {
            value,
            issued_at: (self.clock)(),
        };
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Drops both derived tiers; the next request re-derives from the master token.
    pub fn invalidate(&mut self) {
        self.session = None;
        self.access = None;
    }
}

fn as_auth_error(err: SyncError) -> SyncError {
    match err {
        SyncError::Auth(_) => err,
        other => SyncError::Auth(other.to_string()),
    }
}

/// Stable 16 hex digit device id for the principal.
pub fn derive_android_id(username: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.trim().to_lowercase().as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        sessions: usize,
        access: Vec<String>,
    }

    struct CountingExchange {
        calls: Arc<Mutex<Calls>>,
        reject_master: bool,
    }

    impl TokenExchange for CountingExchange {
        fn session_token(&mut self, _: &str, master: &MasterToken, _: &str) -> Result<String> {
            if self.reject_master {
                return Err(SyncError::Auth("BadAuthentication".into()));
            }
            let mut calls = self.calls.lock().unwrap();
            calls.sessions += 1;
            Ok(format!("session-{}-{}", master.expose(), calls.sessions))
        }

        fn access_token(
            &mut self,
            _: &str,
            _: &MasterToken,
            session: &str,
            _: &str,
            scope: &str,
        ) -> Result<String> {
            let mut calls = self.calls.lock().unwrap();
            calls.access.push(scope.to_string());
            Ok(format!("{}:{}:{}", session, scope, calls.access.len()))
        }
    }

    fn cache(
        username: &str,
        reject_master: bool,
    ) -> (TokenCache, Arc<Mutex<Calls>>, Arc<AtomicU64>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let offset_secs = Arc::new(AtomicU64::new(0));
        let base = Instant::now();
        let clock_offset = offset_secs.clone();
        let cache = TokenCache::new(
            username,
            MasterToken::new("aas_et/master"),
            Box::new(CountingExchange {
                calls: calls.clone(),
                reject_master,
            }),
        )
        .with_clock(Box::new(move || {
            base + Duration::from_secs(clock_offset.load(Ordering::SeqCst))
        }));
        (cache, calls, offset_secs)
    }

    #[test]
    fn same_scope_reuses_cached_token() {
        let (mut cache, calls, _) = cache("user@example.com", false);
        let a = cache.access_token(NEST_SCOPE).unwrap();
        let b = cache.access_token(NEST_SCOPE).unwrap();
        assert_eq!(a.value(), b.value());
        let calls = calls.lock().unwrap();
        assert_eq!(calls.sessions, 1);
        assert_eq!(calls.access.len(), 1);
    }

    #[test]
    fn scope_switch_forces_new_exchange() {
        let (mut cache, calls, _) = cache("user@example.com", false);
        let a = cache.access_token("scope-a").unwrap();
        let b = cache.access_token("scope-b").unwrap();
        assert_ne!(a.value(), b.value());
        assert_eq!(b.scope(), "scope-b");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.access, vec!["scope-a", "scope-b"]);
        assert_eq!(calls.sessions, 1);
    }

    #[test]
    fn expired_access_token_is_refreshed_but_session_kept() {
        let (mut cache, calls, clock) = cache("user@example.com", false);
        cache.access_token(NEST_SCOPE).unwrap();
        clock.store(ACCESS_TOKEN_DURATION.as_secs(), Ordering::SeqCst);
        cache.access_token(NEST_SCOPE).unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.access.len(), 2);
        assert_eq!(calls.sessions, 1);
    }

    #[test]
    fn expired_session_is_rederived() {
        let (mut cache, calls, clock) = cache("user@example.com", false);
        cache.access_token(NEST_SCOPE).unwrap();
        clock.store(SESSION_TOKEN_DURATION.as_secs(), Ordering::SeqCst);
        let token = cache.access_token(NEST_SCOPE).unwrap();
        assert!(token.value().starts_with("session-aas_et/master-2"));
        assert_eq!(calls.lock().unwrap().sessions, 2);
    }

    #[test]
    fn rejected_master_is_auth_error() {
        let (mut cache, _, _) = cache("user@example.com", true);
        let err = cache.access_token(NEST_SCOPE).unwrap_err();
        assert!(matches!(err, SyncError::Auth(_)));
    }

    #[test]
    fn empty_username_is_auth_error_without_exchange() {
        let (mut cache, calls, _) = cache("  ", false);
        let err = cache.access_token(NEST_SCOPE).unwrap_err();
        assert!(err.to_string().contains("username"));
        assert_eq!(calls.lock().unwrap().sessions, 0);
    }

    #[test]
    fn invalidate_drops_both_tiers() {
        let (mut cache, calls, _) = cache("user@example.com", false);
        cache.access_token(NEST_SCOPE).unwrap();
        cache.invalidate();
        cache.access_token(NEST_SCOPE).unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.sessions, 2);
        assert_eq!(calls.access.len(), 2);
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let master = MasterToken::new("aas_et/secret");
        assert!(!format!("{:?}", master).contains("secret"));
        assert_eq!(master.masked(), "*************");
        let (mut cache, _, _) = cache("user@example.com", false);
        let token = cache.access_token(NEST_SCOPE).unwrap();
        assert!(!format!("{:?}", token).contains("session-"));
    }

    #[test]
    fn android_id_is_stable_per_principal() {
        let a = derive_android_id("User@Example.com");
        assert_eq!(a.len(), 16);
        assert_eq!(a, derive_android_id("user@example.com"));
        assert_ne!(a, derive_android_id("other@example.com"));
    }
}

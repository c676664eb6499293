//! Bearer-token session handling.
//!
//! The request phase attaches credentials; the response phase reacts to
//! 401/403 by clearing the token and redirecting to the login surface.
//! Every change of identity also empties the response cache.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::{PipelineError, RequestSpec, ResponseCache};

pub const REQUEST_TIME_HEADER: &str = "X-Request-Time";
pub const CLIENT_VERSION_HEADER: &str = "X-Client-Version";

/// Persistent home of the bearer token.
pub trait TokenStore: Send + Sync {
    fn get_token(&self) -> Option<String>;
    fn set_token(&self, token: &str);
    fn clear_token(&self);
}

/// Process-local [`TokenStore`].
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_token(&self, token: &str) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_owned());
    }

    fn clear_token(&self) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// Moves the user to another screen.
pub trait Navigator: Send + Sync {
    fn redirect(&self, location: &str);
}

/// [`Navigator`] that only logs the target.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect(&self, _location: &str) {
        #[cfg(feature = "tracing")]
        tracing::debug!(location = _location, "redirect requested without a navigator");
    }
}

/// Login surface variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginRedirect {
    Login,
    Expired,
    Rejected,
    Pending,
}

impl LoginRedirect {
    pub fn location(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Expired => "/login?reason=expired",
            Self::Rejected => "/login?reason=rejected",
            Self::Pending => "/login?reason=pending",
        }
    }
}

impl fmt::Display for LoginRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.location())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
    /// Token cleared; waiting for the login redirect to complete.
    Expired,
}

/// Side effects owed for one failed response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FailureAction {
    pub clear_token: bool,
    pub redirect: Option<LoginRedirect>,
    pub log: bool,
}

/// Maps a failed response to its session side effects.
///
/// `quiet_not_found` lists path substrings whose 404 means "no record
/// yet" and is not logged.
pub fn classify_failure(
    status: u16,
    message: &str,
    path: &str,
    is_auth_endpoint: bool,
    quiet_not_found: &[String],
) -> FailureAction {
    let message = message.to_ascii_lowercase();
    let mut action = FailureAction {
        log: status >= 400
            && !(status == 404 && quiet_not_found.iter().any(|quiet| path.contains(quiet.as_str()))),
        ..FailureAction::default()
    };

    match status {
        401 => {
            action.clear_token = true;
            if !is_auth_endpoint {
                action.redirect = Some(if indicates_expiry(&message) {
                    LoginRedirect::Expired
                } else {
                    LoginRedirect::Login
                });
            }
        }
        403 => {
            let target = if message.contains("account suspended") {
                Some(LoginRedirect::Expired)
            } else if message.contains("account rejected") {
                Some(LoginRedirect::Rejected)
            } else if message.contains("account not approved") {
                Some(LoginRedirect::Pending)
            } else {
                None
            };
            if target.is_some() {
                action.clear_token = true;
                if !is_auth_endpoint {
                    action.redirect = target;
                }
            }
        }
        _ => {}
    }
    action
}

fn indicates_expiry(message: &str) -> bool {
    message.contains("expired")
        || (message.contains("invalid") && (message.contains("token") || message.contains("session")))
}

/// Session state plus the collaborators it drives.
pub struct Session {
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    cache: Arc<ResponseCache>,
    client_version: String,
    state: Mutex<SessionState>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("client_version", &self.client_version)
            .field("state", &*self.lock_state())
            .finish()
    }
}

impl Session {
    pub fn new(
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
        cache: Arc<ResponseCache>,
        client_version: impl Into<String>,
    ) -> Self {
        let initial = if store.get_token().is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        };
        Self {
            store,
            navigator,
            cache,
            client_version: client_version.into(),
            state: Mutex::new(initial),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.store.get_token()
    }

    /// Current state. Reading it has no side effects; see [`Session::check_expiry`].
    pub fn state(&self) -> SessionState {
        let state = *self.lock_state();
        if state == SessionState::Authenticated && self.store.get_token().is_none() {
            return SessionState::Anonymous;
        }
        state
    }

    /// Ends the session if the stored token is a JWT whose `exp` has passed.
    ///
    /// Runs before every request. Returns `true` when the session was ended.
    pub fn check_expiry(&self) -> bool {
        let expired = self
            .store
            .get_token()
            .is_some_and(|token| is_token_expired(&token, unix_now()));
        if expired {
            self.end(SessionState::Expired);
            self.redirect(LoginRedirect::Expired);
        }
        expired
    }

    pub fn login(&self, token: &str) {
        self.store.set_token(token);
        self.cache.clear();
        *self.lock_state() = SessionState::Authenticated;
    }

    pub fn logout(&self) {
        self.end(SessionState::Anonymous);
    }

    /// The navigator finished showing the login screen.
    pub fn redirect_completed(&self) {
        let mut state = self.lock_state();
        if *state == SessionState::Expired {
            *state = SessionState::Anonymous;
        }
    }

    /// Headers for the request phase. Without a token the request goes out
    /// unauthenticated.
    pub fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(3);
        if let Some(token) = self.store.get_token() {
            headers.push(("Authorization".to_owned(), format!("Bearer {token}")));
        }
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        headers.push((REQUEST_TIME_HEADER.to_owned(), millis.to_string()));
        headers.push((CLIENT_VERSION_HEADER.to_owned(), self.client_version.clone()));
        headers
    }

    /// Logs one failed attempt unless it is a quiet 404.
    pub fn record_failure(&self, spec: &RequestSpec, error: &PipelineError, quiet_not_found: &[String]) {
        let loggable = match error {
            PipelineError::Http { status, message, .. } => {
                classify_failure(*status, message, &spec.path, spec.is_auth_endpoint(), quiet_not_found).log
            }
            PipelineError::Transport { .. } => true,
            _ => false,
        };
        if loggable {
            log_failure(spec, error);
        }
    }

    /// Response phase for a final failure: clears the token and redirects
    /// as needed. The error itself is left untouched.
    pub fn after_failure(&self, spec: &RequestSpec, error: &PipelineError) {
        let PipelineError::Http {
            status, message, ..
        } = error
        else {
            return;
        };

        let action = classify_failure(*status, message, &spec.path, spec.is_auth_endpoint(), &[]);
        if action.clear_token {
            self.end(if action.redirect.is_some() {
                SessionState::Expired
            } else {
                SessionState::Anonymous
            });
        }
        if let Some(target) = action.redirect {
            self.redirect(target);
        }
    }

    fn end(&self, next: SessionState) {
        self.store.clear_token();
        self.cache.clear();
        *self.lock_state() = next;
    }

    fn redirect(&self, target: LoginRedirect) {
        #[cfg(feature = "tracing")]
        tracing::debug!(location = target.location(), "redirecting to login");
        self.navigator.redirect(target.location());
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(feature = "tracing")]
fn log_failure(spec: &RequestSpec, error: &PipelineError) {
    match error {
        PipelineError::Http {
            status,
            message,
            url,
            ..
        } => tracing::warn!(
            status = *status,
            reason = %message,
            url = %url,
            method = %spec.method,
            "api request failed"
        ),
        other => tracing::warn!(
            method = %spec.method,
            path = %spec.path,
            error = %other,
            "api request failed without a response"
        ),
    }
}

#[cfg(not(feature = "tracing"))]
fn log_failure(_spec: &RequestSpec, _error: &PipelineError) {}

/// `exp` claim of a JWT, if the token is one.
pub fn token_expiry(token: &str) -> Option<u64> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?;
    exp.as_u64().or_else(|| exp.as_f64().map(|secs| secs.max(0.0) as u64))
}

/// Opaque tokens never expire locally.
pub fn is_token_expired(token: &str, now_secs: u64) -> bool {
    token_expiry(token).is_some_and(|exp| exp <= now_secs)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

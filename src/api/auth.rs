//! Token ownership and refresh for the ANIO cloud API.
//!
//! [`TokenManager`] holds the one token pair for an account and keeps a valid
//! access token available to callers, refreshing proactively before expiry.
//! The token state lives behind an async mutex that is held across the
//! refresh request itself: concurrent callers asking for a token during an
//! in-flight refresh wait for and reuse its result instead of issuing a
//! second refresh (the refresh endpoint is not idempotent).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::api::models::{AuthTokens, RefreshResponse};
use crate::config::{ClientConfig, SessionTokens};
use crate::traits::{Headers, HttpClient};

/// Refresh the access token once it is within this many seconds of expiry.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

/// The access/refresh token pair for an authenticated session.
///
/// `access_expires_at` is derived once by decoding the access token's `exp`
/// claim. No signature verification is performed; the token's integrity is
/// guaranteed by the issuing server over TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
}

impl TokenPair {
    fn from_tokens(access_token: String, refresh_token: String) -> Self {
        let access_expires_at =
            parse_jwt_expiry(&access_token).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            access_token,
            refresh_token,
            access_expires_at,
        }
    }

    /// Whether the access token is still usable at `now`, keeping the
    /// proactive refresh buffer in hand.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_BUFFER_SECS) < self.access_expires_at
    }

    fn session_tokens(&self) -> SessionTokens {
        SessionTokens {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// Result of a login attempt.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Credentials accepted; the session is established.
    Authenticated(TokenPair),
    /// The account has 2FA enabled: call `login` again with the OTP code the
    /// user received.
    OtpRequired,
}

/// Callback invoked whenever the token pair changes (login or refresh), so
/// the host can persist the rotated pair.
pub trait TokenListener: Send + Sync {
    fn on_tokens_refreshed(&self, tokens: &SessionTokens);
}

/// JWT claims, of which only the expiry is of interest.
#[derive(Deserialize)]
struct JwtClaims {
    exp: i64,
}

/// Extract the expiry time from a JWT access token.
///
/// Returns `None` if the token cannot be parsed or has no `exp` claim; the
/// caller then treats the token as already expired.
pub fn parse_jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    // Some issuers pad the payload segment; strip before decoding.
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .ok()?;
    let claims: JwtClaims = serde_json::from_slice(&payload).ok()?;
    DateTime::from_timestamp(claims.exp, 0)
}

/// Owns the token pair for one account.
///
/// Constructed once per account and shared (`Arc`) between the API client
/// and the host. Tokens are mutated only by `login`/refresh and destroyed by
/// `logout`.
pub struct TokenManager<C> {
    http: Arc<C>,
    config: ClientConfig,
    state: Mutex<Option<TokenPair>>,
    listener: Option<Arc<dyn TokenListener>>,
}

impl<C: HttpClient> TokenManager<C> {
    /// Create a manager with no session; `login` must be called before any
    /// authenticated request.
    pub fn new(http: Arc<C>, config: ClientConfig) -> Self {
        Self {
            http,
            config,
            state: Mutex::new(None),
            listener: None,
        }
    }

    /// Resume a persisted session. The access expiry is re-derived from the
    /// JWT; an undecodable token is treated as expired and refreshed on
    /// first use.
    pub fn with_session(mut self, tokens: SessionTokens) -> Self {
        self.state = Mutex::new(Some(TokenPair::from_tokens(
            tokens.access_token,
            tokens.refresh_token,
        )));
        self
    }

    /// Register a listener notified after every successful login/refresh.
    pub fn with_listener(mut self, listener: Arc<dyn TokenListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    fn auth_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert("client-id".to_string(), self.config.client_id.clone());
        headers.insert("app-uuid".to_string(), self.config.app_uuid.clone());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers
    }

    fn notify_listener(&self, pair: &TokenPair) {
        if let Some(listener) = &self.listener {
            listener.on_tokens_refreshed(&pair.session_tokens());
        }
    }

    /// Authenticate with email and password.
    ///
    /// Accounts with 2FA enabled get [`LoginOutcome::OtpRequired`] back on
    /// the first call; a second call with `otp_code` set completes the login.
    /// Invalid credentials (401) and malformed requests (400) fail with
    /// [`ApiError::Auth`].
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        otp_code: Option<&str>,
    ) -> Result<LoginOutcome, ApiError> {
        let url = format!("{}/v1/auth/login", self.config.base_url);

        let mut payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        if let Some(code) = otp_code {
            payload["otpCode"] = serde_json::Value::String(code.to_string());
        }

        let response = self
            .http
            .post(&url, &payload.to_string(), &self.auth_headers())
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        if response.status == 401 {
            return Err(ApiError::Auth("invalid email or password".to_string()));
        }
        if !response.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(ApiError::Auth(format!("login failed: {}", text.trim())));
        }

        let tokens: AuthTokens = response
            .json()
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        if tokens.is_otp_required && otp_code.is_none() {
            debug!("login requires a one-time code");
            return Ok(LoginOutcome::OtpRequired);
        }

        let (access, refresh) = match (tokens.access_token, tokens.refresh_token) {
            (Some(a), Some(r)) => (a, r),
            _ => {
                return Err(ApiError::InvalidResponse(
                    "login response is missing tokens".to_string(),
                ))
            }
        };

        let pair = TokenPair::from_tokens(access, refresh);
        debug!(expires_at = %pair.access_expires_at, "login successful");

        {
            let mut guard = self.state.lock().await;
            *guard = Some(pair.clone());
        }
        self.notify_listener(&pair);

        Ok(LoginOutcome::Authenticated(pair))
    }

    /// Return a currently valid access token, refreshing first if the token
    /// expires within the proactive buffer.
    ///
    /// Refresh failure on a dead refresh token is terminal
    /// ([`ApiError::ReauthRequired`]); the host must obtain fresh
    /// credentials, it is never retried here.
    pub async fn ensure_valid_token(&self) -> Result<String, ApiError> {
        let mut guard = self.state.lock().await;
        if let Some(pair) = guard.as_ref() {
            if pair.is_valid_at(Utc::now()) {
                return Ok(pair.access_token.clone());
            }
        }

        debug!("access token expired or expiring soon, refreshing");
        let pair = self.refresh_locked(&mut guard).await?;
        let token = pair.access_token.clone();
        drop(guard);
        self.notify_listener(&pair);
        Ok(token)
    }

    /// Recover from a server-side token rejection (401 on an API call).
    ///
    /// If another caller already replaced the rejected token while this one
    /// waited for the lock, the fresh token is reused without a second
    /// refresh round-trip.
    pub async fn refresh_after_rejection(&self, rejected_token: &str) -> Result<String, ApiError> {
        let mut guard = self.state.lock().await;
        if let Some(pair) = guard.as_ref() {
            if pair.access_token != rejected_token {
                return Ok(pair.access_token.clone());
            }
        }

        debug!("access token rejected by server, refreshing");
        let pair = self.refresh_locked(&mut guard).await?;
        let token = pair.access_token.clone();
        drop(guard);
        self.notify_listener(&pair);
        Ok(token)
    }

    /// Perform the refresh round-trip. Caller holds the state lock, which is
    /// what serializes concurrent refreshes.
    async fn refresh_locked(
        &self,
        guard: &mut Option<TokenPair>,
    ) -> Result<TokenPair, ApiError> {
        let current_refresh = match guard.as_ref() {
            Some(pair) => pair.refresh_token.clone(),
            None => {
                return Err(ApiError::ReauthRequired(
                    "no refresh token available".to_string(),
                ))
            }
        };

        let url = format!("{}/v1/auth/refresh-access-token", self.config.base_url);
        let mut headers = self.auth_headers();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", current_refresh),
        );

        let response = self
            .http
            .post(&url, "", &headers)
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        match response.status {
            200 => {}
            400 | 401 | 403 => {
                // The refresh token is dead. Drop the pair so concurrent
                // callers fail fast instead of re-attempting the refresh.
                *guard = None;
                let text = response.text().unwrap_or_default();
                return Err(ApiError::ReauthRequired(format!(
                    "refresh token rejected: {}",
                    text.trim()
                )));
            }
            status => return Err(ApiError::from_status(status, &response.body)),
        }

        let refreshed: RefreshResponse = response
            .json()
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let refresh_token = refreshed.refresh_token.unwrap_or(current_refresh);
        let pair = TokenPair::from_tokens(refreshed.access_token, refresh_token);
        debug!(expires_at = %pair.access_expires_at, "token refreshed");

        *guard = Some(pair.clone());
        Ok(pair)
    }

    /// Log out: best-effort remote invalidation, then clear local state.
    ///
    /// The local token pair is cleared regardless of whether the remote call
    /// succeeded.
    pub async fn logout(&self) {
        let pair = {
            let mut guard = self.state.lock().await;
            guard.take()
        };

        let Some(pair) = pair else { return };

        let url = format!("{}/v1/auth/logout", self.config.base_url);
        let mut headers = Headers::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", pair.access_token),
        );

        match self.http.post(&url, "", &headers).await {
            Ok(response) if response.is_success() => debug!("logout successful"),
            Ok(response) => warn!(status = response.status, "remote logout rejected"),
            Err(err) => warn!("remote logout failed: {}", err),
        }
    }

    /// The current resumable session, if authenticated.
    pub async fn current_session(&self) -> Option<SessionTokens> {
        let guard = self.state.lock().await;
        guard.as_ref().map(TokenPair::session_tokens)
    }
}

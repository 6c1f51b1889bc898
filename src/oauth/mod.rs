//! OAuth2 authorization-code session.
//!
//! ```text
//! None --authorize--> Authorizing(state) --handle_callback--> Authorized
//!   ^                        |                                  |   ^
//!   +------- failure --------+                          refresh |   | success or failure
//!                                                               v   |
//!                                                            Refreshing
//! ```
//!
//! Once authorized, the session's [`Client`] sends
//! `Authorization: Bearer <access token>` on every request.

mod config;
mod state;

pub use config::{OAuthConfig, OAuthConfigBuilder};
pub use state::{
    FixedStateTokenGenerator, RandomStateTokenGenerator, StateTokenGenerator,
    TimestampStateTokenGenerator,
};

use crate::client::Client;
use crate::encoding::params;
use crate::error::{OAuthError, RestError, Result};
use crate::request::{HttpMethod, RequestBuilder};
use crate::response::Response;
use parking_lot::{Mutex, RwLock};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Position in the authorization flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No flow in progress and no tokens.
    None,
    /// Waiting for the browser callback carrying `state_token`.
    Authorizing {
        /// Token the callback must echo back.
        state_token: String,
    },
    /// Tokens available.
    Authorized,
    /// A refresh request is in flight.
    Refreshing,
}

/// Tokens obtained from the service.
#[derive(Clone, Default)]
pub struct TokenSet {
    /// Access token.
    pub access_token: Option<SecretString>,
    /// OpenID Connect ID token.
    pub id_token: Option<String>,
    /// Refresh token.
    pub refresh_token: Option<SecretString>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// An OAuth2 session for one service.
pub struct OAuthSession {
    config: OAuthConfig,
    state: Mutex<SessionState>,
    tokens: Arc<RwLock<TokenSet>>,
    client: Client,
    generator: Arc<dyn StateTokenGenerator>,
    account_name: RwLock<Option<String>>,
}

impl std::fmt::Debug for OAuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSession")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("tokens", &*self.tokens.read())
            .finish_non_exhaustive()
    }
}

impl OAuthSession {
    /// Create a session. `client` gets the JSON parser and a bearer-token
    /// request modifier installed.
    pub fn new(config: OAuthConfig, client: Client) -> Self {
        let tokens = Arc::new(RwLock::new(TokenSet::default()));
        let bearer = tokens.clone();
        let client = client.with_json_parser().with_request_modifier(move |request| {
            match bearer.read().access_token.as_ref() {
                Some(token) => request.with_header(
                    "Authorization",
                    format!("Bearer {}", token.expose_secret()),
                ),
                None => request,
            }
        });

        Self {
            config,
            state: Mutex::new(SessionState::None),
            tokens,
            client,
            generator: Arc::new(RandomStateTokenGenerator),
            account_name: RwLock::new(None),
        }
    }

    /// Use another state token generator.
    pub fn with_state_generator(mut self, generator: Arc<dyn StateTokenGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// The authorized client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Current flow state.
    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Snapshot of the current tokens.
    pub fn tokens(&self) -> TokenSet {
        self.tokens.read().clone()
    }

    /// The access token, if authorized.
    pub fn access_token(&self) -> Option<SecretString> {
        self.tokens.read().access_token.clone()
    }

    /// Set the account name reported by [`OAuthSession::username`].
    pub fn set_account_name(&self, name: Option<String>) {
        *self.account_name.write() = name;
    }

    /// The account name, else the ID token.
    pub fn username(&self) -> Option<String> {
        self.account_name
            .read()
            .clone()
            .or_else(|| self.tokens.read().id_token.clone())
    }

    /// Replace the client's base URL.
    pub fn set_base_url(&mut self, url: Url) {
        if self.client.config().base_url.as_ref() != Some(&url) {
            self.client.set_base_url(url);
        }
    }

    /// Installs previously stored tokens and moves to `Authorized`.
    pub fn restore(&self, tokens: TokenSet) {
        *self.tokens.write() = tokens;
        self.transition(SessionState::Authorized);
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.lock();
        debug!(service = %self.config.service_name, from = ?*state, to = ?next, "OAuth state transition");
        *state = next;
    }

    /// Drops every token and returns to `None`. Tokens exist only while
    /// authorized.
    fn reset(&self) {
        *self.tokens.write() = TokenSet::default();
        self.transition(SessionState::None);
    }

    /// Begins an authorization flow and returns the URL to open in a browser.
    pub fn authorize(&self) -> Result<Url> {
        let mut state = self.state.lock();
        if *state != SessionState::None {
            return Err(OAuthError::ActiveAuthSession.into());
        }

        let state_token = self.generator.generate();
        let query = params([
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", self.config.scope.as_str()),
            ("state", state_token.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ]);
        let request = RequestBuilder::new(HttpMethod::Get, self.config.authorization_url.as_str())
            .query(query)
            .build()?;

        debug!(service = %self.config.service_name, "OAuth state transition to Authorizing");
        *state = SessionState::Authorizing { state_token };
        Ok(request.url().clone())
    }

    /// Verifies the redirect back from the browser and exchanges its code
    /// for tokens.
    pub async fn handle_callback(&self, callback: &Url) -> Result<()> {
        let query_value = |name: &str| {
            callback
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };

        let verified = match (&*self.state.lock(), query_value("state")) {
            (SessionState::Authorizing { state_token }, Some(received)) => *state_token == received,
            _ => false,
        };
        if !verified {
            warn!(service = %self.config.service_name, "OAuth callback state mismatch");
            self.reset();
            return Err(OAuthError::InvalidStateVerification.into());
        }

        let Some(code) = query_value("code") else {
            self.reset();
            return Err(OAuthError::InvalidOrMissingCode.into());
        };

        let body = json!({
            "grant_type": "authorization_code",
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret(),
            "redirect_uri": self.config.redirect_uri.as_str(),
            "code": code,
        });

        let response = match self.post_token_request(&self.config.token_url, body).await {
            Ok(response) => response,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        let Some(access_token) = string_field(&response, "access_token") else {
            self.reset();
            return Err(OAuthError::InvalidTokenResponse.into());
        };

        *self.tokens.write() = TokenSet {
            access_token: Some(SecretString::new(access_token)),
            id_token: string_field(&response, "id_token"),
            refresh_token: string_field(&response, "refresh_token").map(SecretString::new),
        };
        self.transition(SessionState::Authorized);
        Ok(())
    }

    /// Obtains a new access token with the stored refresh token.
    pub async fn refresh(&self) -> Result<()> {
        let refresh_token = {
            let mut state = self.state.lock();
            let refresh_token = self
                .tokens
                .read()
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().clone());
            match (&*state, refresh_token) {
                (SessionState::Authorized, Some(token)) => {
                    *state = SessionState::Refreshing;
                    token
                }
                _ => return Err(OAuthError::InvalidRefreshState.into()),
            }
        };
        debug!(service = %self.config.service_name, "Refreshing OAuth tokens");

        let body = json!({
            "refresh_token": refresh_token,
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret(),
            "grant_type": "refresh_token",
        });

        let result = self
            .post_token_request(&self.config.refresh_url, body)
            .await
            .and_then(|response| {
                string_field(&response, "access_token")
                    .ok_or_else(|| RestError::from(OAuthError::InvalidTokenResponse))
            });

        if let Ok(access_token) = &result {
            self.tokens.write().access_token = Some(SecretString::new(access_token.clone()));
        }
        self.transition(SessionState::Authorized);
        result.map(|_| ())
    }

    async fn post_token_request(&self, url: &Url, body: Value) -> Result<Response> {
        self.client.post_json(url.as_str(), body).await
    }
}

fn string_field(response: &Response, name: &str) -> Option<String> {
    response
        .parsed()
        .and_then(|v| v.get(name))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::mocks::{MockResponse, MockTransport};

    fn session(transport: MockTransport) -> (OAuthSession, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let config = OAuthConfig::builder()
            .service_name("Example")
            .client_id("client-1")
            .client_secret("secret-1")
            .authorization_url("https://auth.example.com/authorize")
            .redirect_uri("app://oauth_verify")
            .token_url("https://auth.example.com/token")
            .scope("read write")
            .build()
            .unwrap();
        let client = Client::new(ClientConfig::default(), transport.clone());
        let session = OAuthSession::new(config, client)
            .with_state_generator(Arc::new(FixedStateTokenGenerator("xyz".into())));
        (session, transport)
    }

    #[test]
    fn test_authorize_url() {
        let (session, _) = session(MockTransport::new());
        let url = session.authorize().unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "client-1");
        assert_eq!(pairs["redirect_uri"], "app://oauth_verify");
        assert_eq!(pairs["scope"], "read write");
        assert_eq!(pairs["state"], "xyz");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(
            session.state(),
            SessionState::Authorizing {
                state_token: "xyz".into()
            }
        );
    }

    #[test]
    fn test_authorize_twice_fails() {
        let (session, _) = session(MockTransport::new());
        session.authorize().unwrap();
        let err = session.authorize().unwrap_err();
        assert!(matches!(err, RestError::OAuth(OAuthError::ActiveAuthSession)));
    }

    #[tokio::test]
    async fn test_callback_state_mismatch_resets() {
        let (session, _) = session(MockTransport::new());
        session.authorize().unwrap();
        let err = session
            .handle_callback(&Url::parse("app://oauth_verify?state=nope&code=c").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RestError::OAuth(OAuthError::InvalidStateVerification)));
        assert_eq!(session.state(), SessionState::None);
    }

    #[tokio::test]
    async fn test_callback_exchanges_code() {
        let (session, transport) = session(MockTransport::with_default(MockResponse::json(
            200,
            r#"{"access_token":"at","id_token":"user@example.com","refresh_token":"rt"}"#,
        )));
        session.authorize().unwrap();
        session
            .handle_callback(&Url::parse("app://oauth_verify?state=xyz&code=abc").unwrap())
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Authorized);
        assert_eq!(session.access_token().unwrap().expose_secret(), "at");
        assert_eq!(session.username().as_deref(), Some("user@example.com"));

        let sent = transport.last_request().unwrap();
        let body: Value = serde_json::from_slice(sent.body().unwrap()).unwrap();
        assert_eq!(body["grant_type"], "authorization_code");
        assert_eq!(body["code"], "abc");
        assert_eq!(body["client_secret"], "secret-1");
    }

    #[tokio::test]
    async fn test_refresh_failure_returns_to_authorized() {
        let (session, _) = session(MockTransport::with_default(MockResponse::json(200, r#"{}"#)));
        session.restore(TokenSet {
            access_token: Some(SecretString::new("old".into())),
            id_token: None,
            refresh_token: Some(SecretString::new("rt".into())),
        });

        let err = session.refresh().await.unwrap_err();
        assert!(matches!(err, RestError::OAuth(OAuthError::InvalidTokenResponse)));
        assert_eq!(session.state(), SessionState::Authorized);
        assert_eq!(session.access_token().unwrap().expose_secret(), "old");
    }

    #[tokio::test]
    async fn test_refresh_requires_refresh_token() {
        let (session, _) = session(MockTransport::new());
        let err = session.refresh().await.unwrap_err();
        assert!(matches!(err, RestError::OAuth(OAuthError::InvalidRefreshState)));
        assert_eq!(session.state(), SessionState::None);
    }
}

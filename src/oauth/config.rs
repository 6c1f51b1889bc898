//! OAuth session configuration.

use crate::error::{ConfigurationError, RestError};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Client registration and endpoints for one OAuth service.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Display name of the service.
    pub service_name: String,
    /// Client ID.
    pub client_id: String,
    client_secret: SecretString,
    /// Browser authorization endpoint.
    pub authorization_url: Url,
    /// Redirect URI registered with the service.
    pub redirect_uri: Url,
    /// Code exchange endpoint.
    pub token_url: Url,
    /// Refresh endpoint.
    pub refresh_url: Url,
    /// Space-separated scopes.
    pub scope: String,
}

impl OAuthConfig {
    /// Create a new configuration builder.
    pub fn builder() -> OAuthConfigBuilder {
        OAuthConfigBuilder::new()
    }

    /// Get the client secret.
    ///
    /// Note: This exposes the secret. Use carefully and avoid logging.
    pub fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("service_name", &self.service_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("authorization_url", &self.authorization_url.as_str())
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("refresh_url", &self.refresh_url.as_str())
            .field("scope", &self.scope)
            .finish()
    }
}

/// Builder for [`OAuthConfig`].
#[derive(Default)]
pub struct OAuthConfigBuilder {
    service_name: Option<String>,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    authorization_url: Option<String>,
    redirect_uri: Option<String>,
    token_url: Option<String>,
    refresh_url: Option<String>,
    scope: String,
}

impl OAuthConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service name.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set the authorization endpoint.
    pub fn authorization_url(mut self, url: impl Into<String>) -> Self {
        self.authorization_url = Some(url.into());
        self
    }

    /// Set the redirect URI.
    pub fn redirect_uri(mut self, url: impl Into<String>) -> Self {
        self.redirect_uri = Some(url.into());
        self
    }

    /// Set the token endpoint.
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    /// Set the refresh endpoint. Defaults to the token endpoint.
    pub fn refresh_url(mut self, url: impl Into<String>) -> Self {
        self.refresh_url = Some(url.into());
        self
    }

    /// Set the scope string.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<OAuthConfig, RestError> {
        let client_id = required("client_id", self.client_id)?;
        let client_secret = self.client_secret.ok_or_else(|| missing("client_secret"))?;
        let authorization_url = parse("authorization_url", required("authorization_url", self.authorization_url)?)?;
        let redirect_uri = parse("redirect_uri", required("redirect_uri", self.redirect_uri)?)?;
        let token_url = parse("token_url", required("token_url", self.token_url)?)?;
        let refresh_url = match self.refresh_url {
            Some(url) => parse("refresh_url", url)?,
            None => token_url.clone(),
        };

        Ok(OAuthConfig {
            service_name: self.service_name.unwrap_or_default(),
            client_id,
            client_secret,
            authorization_url,
            redirect_uri,
            token_url,
            refresh_url,
            scope: self.scope,
        })
    }
}

fn missing(field: &str) -> RestError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        message: "is required".to_string(),
    }
    .into()
}

fn required(field: &str, value: Option<String>) -> Result<String, RestError> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| missing(field))
}

fn parse(field: &str, value: String) -> Result<Url, RestError> {
    Url::parse(&value).map_err(|e| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            message: format!("'{}': {}", value, e),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> OAuthConfigBuilder {
        OAuthConfig::builder()
            .service_name("Example")
            .client_id("client")
            .client_secret("shh")
            .authorization_url("https://auth.example.com/authorize")
            .redirect_uri("app://oauth")
            .token_url("https://auth.example.com/token")
    }

    #[test]
    fn test_refresh_defaults_to_token_url() {
        let config = builder().build().unwrap();
        assert_eq!(config.refresh_url, config.token_url);
    }

    #[test]
    fn test_missing_client_id() {
        let result = OAuthConfig::builder().client_secret("s").build();
        assert!(matches!(
            result,
            Err(RestError::Configuration(ConfigurationError::InvalidValue { ref field, .. })) if field == "client_id"
        ));
    }

    #[test]
    fn test_invalid_url() {
        let result = builder().token_url("not a url").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", builder().build().unwrap());
        assert!(!debug.contains("shh"));
    }
}

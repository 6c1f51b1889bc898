//! S3 request signer.

use super::*;
use crate::error::{ConfigurationError, RestError};
use crate::request::{HttpMethod, Request};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Long-term S3 credentials.
#[derive(Clone)]
pub struct S3Credentials {
    access_key_id: String,
    secret_access_key: SecretString,
    region: String,
}

impl S3Credentials {
    /// Create credentials for the default region.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::new(secret_access_key.into()),
            region: DEFAULT_REGION.to_string(),
        }
    }

    /// Set the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
    /// and `AWS_REGION` (falling back to `AWS_DEFAULT_REGION`).
    pub fn from_env() -> Result<Self, RestError> {
        Self::from_lookup(|variable| std::env::var(variable).ok())
    }

    /// Load credentials through `lookup`, reading the same variables as
    /// [`S3Credentials::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_key_id = required(&lookup, "AWS_ACCESS_KEY_ID")?;
        let secret_access_key = required(&lookup, "AWS_SECRET_ACCESS_KEY")?;
        let region = lookup("AWS_REGION")
            .or_else(|| lookup("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Ok(Self::new(access_key_id, secret_access_key).with_region(region))
    }

    /// Get the access key ID.
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret access key.
    ///
    /// Note: This exposes the secret. Use carefully and avoid logging.
    pub fn secret_access_key(&self) -> &str {
        self.secret_access_key.expose_secret()
    }

    /// Get the region.
    pub fn region(&self) -> &str {
        &self.region
    }
}

fn required<F>(lookup: &F, variable: &str) -> Result<String, RestError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(variable)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ConfigurationError::MissingEnvironment {
                variable: variable.to_string(),
            }
            .into()
        })
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("region", &self.region)
            .finish()
    }
}

/// Source of the signing timestamp.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a fixed instant, for reproducible signatures.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Signature scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningMode {
    /// `AWS4-HMAC-SHA256` with a derived key.
    #[default]
    V4,
    /// `AWS key:signature` with an `Expires` timestamp.
    Legacy,
}

/// Signs requests with S3 credentials.
#[derive(Clone)]
pub struct S3Signer {
    credentials: S3Credentials,
    mode: SigningMode,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for S3Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Signer")
            .field("credentials", &self.credentials)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Default validity of a legacy signature, in seconds.
const DEFAULT_EXPIRY_SECS: i64 = 3600;

impl S3Signer {
    /// Create a V4 signer using the system clock.
    pub fn new(credentials: S3Credentials) -> Self {
        Self {
            credentials,
            mode: SigningMode::V4,
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the signing mode.
    pub fn with_mode(mut self, mode: SigningMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the clock.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The credentials.
    pub fn credentials(&self) -> &S3Credentials {
        &self.credentials
    }

    /// The signing mode.
    pub fn mode(&self) -> SigningMode {
        self.mode
    }

    /// Signs `request`, valid for one hour in legacy mode.
    pub fn authorize(&self, request: Request) -> Result<Request, RestError> {
        self.authorize_with_expiry(request, Duration::seconds(DEFAULT_EXPIRY_SECS))
    }

    /// Signs `request`. `expires` only affects legacy signatures.
    pub fn authorize_with_expiry(
        &self,
        request: Request,
        expires: Duration,
    ) -> Result<Request, RestError> {
        match self.mode {
            SigningMode::V4 => self.authorize_v4(request),
            SigningMode::Legacy => self.authorize_legacy(request, expires),
        }
    }

    /// Computes the V4 signature for `request` without modifying it.
    pub fn signing_context(&self, request: &Request) -> Result<SigningContext, RestError> {
        let host = host_header(request)?;
        let now = self.clock.now();
        let amz_date = format_datetime(&now);
        let content_hash = content_hash(request);

        let mut names: Vec<&str> = request.headers().names();
        names.extend(["host", "x-amz-date", "x-amz-content-sha256"]);
        let signed_headers = build_signed_headers(names);

        let context = self.context_for(request, &host, now, amz_date, content_hash, signed_headers)?;
        Ok(context)
    }

    fn context_for(
        &self,
        request: &Request,
        host: &str,
        now: DateTime<Utc>,
        amz_date: String,
        content_hash: String,
        signed_headers: String,
    ) -> Result<SigningContext, SigningError> {
        let date_stamp = format_date_stamp(&now);
        let region = self.credentials.region().to_string();

        let canonical_request = build_canonical_request(
            request.method().as_str(),
            request.url().path(),
            request.url().query().unwrap_or(""),
            host,
            &content_hash,
            &amz_date,
            &signed_headers,
        );
        let credential_scope = build_credential_scope(&date_stamp, &region, S3_SERVICE);
        let string_to_sign = build_string_to_sign(&amz_date, &credential_scope, &canonical_request);
        let signing_key = derive_signing_key(
            self.credentials.secret_access_key(),
            &date_stamp,
            &region,
            S3_SERVICE,
        )?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        Ok(SigningContext {
            access_key_id: self.credentials.access_key_id().to_string(),
            region,
            service: S3_SERVICE.to_string(),
            amz_date,
            date_stamp,
            content_hash,
            signed_headers,
            canonical_request,
            credential_scope,
            string_to_sign,
            signing_key,
            signature,
        })
    }

    fn authorize_v4(&self, request: Request) -> Result<Request, RestError> {
        let context = self.signing_context(&request)?;
        trace!(
            access_key_id = %context.access_key_id,
            scope = %context.credential_scope,
            signed_headers = %context.signed_headers,
            "Signed request (v4)"
        );

        let host = host_header(&request)?;
        Ok(request
            .with_header("Host", host)
            .with_header("X-Amz-Date", context.amz_date.clone())
            .with_header("x-amz-content-sha256", context.content_hash.clone())
            .with_header("Authorization", context.authorization()))
    }

    fn authorize_legacy(&self, request: Request, expires: Duration) -> Result<Request, RestError> {
        let host = host_header(&request)?;
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(expires)
            .ok_or_else(|| SigningError::InvalidTimestamp {
                message: format!("expiry {} is out of range", expires),
            })?
            .timestamp();

        let headers = request.headers();
        let string_to_sign = legacy_string_to_sign(
            request.method().as_str(),
            headers.content_type().unwrap_or(""),
            expires_at,
            headers.get("x-amz-acl"),
            headers.get("x-amz-server-side-encryption"),
            request.url().path(),
        );
        let signature = BASE64.encode(hmac_sha256(
            self.credentials.secret_access_key().as_bytes(),
            string_to_sign.as_bytes(),
        )?);
        trace!(access_key_id = %self.credentials.access_key_id(), expires_at, "Signed request (legacy)");

        let authorization = format!(
            "{} {}:{}",
            LEGACY_ALGORITHM,
            self.credentials.access_key_id(),
            signature
        );
        Ok(request
            .with_header("Host", host)
            .with_header("Expires", expires_at.to_string())
            .with_header("Authorization", authorization))
    }
}

fn host_header(request: &Request) -> Result<String, SigningError> {
    let url = request.url();
    let host = url
        .host_str()
        .ok_or_else(|| SigningError::IncompleteParameters {
            message: format!("URL has no host: {}", url),
        })?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn content_hash(request: &Request) -> String {
    match request.method() {
        HttpMethod::Put | HttpMethod::Post => {
            sha256_hex(request.body().map(|b| b.as_ref()).unwrap_or(b""))
        }
        _ => sha256_hex(b""),
    }
}

//! Anti-forgery `state` tokens.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::RngCore;

/// Produces the `state` parameter for an authorization request.
pub trait StateTokenGenerator: Send + Sync {
    /// Returns a fresh token.
    fn generate(&self) -> String;
}

/// 32 bytes from the thread RNG, base64url without padding.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStateTokenGenerator;

impl StateTokenGenerator for RandomStateTokenGenerator {
    fn generate(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Base64 of the current Unix time with fractional seconds.
///
/// Predictable: anyone who knows roughly when the flow started can guess
/// the token. Only for servers that expect this exact format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampStateTokenGenerator;

impl StateTokenGenerator for TimestampStateTokenGenerator {
    fn generate(&self) -> String {
        let now = chrono::Utc::now();
        let seconds = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;
        STANDARD.encode(seconds.to_string())
    }
}

/// Always returns the same token. For tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedStateTokenGenerator(pub String);

impl StateTokenGenerator for FixedStateTokenGenerator {
    fn generate(&self) -> String {
        self.0.clone()
    }
}

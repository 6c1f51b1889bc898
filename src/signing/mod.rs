//! Request signing for S3-compatible object storage.
//!
//! Two modes are available through [`S3Signer`]:
//!
//! - [`SigningMode::V4`]: a canonical request over method, path, query and
//!   the `host`, `x-amz-content-sha256` and `x-amz-date` headers, signed with
//!   a key derived by chained HMAC-SHA256 over date, region, service and
//!   `aws4_request`.
//! - [`SigningMode::Legacy`]: base64 HMAC-SHA256 over method, content type,
//!   expiry, ACL/encryption headers and resource path, keyed by the raw secret.
//!
//! A deployment should pick one mode and use it for every request.

mod canonical;
mod legacy;
mod signer;

pub use canonical::{build_canonical_request, build_signed_headers};
pub use legacy::{legacy_string_to_sign, LEGACY_ALGORITHM};
pub use signer::{Clock, FixedClock, S3Credentials, S3Signer, SigningMode, SystemClock};

use crate::error::SigningError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature V4 algorithm identifier.
pub const AWS_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Service name for S3.
pub const S3_SERVICE: &str = "s3";

/// Default region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Calculate SHA-256 hash of data.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Calculate HMAC-SHA256.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| SigningError::IncompleteParameters {
            message: format!("Invalid HMAC key: {}", e),
        })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Generate the signing key for AWS Signature V4.
///
/// kDate = HMAC("AWS4" + SecretKey, Date)
/// kRegion = HMAC(kDate, Region)
/// kService = HMAC(kRegion, Service)
/// kSigning = HMAC(kService, "aws4_request")
pub fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SigningError> {
    let k_secret = format!("AWS4{}", secret_key);
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Build the credential scope string.
///
/// Format: `{date}/{region}/{service}/aws4_request`
pub fn build_credential_scope(date_stamp: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/aws4_request", date_stamp, region, service)
}

/// Build the V4 string to sign.
pub fn build_string_to_sign(amz_date: &str, credential_scope: &str, canonical_request: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        AWS_ALGORITHM,
        amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    )
}

/// Format a timestamp for AWS signatures.
///
/// Returns the date-time in `YYYYMMDD'T'HHMMSS'Z'` format.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Format a date stamp for AWS signatures.
///
/// Returns the date in `YYYYMMDD` format.
pub fn format_date_stamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d").to_string()
}

/// Every intermediate value of one V4 signature.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningContext {
    /// Access key id.
    pub access_key_id: String,
    /// Region.
    pub region: String,
    /// Service name.
    pub service: String,
    /// Full timestamp, `YYYYMMDD'T'HHMMSS'Z'`.
    pub amz_date: String,
    /// Date-only timestamp, `YYYYMMDD`.
    pub date_stamp: String,
    /// Hex SHA-256 of the signed payload.
    pub content_hash: String,
    /// Semicolon-joined lowercase header names.
    pub signed_headers: String,
    /// Canonical request string.
    pub canonical_request: String,
    /// `date/region/service/aws4_request`.
    pub credential_scope: String,
    /// String to sign.
    pub string_to_sign: String,
    /// Derived signing key.
    pub signing_key: Vec<u8>,
    /// Hex signature.
    pub signature: String,
}

impl SigningContext {
    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!(
            "{} Credential={}/{},SignedHeaders={},Signature={}",
            AWS_ALGORITHM,
            self.access_key_id,
            self.credential_scope,
            self.signed_headers,
            self.signature
        )
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .field("amz_date", &self.amz_date)
            .field("signed_headers", &self.signed_headers)
            .field("credential_scope", &self.credential_scope)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex(b"test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2.
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_derive_signing_key_known_vector() {
        // Published example key derivation for secret wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_build_credential_scope() {
        let scope = build_credential_scope("20231215", "us-east-1", "s3");
        assert_eq!(scope, "20231215/us-east-1/s3/aws4_request");
    }

    #[test]
    fn test_format_datetime() {
        let dt = Utc.with_ymd_and_hms(2023, 12, 15, 10, 30, 45).unwrap();
        assert_eq!(format_datetime(&dt), "20231215T103045Z");
        assert_eq!(format_date_stamp(&dt), "20231215");
    }

    #[test]
    fn test_string_to_sign_layout() {
        let sts = build_string_to_sign("20231215T103045Z", "20231215/us-east-1/s3/aws4_request", "");
        let lines: Vec<&str> = sts.lines().collect();
        assert_eq!(lines[0], "AWS4-HMAC-SHA256");
        assert_eq!(lines[1], "20231215T103045Z");
        assert_eq!(lines[2], "20231215/us-east-1/s3/aws4_request");
        assert_eq!(lines[3], sha256_hex(b""));
    }
}

//! Integration tests for S3 request signing.

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use restwire::request::{Headers, HttpMethod, Request};
use restwire::signing::{
    build_canonical_request, sha256_hex, FixedClock, S3Credentials, S3Signer, SigningMode,
};
use restwire::{ConfigurationError, RestError};
use std::collections::HashMap;
use url::Url;

fn signer_at(day: u32) -> S3Signer {
    S3Signer::new(S3Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"))
        .with_clock(FixedClock(Utc.with_ymd_and_hms(2024, 5, day, 8, 30, 0).unwrap()))
}

fn request(method: HttpMethod, path: &str) -> Request {
    Request::new(
        method,
        Url::parse(&format!("https://s3.amazonaws.com{}", path)).unwrap(),
        Headers::new().with("Content-Type", "text/plain"),
        Some(Bytes::from_static(b"object body")),
    )
}

fn authorization(signer: &S3Signer, request: Request) -> String {
    signer
        .authorize(request)
        .unwrap()
        .headers()
        .get("authorization")
        .unwrap()
        .to_string()
}

#[test]
fn test_signature_is_stable_for_fixed_inputs() {
    let a = authorization(&signer_at(1), request(HttpMethod::Put, "/bucket/key"));
    let b = authorization(&signer_at(1), request(HttpMethod::Put, "/bucket/key"));
    assert_eq!(a, b);
}

#[test]
fn test_signature_changes_with_each_input() {
    let base = authorization(&signer_at(1), request(HttpMethod::Put, "/bucket/key"));

    let other_method = authorization(&signer_at(1), request(HttpMethod::Post, "/bucket/key"));
    let other_path = authorization(&signer_at(1), request(HttpMethod::Put, "/bucket/other"));
    let other_date = authorization(&signer_at(2), request(HttpMethod::Put, "/bucket/key"));
    let other_key = authorization(
        &S3Signer::new(S3Credentials::new("AKIDEXAMPLE", "different"))
            .with_clock(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap())),
        request(HttpMethod::Put, "/bucket/key"),
    );

    for other in [other_method, other_path, other_date, other_key] {
        assert_ne!(base, other);
    }
}

#[test]
fn test_context_matches_published_layout() {
    let signer = signer_at(1);
    let request = request(HttpMethod::Put, "/bucket/key");
    let context = signer.signing_context(&request).unwrap();

    assert_eq!(context.amz_date, "20240501T083000Z");
    assert_eq!(context.credential_scope, "20240501/us-east-1/s3/aws4_request");
    assert_eq!(context.content_hash, sha256_hex(b"object body"));
    assert_eq!(
        context.canonical_request,
        build_canonical_request(
            "PUT",
            "/bucket/key",
            "",
            "s3.amazonaws.com",
            &context.content_hash,
            "20240501T083000Z",
            "content-type;host;x-amz-content-sha256;x-amz-date",
        )
    );
    assert!(context.string_to_sign.ends_with(&sha256_hex(context.canonical_request.as_bytes())));
    assert_eq!(context.signature.len(), 64);
}

#[test]
fn test_region_in_scope() {
    let signer = S3Signer::new(S3Credentials::new("AKID", "secret").with_region("eu-west-1"))
        .with_clock(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
    let auth = authorization(&signer, request(HttpMethod::Get, "/b/k"));
    assert!(auth.contains("/20240501/eu-west-1/s3/aws4_request,"));
}

#[test]
fn test_query_is_part_of_canonical_request() {
    let signer = signer_at(1);
    let with_query = Request::new(
        HttpMethod::Get,
        Url::parse("https://s3.amazonaws.com/b?list-type=2").unwrap(),
        Headers::new(),
        None,
    );
    let context = signer.signing_context(&with_query).unwrap();
    assert!(context.canonical_request.starts_with("GET\n/b\nlist-type=2\n"));
}

#[test]
fn test_legacy_mode_uses_expires() {
    let signer = signer_at(1).with_mode(SigningMode::Legacy);
    let signed = signer.authorize(request(HttpMethod::Put, "/bucket/key")).unwrap();

    let expected_expiry = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap().timestamp();
    assert_eq!(
        signed.headers().get("expires"),
        Some(expected_expiry.to_string().as_str())
    );
    assert!(signed
        .headers()
        .get("authorization")
        .unwrap()
        .starts_with("AWS AKIDEXAMPLE:"));
    assert!(!signed.headers().contains("x-amz-date"));
}

fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn test_credentials_lookup_requires_key() {
    let err = S3Credentials::from_lookup(lookup_from(&[("AWS_SECRET_ACCESS_KEY", "secret")]))
        .unwrap_err();
    assert!(matches!(
        err,
        RestError::Configuration(ConfigurationError::MissingEnvironment { ref variable })
            if variable == "AWS_ACCESS_KEY_ID"
    ));

    let empty = S3Credentials::from_lookup(lookup_from(&[
        ("AWS_ACCESS_KEY_ID", ""),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
    ]));
    assert!(empty.is_err());
}

#[test]
fn test_credentials_lookup_region_fallbacks() {
    let keys = [("AWS_ACCESS_KEY_ID", "AKID"), ("AWS_SECRET_ACCESS_KEY", "secret")];

    let default = S3Credentials::from_lookup(lookup_from(&keys)).unwrap();
    assert_eq!(default.region(), "us-east-1");

    let mut with_default_region = keys.to_vec();
    with_default_region.push(("AWS_DEFAULT_REGION", "eu-west-1"));
    let creds = S3Credentials::from_lookup(lookup_from(&with_default_region)).unwrap();
    assert_eq!(creds.region(), "eu-west-1");

    with_default_region.push(("AWS_REGION", "ap-south-1"));
    let creds = S3Credentials::from_lookup(lookup_from(&with_default_region)).unwrap();
    assert_eq!(creds.region(), "ap-south-1");
    assert_eq!(creds.access_key_id(), "AKID");
}

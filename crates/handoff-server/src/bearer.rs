//! Bearer token extraction

use axum::http::{header, HeaderMap};
use handoff_core::{Error, Result};

/// Extract the token from an `Authorization: Bearer <token>` header
///
/// Returns `Ok(None)` when no header is present. A header that is present but
/// not a well-formed bearer credential is rejected before any lookup.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| Error::validation("Authorization header is not valid text"))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| Error::validation("Authorization header must be 'Bearer <token>'"))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(Error::validation("Authorization scheme must be Bearer"));
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(Error::validation("Bearer token is malformed"));
    }
    Ok(Some(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_absent_header() {
        assert_eq!(bearer_token(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn test_well_formed_header() {
        assert_eq!(bearer_token(&headers("Bearer abc123")).unwrap(), Some("abc123"));
        assert_eq!(bearer_token(&headers("bearer abc123")).unwrap(), Some("abc123"));
    }

    #[test]
    fn test_garbled_headers() {
        for value in ["Bearer", "Bearer ", "Basic dXNlcjpwdw==", "Bearer a b", "abc123"] {
            assert!(
                matches!(bearer_token(&headers(value)), Err(Error::Validation(_))),
                "{value}"
            );
        }
    }
}

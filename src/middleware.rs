//! Request guards applied by the external router before a handler runs.
//!
//! CSRF mitigation: every state-mutating request must carry a non-empty
//! `X-Requested-With` header. Custom headers force a CORS preflight, so
//! a malicious cross-origin page cannot forge them. Safe methods and the
//! endpoints with their own protection (health, warmup, signed
//! webhooks) are exempt.

use crate::errors::{Error, Result};

const SAFE_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS"];

const EXEMPT_PREFIXES: &[&str] = &["/health", "/api/warmup", "/webhooks/"];

/// Reject a state-mutating request that lacks the custom header. The
/// header value itself is irrelevant; only presence matters.
pub fn enforce_csrf(method: &str, path: &str, requested_with: Option<&str>) -> Result<()> {
    let method = method.to_ascii_uppercase();
    if SAFE_METHODS.contains(&method.as_str()) {
        return Ok(());
    }
    if EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return Ok(());
    }

    match requested_with {
        Some(value) if !value.is_empty() => Ok(()),
        _ => {
            tracing::warn!(method = %method, path = path, "blocked request without X-Requested-With");
            Err(Error::CsrfRejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_methods_pass() {
        assert!(enforce_csrf("GET", "/api/vault/status", None).is_ok());
        assert!(enforce_csrf("head", "/api/documents", None).is_ok());
        assert!(enforce_csrf("OPTIONS", "/api/detokenize", None).is_ok());
    }

    #[test]
    fn test_mutating_requests_require_header() {
        assert!(enforce_csrf("POST", "/api/detokenize", None).is_err());
        assert!(enforce_csrf("POST", "/api/detokenize", Some("")).is_err());
        assert!(enforce_csrf("POST", "/api/detokenize", Some("XMLHttpRequest")).is_ok());
        assert!(enforce_csrf("DELETE", "/api/documents/abc", Some("fetch")).is_ok());
    }

    #[test]
    fn test_exempt_prefixes_pass() {
        assert!(enforce_csrf("POST", "/health", None).is_ok());
        assert!(enforce_csrf("POST", "/api/warmup", None).is_ok());
        assert!(enforce_csrf("POST", "/webhooks/billing", None).is_ok());
    }
}

//! Outbound `Authorization` header assembly for resolver and HTTP-adapter requests.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::client_error::ClientError;
use crate::config::Config;

/// Acquires a SPNEGO token for a target service principal.
///
/// GSSAPI context negotiation is platform- and library-specific and out of scope for this
/// crate; callers who need Kerberos auth bring their own implementation.
pub trait KerberosProvider: Send + Sync {
    /// Return the raw SPNEGO token bytes for `service_principal`, or an error description.
    fn acquire_token(&self, service_principal: &str) -> Result<Vec<u8>, String>;
}

/// Build the headers to attach to an outbound request, dispatching on `config.auth_method`.
///
/// - unset → no headers.
/// - `jwt` → resolves a token from `jwt_token`, then the environment variable named by
///   `jwt_token_env` (default `WAYFARE_JWT`), then `jwt_token_file` (read and trimmed).
/// - `kerberos` → delegates to `kerberos_provider`. Requesting Kerberos auth without a
///   configured provider is a loud [`ClientError::ConfigurationError`], not a silent
///   no-auth fallback.
pub fn auth_headers(
    config: &Config,
    kerberos_provider: Option<&dyn KerberosProvider>,
) -> Result<HashMap<String, String>, ClientError> {
    let Some(method) = config.auth_method.as_deref() else {
        return Ok(HashMap::new());
    };

    match method {
        "jwt" => Ok(jwt_headers(config)),
        "kerberos" => kerberos_headers(config, kerberos_provider),
        other => Err(ClientError::configuration(format!("unrecognized auth_method: {other}"))),
    }
}

fn jwt_token(config: &Config) -> Option<String> {
    if let Some(token) = &config.jwt_token {
        return Some(token.clone());
    }
    if !config.jwt_token_env.is_empty() {
        if let Ok(token) = std::env::var(&config.jwt_token_env) {
            if !token.is_empty() {
                return Some(token);
            }
        }
    }
    if let Some(path) = &config.jwt_token_file {
        match std::fs::read_to_string(path) {
            Ok(contents) => return Some(contents.trim().to_string()),
            Err(e) => tracing::warn!(path, error = %e, "failed to read JWT token file"),
        }
    }
    None
}

fn jwt_headers(config: &Config) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    if let Some(token) = jwt_token(config) {
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
    }
    headers
}

fn kerberos_headers(
    config: &Config,
    provider: Option<&dyn KerberosProvider>,
) -> Result<HashMap<String, String>, ClientError> {
    let principal = config.kerberos_service_principal.as_deref().ok_or_else(|| {
        ClientError::configuration("kerberos auth requested but no service principal configured")
    })?;
    let provider = provider.ok_or_else(|| {
        ClientError::configuration("kerberos auth requested but no KerberosProvider configured")
    })?;
    let token = provider
        .acquire_token(principal)
        .map_err(|e| ClientError::auth_failure(format!("kerberos authentication failed: {e}")))?;
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), format!("Negotiate {}", BASE64.encode(token)));
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider;
    impl KerberosProvider for StubProvider {
        fn acquire_token(&self, _service_principal: &str) -> Result<Vec<u8>, String> {
            Ok(vec![1, 2, 3])
        }
    }

    #[test]
    fn unset_auth_method_yields_no_headers() {
        let config = Config::default();
        let headers = auth_headers(&config, None).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn jwt_explicit_token_wins_over_environment() {
        let mut config = Config::default();
        config.auth_method = Some("jwt".to_string());
        config.jwt_token = Some("explicit-token".to_string());
        let headers = auth_headers(&config, None).unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer explicit-token");
    }

    #[test]
    fn kerberos_without_provider_is_configuration_error() {
        let mut config = Config::default();
        config.auth_method = Some("kerberos".to_string());
        config.kerberos_service_principal = Some("HTTP/resolver@REALM".to_string());
        let err = auth_headers(&config, None).unwrap_err();
        assert!(matches!(err, ClientError::ConfigurationError { .. }));
    }

    #[test]
    fn kerberos_with_provider_base64_encodes_token() {
        let mut config = Config::default();
        config.auth_method = Some("kerberos".to_string());
        config.kerberos_service_principal = Some("HTTP/resolver@REALM".to_string());
        let provider = StubProvider;
        let headers = auth_headers(&config, Some(&provider)).unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Negotiate AQID");
    }
}

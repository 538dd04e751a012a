//! Client construction errors.
//!
//! Failures of an individual call are never returned from here: they settle
//! the call's header/trailer promises as [`RpcError`](frpc_core::RpcError).

/// Error building a client or its transport.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The configured host is not an absolute `scheme://authority` URI.
    #[error("invalid host {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    /// No usable TLS configuration could be built.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// The underlying channel could not be created.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    pub(crate) fn invalid_host(host: &str, reason: impl std::fmt::Display) -> Self {
        ClientError::InvalidHost {
            host: host.to_owned(),
            reason: reason.to_string(),
        }
    }
}

/// Validate `host` and strip any trailing slash.
pub(crate) fn normalize_host(host: &str) -> Result<String, ClientError> {
    let trimmed = host.trim_end_matches('/');
    let uri: http::Uri = trimmed
        .parse()
        .map_err(|e| ClientError::invalid_host(host, e))?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(ClientError::invalid_host(host, "expected scheme://authority"));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("http://localhost:3000/").unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            normalize_host("https://api.example.com/prefix").unwrap(),
            "https://api.example.com/prefix"
        );
    }

    #[test]
    fn test_normalize_host_rejects_relative() {
        let err = normalize_host("localhost").unwrap_err();
        assert!(matches!(err, ClientError::InvalidHost { .. }));
    }
}

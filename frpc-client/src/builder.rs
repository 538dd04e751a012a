//! Client builder for the frame-based protocol.

use std::time::Duration;

use frpc_core::{DefaultMetadata, MetadataProvider};

use crate::client::FrpcClient;
use crate::error::{ClientError, normalize_host};
use crate::transport::{HyperTransport, HyperTransportBuilder, TlsClientConfig};

/// Builder for [`FrpcClient`].
///
/// # Example
///
/// ```
/// use frpc_client::{ClientBuilder, MetadataProvider};
///
/// let client = ClientBuilder::new("http://localhost:3000/")
///     .metadata("x-client", "frpc-rs")
///     .metadata("authorization", MetadataProvider::from_fn(|| std::env::var("TOKEN").ok()))
///     .build()
///     .unwrap();
/// assert_eq!(client.host(), "http://localhost:3000");
/// ```
pub struct ClientBuilder {
    /// Base URL (e.g., "http://localhost:3000").
    host: String,
    /// Default metadata added to every call.
    metadata: DefaultMetadata,
    /// Pre-built transport; when set, the transport options below are ignored.
    transport: Option<HyperTransport>,
    transport_builder: HyperTransportBuilder,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("host", &self.host)
            .field("metadata", &self.metadata)
            .field("transport", &self.transport.is_some())
            .field("transport_builder", &self.transport_builder)
            .finish()
    }
}

impl ClientBuilder {
    /// Create a builder for `host`.
    ///
    /// The host must include the scheme. A trailing slash is ignored.
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            metadata: DefaultMetadata::new(),
            transport: None,
            transport_builder: HyperTransportBuilder::new(),
        }
    }

    /// Add a default metadata entry.
    ///
    /// Call metadata with the same key takes precedence. Providers run once
    /// per call, and empty or missing values are skipped.
    pub fn metadata<K, P>(mut self, key: K, provider: P) -> Self
    where
        K: Into<String>,
        P: Into<MetadataProvider>,
    {
        self.metadata.insert(key, provider);
        self
    }

    /// Use a pre-built transport.
    pub fn transport(mut self, transport: HyperTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set a custom TLS configuration.
    pub fn tls_config(mut self, config: TlsClientConfig) -> Self {
        self.transport_builder = self.transport_builder.tls_config(config);
        self
    }

    /// Speak HTTP/2 without negotiation.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.transport_builder = self.transport_builder.http2_only(enabled);
        self
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.transport_builder = self.transport_builder.pool_idle_timeout(timeout);
        self
    }

    /// Set the maximum number of idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.transport_builder = self.transport_builder.pool_max_idle_per_host(max);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<FrpcClient, ClientError> {
        let host = normalize_host(&self.host)?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => self.transport_builder.build()?,
        };
        Ok(FrpcClient::new(host, transport, self.metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new("http://localhost:3000");
        assert!(builder.metadata.is_empty());
        assert!(builder.transport.is_none());
    }

    #[test]
    fn test_builder_collects_metadata() {
        let builder = ClientBuilder::new("http://localhost:3000")
            .metadata("a", "1")
            .metadata("b", MetadataProvider::from_fn(|| None))
            .metadata("a", "2");
        let keys: Vec<_> = builder.metadata.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_build_rejects_invalid_host() {
        let err = ClientBuilder::new("not a url").build().unwrap_err();
        assert!(matches!(err, ClientError::InvalidHost { .. }));
    }
}

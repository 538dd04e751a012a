//! HTTP transport for the frame-based client.
//!
//! [`HyperTransport`] wraps hyper_util's legacy client:
//!
//! - HTTP/1.1 and HTTP/2 with automatic protocol negotiation
//! - TLS with rustls (feature-gated, see [`has_tls_support`])
//! - Connection pooling

mod body;
mod connector;
mod hyper;

pub use body::TransportBody;
pub use connector::{
    build_http_connector, build_https_connector, default_tls_config, has_tls_support,
};
pub use hyper::{HyperTransport, HyperTransportBuilder};

// For callers building their own TLS configuration.
pub use rustls::ClientConfig as TlsClientConfig;

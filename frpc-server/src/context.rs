//! Per-call types handed to and returned from handlers.

use axum::http::{Extensions, HeaderMap, StatusCode, Uri, request::Parts};
use frpc_core::Metadata;

/// Response header produced by a handler.
///
/// `status` becomes the HTTP status line. `metadata` entries become extra
/// response headers; names that are not valid header names are skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerHeader {
    pub status: StatusCode,
    pub metadata: Metadata,
}

impl ServerHeader {
    /// Header with the given status and no metadata.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            metadata: Metadata::new(),
        }
    }

    /// `200 OK` with no metadata.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Add a metadata entry.
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata.insert(key, value);
        self
    }
}

impl Default for ServerHeader {
    fn default() -> Self {
        Self::ok()
    }
}

/// What a handler knows about the inbound call besides its messages.
#[derive(Debug, Clone)]
pub struct CallContext {
    metadata: Metadata,
    uri: Uri,
    extensions: Extensions,
}

impl CallContext {
    pub(crate) fn from_parts(parts: &Parts) -> Self {
        Self {
            metadata: header_metadata(&parts.headers),
            uri: parts.uri.clone(),
            extensions: parts.extensions.clone(),
        }
    }

    /// Request headers, flattened.
    ///
    /// Names are lowercase. Repeated headers are joined with `", "` and values
    /// that are not valid UTF-8 are dropped.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Shorthand for `metadata().get(key)`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key)
    }

    /// Request URI as seen by the router.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request extensions, e.g. values inserted by axum middleware.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

fn header_metadata(headers: &HeaderMap) -> Metadata {
    let mut metadata = Metadata::new();
    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if !values.is_empty() {
            metadata.insert(name.as_str(), values.join(", "));
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_server_header_builder() {
        let header = ServerHeader::new(StatusCode::ACCEPTED).with_metadata("x-trace", "abc");
        assert_eq!(header.status, StatusCode::ACCEPTED);
        assert_eq!(header.metadata.get("x-trace"), Some("abc"));
        assert_eq!(ServerHeader::default(), ServerHeader::ok());
    }

    #[test]
    fn test_context_from_parts() {
        let request = Request::builder()
            .uri("/PingPongService/pingPong")
            .header("Authorization", "token")
            .header("x-tag", "a")
            .header("x-tag", "b")
            .extension(7u32)
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        let context = CallContext::from_parts(&parts);

        assert_eq!(context.get("authorization"), Some("token"));
        assert_eq!(context.get("x-tag"), Some("a, b"));
        assert_eq!(context.uri().path(), "/PingPongService/pingPong");
        assert_eq!(context.extensions().get::<u32>(), Some(&7));
    }
}

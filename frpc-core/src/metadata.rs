//! Call metadata and default-metadata providers.
//!
//! [`Metadata`] is an insertion-ordered string map used for request metadata,
//! response headers and trailers. [`DefaultMetadata`] holds the per-client
//! defaults that [`resolve_metadata`] merges under the call's own metadata.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Trailer field carrying the terminal status code.
pub const STATUS_KEY: &str = "status";

/// Trailer field carrying the terminal status message.
pub const STATUS_MESSAGE_KEY: &str = "statusMessage";

/// Insertion-ordered mapping of string keys to string values.
///
/// Inserting an existing key replaces its value in place, so iteration order
/// is the order in which keys were first seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Check if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Check if `key` is present, ignoring ASCII case.
    pub fn contains_key_ignore_ascii_case(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    /// Insert a header-style entry: an existing key equal to `key` ignoring
    /// ASCII case is replaced in place, key spelling included.
    pub fn insert_ignore_ascii_case<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => *entry = (key, value),
            None => self.entries.push((key, value)),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl IntoIterator for Metadata {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

/// Boxed future returned by asynchronous metadata providers.
pub type ProviderFuture = Pin<Box<dyn Future<Output = Option<String>> + Send>>;

/// Source of a default metadata value.
///
/// Providers are invoked once per call and must not rely on being serialized
/// across concurrent calls.
#[derive(Clone)]
pub enum MetadataProvider {
    /// A fixed value.
    Literal(String),
    /// A value computed synchronously on each call.
    Sync(Arc<dyn Fn() -> Option<String> + Send + Sync>),
    /// A value computed asynchronously on each call.
    Async(Arc<dyn Fn() -> ProviderFuture + Send + Sync>),
}

impl MetadataProvider {
    /// A fixed value.
    pub fn literal<S: Into<String>>(value: S) -> Self {
        MetadataProvider::Literal(value.into())
    }

    /// A synchronous provider.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        MetadataProvider::Sync(Arc::new(f))
    }

    /// An asynchronous provider.
    ///
    /// # Example
    ///
    /// ```
    /// use frpc_core::MetadataProvider;
    ///
    /// let token = MetadataProvider::from_async_fn(|| async {
    ///     Some("Bearer token".to_string())
    /// });
    /// # let _ = token;
    /// ```
    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        MetadataProvider::Async(Arc::new(move || Box::pin(f())))
    }

    /// Produce the value for this call.
    pub async fn resolve(&self) -> Option<String> {
        match self {
            MetadataProvider::Literal(value) => Some(value.clone()),
            MetadataProvider::Sync(f) => f(),
            MetadataProvider::Async(f) => f().await,
        }
    }
}

impl std::fmt::Debug for MetadataProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataProvider::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            MetadataProvider::Sync(_) => f.write_str("Sync(..)"),
            MetadataProvider::Async(_) => f.write_str("Async(..)"),
        }
    }
}

impl From<&str> for MetadataProvider {
    fn from(value: &str) -> Self {
        MetadataProvider::literal(value)
    }
}

impl From<String> for MetadataProvider {
    fn from(value: String) -> Self {
        MetadataProvider::Literal(value)
    }
}

/// Ordered table of default metadata providers configured on a client.
#[derive(Clone, Debug, Default)]
pub struct DefaultMetadata {
    entries: Vec<(String, MetadataProvider)>,
}

impl DefaultMetadata {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the provider for `key`.
    pub fn insert<K, P>(&mut self, key: K, provider: P)
    where
        K: Into<String>,
        P: Into<MetadataProvider>,
    {
        let key = key.into();
        let provider = provider.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = provider,
            None => self.entries.push((key, provider)),
        }
    }

    /// Check if there are no providers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate providers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataProvider)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), p))
    }
}

/// Build the effective request metadata for one call.
///
/// Starts from `base` (e.g. a fixed content-type), overlays `call`, then adds
/// every default whose key is still absent. Keys are header names, so they
/// compare ignoring ASCII case. Providers run in table order and only
/// non-empty results are included, so call metadata always wins.
pub async fn resolve_metadata(
    base: Metadata,
    call: Metadata,
    defaults: &DefaultMetadata,
) -> Metadata {
    let mut metadata = base;
    for (key, value) in call {
        metadata.insert_ignore_ascii_case(key, value);
    }
    for (key, provider) in defaults.iter() {
        if metadata.contains_key_ignore_ascii_case(key) {
            continue;
        }
        if let Some(value) = provider.resolve().await.filter(|v| !v.is_empty()) {
            metadata.insert(key, value);
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_insert_preserves_first_position() {
        let mut metadata = Metadata::new();
        metadata.insert("a", "1");
        metadata.insert("b", "2");
        assert_eq!(metadata.insert("a", "3"), Some("1".to_string()));

        let entries: Vec<_> = metadata.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_remove_and_lookup() {
        let mut metadata = Metadata::from([("x", "1"), ("y", "2")]);
        assert_eq!(metadata.get("y"), Some("2"));
        assert_eq!(metadata.remove("x"), Some("1".to_string()));
        assert!(!metadata.contains_key("x"));
        assert_eq!(metadata.len(), 1);
    }

    #[tokio::test]
    async fn test_call_metadata_wins_over_defaults() {
        let mut defaults = DefaultMetadata::new();
        defaults.insert("authorization", "default-token");
        defaults.insert("x-client", "frpc");

        let resolved = resolve_metadata(
            Metadata::from([("content-type", "application/frpc+proto")]),
            Metadata::from([("authorization", "call-token")]),
            &defaults,
        )
        .await;

        let entries: Vec<_> = resolved.iter().collect();
        assert_eq!(
            entries,
            vec![
                ("content-type", "application/frpc+proto"),
                ("authorization", "call-token"),
                ("x-client", "frpc"),
            ]
        );
    }

    #[tokio::test]
    async fn test_call_metadata_wins_regardless_of_case() {
        let mut defaults = DefaultMetadata::new();
        defaults.insert("authorization", "default-token");

        let resolved = resolve_metadata(
            Metadata::from([("content-type", "application/frpc+proto")]),
            Metadata::from([("Authorization", "call-token"), ("Content-Type", "text/plain")]),
            &defaults,
        )
        .await;

        let entries: Vec<_> = resolved.iter().collect();
        assert_eq!(
            entries,
            vec![("Content-Type", "text/plain"), ("Authorization", "call-token")]
        );
    }

    #[tokio::test]
    async fn test_empty_and_missing_values_are_skipped() {
        let mut defaults = DefaultMetadata::new();
        defaults.insert("empty", "");
        defaults.insert("none", MetadataProvider::from_fn(|| None));
        defaults.insert(
            "async",
            MetadataProvider::from_async_fn(|| async { Some("yes".to_string()) }),
        );

        let resolved = resolve_metadata(Metadata::new(), Metadata::new(), &defaults).await;
        assert_eq!(resolved, Metadata::from([("async", "yes")]));
    }

    #[tokio::test]
    async fn test_provider_not_invoked_when_key_present() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let mut defaults = DefaultMetadata::new();
        defaults.insert(
            "token",
            MetadataProvider::from_fn(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                Some("provided".into())
            }),
        );

        let resolved =
            resolve_metadata(Metadata::new(), Metadata::from([("token", "mine")]), &defaults).await;
        assert_eq!(resolved.get("token"), Some("mine"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        resolve_metadata(Metadata::new(), Metadata::new(), &defaults).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

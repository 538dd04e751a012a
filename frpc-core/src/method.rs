//! Static method descriptions and message codecs.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::RpcError;

/// Binary (de)serializer for one message type.
///
/// Transports treat messages as opaque and only ever go through this trait.
pub trait MessageCodec<T>: Send + Sync + 'static {
    /// Serialize a message to bytes.
    fn serialize_binary(&self, value: &T) -> Result<Bytes, RpcError>;

    /// Deserialize a message from bytes.
    fn deserialize_binary(&self, bytes: &[u8]) -> Result<T, RpcError>;
}

/// Shared, type-erased codec handle.
pub type BoxedMessageCodec<T> = Arc<dyn MessageCodec<T>>;

/// [`MessageCodec`] for `prost` generated messages.
pub struct ProstCodec<T>(PhantomData<fn() -> T>);

impl<T> ProstCodec<T> {
    /// Create a codec.
    pub fn new() -> Self {
        ProstCodec(PhantomData)
    }
}

impl<T> Default for ProstCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ProstCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProstCodec")
    }
}

impl<T> MessageCodec<T> for ProstCodec<T>
where
    T: prost::Message + Default + 'static,
{
    fn serialize_binary(&self, value: &T) -> Result<Bytes, RpcError> {
        Ok(Bytes::from(value.encode_to_vec()))
    }

    fn deserialize_binary(&self, bytes: &[u8]) -> Result<T, RpcError> {
        T::decode(bytes).map_err(|e| RpcError::Decode(format!("protobuf decoding failed: {e}")))
    }
}

/// Description of one remote method: its names, streaming shape and codecs.
///
/// Immutable once built and cheap to clone.
///
/// # Example
///
/// ```
/// use frpc_core::MethodDescriptor;
///
/// #[derive(Clone, PartialEq, prost::Message)]
/// struct Ping {
///     #[prost(string, tag = "1")]
///     hello: String,
/// }
///
/// let method = MethodDescriptor::<Ping, Ping>::new("riiid.pingpong.PingPongService", "PingPong")
///     .server_streaming();
/// assert_eq!(method.path(), "/riiid.pingpong.PingPongService/PingPong");
/// assert!(method.response_stream());
/// ```
pub struct MethodDescriptor<Req, Res> {
    service_name: Arc<str>,
    method_name: Arc<str>,
    request_stream: bool,
    response_stream: bool,
    request_type: BoxedMessageCodec<Req>,
    response_type: BoxedMessageCodec<Res>,
}

impl<Req, Res> Clone for MethodDescriptor<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            service_name: self.service_name.clone(),
            method_name: self.method_name.clone(),
            request_stream: self.request_stream,
            response_stream: self.response_stream,
            request_type: self.request_type.clone(),
            response_type: self.response_type.clone(),
        }
    }
}

impl<Req, Res> fmt::Debug for MethodDescriptor<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("service_name", &self.service_name)
            .field("method_name", &self.method_name)
            .field("request_stream", &self.request_stream)
            .field("response_stream", &self.response_stream)
            .finish_non_exhaustive()
    }
}

impl<Req, Res> MethodDescriptor<Req, Res>
where
    Req: prost::Message + Default + 'static,
    Res: prost::Message + Default + 'static,
{
    /// Describe a unary method whose messages are `prost` messages.
    pub fn new(service_name: impl Into<Arc<str>>, method_name: impl Into<Arc<str>>) -> Self {
        Self::with_codecs(
            service_name,
            method_name,
            Arc::new(ProstCodec::<Req>::new()),
            Arc::new(ProstCodec::<Res>::new()),
        )
    }
}

impl<Req, Res> MethodDescriptor<Req, Res> {
    /// Describe a unary method with explicit codecs.
    pub fn with_codecs(
        service_name: impl Into<Arc<str>>,
        method_name: impl Into<Arc<str>>,
        request_type: BoxedMessageCodec<Req>,
        response_type: BoxedMessageCodec<Res>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            request_stream: false,
            response_stream: false,
            request_type,
            response_type,
        }
    }

    /// Mark the request side as streaming.
    pub fn client_streaming(mut self) -> Self {
        self.request_stream = true;
        self
    }

    /// Mark the response side as streaming.
    pub fn server_streaming(mut self) -> Self {
        self.response_stream = true;
        self
    }

    /// Mark both sides as streaming.
    pub fn bidi_streaming(self) -> Self {
        self.client_streaming().server_streaming()
    }

    /// Fully-qualified service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Method name.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Whether the client sends a stream of requests.
    pub fn request_stream(&self) -> bool {
        self.request_stream
    }

    /// Whether the server sends a stream of responses.
    pub fn response_stream(&self) -> bool {
        self.response_stream
    }

    /// Request codec.
    pub fn request_type(&self) -> &BoxedMessageCodec<Req> {
        &self.request_type
    }

    /// Response codec.
    pub fn response_type(&self) -> &BoxedMessageCodec<Res> {
        &self.response_type
    }

    /// `/{service}/{method}`.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service_name, self.method_name)
    }
}

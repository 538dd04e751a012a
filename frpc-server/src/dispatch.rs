//! Serving one call: request body in, framed response out.

use std::pin::pin;

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use frpc_core::{
    BoxedMessageCodec, Drain, EventBuffer, FRPC_CONTENT_TYPE, FrameAssembler, Metadata,
    MethodDescriptor, RpcError, STATUS_KEY, STATUS_MESSAGE_KEY, Settled, encode_message,
    encode_trailer,
};
use futures::{Stream, StreamExt};
use http_body_util::BodyExt;
use tracing::{Instrument, Span, debug, error, info_span, warn};

use crate::context::{CallContext, ServerHeader};
use crate::handler::FrpcHandler;

/// Serve `request` with `handler`.
pub(crate) async fn dispatch<Req, Res, H>(
    method: MethodDescriptor<Req, Res>,
    handler: H,
    request: Request,
) -> Response
where
    Req: Send + 'static,
    Res: Send + 'static,
    H: FrpcHandler<Req, Res>,
{
    let span = info_span!(
        "rpc.serve",
        rpc.system = "frpc",
        rpc.service = %method.service_name(),
        rpc.method = %method.method_name(),
        otel.kind = "server",
    );
    serve(method, handler, request).instrument(span).await
}

async fn serve<Req, Res, H>(
    method: MethodDescriptor<Req, Res>,
    handler: H,
    request: Request,
) -> Response
where
    Req: Send + 'static,
    Res: Send + 'static,
    H: FrpcHandler<Req, Res>,
{
    if let Some(content_type) = unsupported_content_type(request.headers()) {
        debug!(content_type, "rejecting unsupported content type");
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let (parts, body) = request.into_parts();
    let context = CallContext::from_parts(&parts);

    let requests = EventBuffer::new();
    let drain = requests.drain();
    tokio::spawn(
        read_requests(body, requests, method.request_type().clone()).in_current_span(),
    );

    let (responses, header, trailer) = handler.call(drain, context).into_parts();

    let header = match header.await {
        Ok(header) => header,
        Err(err) => {
            error!(error = %err, "handler failed before sending a header");
            return failure_response(&err);
        }
    };
    debug!(status = header.status.as_u16(), "header sent");

    let frames = response_frames(
        responses,
        trailer,
        method.response_type().clone(),
        Span::current(),
    );
    let mut response = Body::from_stream(frames).into_response();
    *response.status_mut() = header.status;
    apply_header(response.headers_mut(), &header);
    response
}

/// The request's content type, if present and not the frame-based protocol's.
fn unsupported_content_type(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::CONTENT_TYPE)?;
    let content_type = value.to_str().unwrap_or_default();
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if essence.eq_ignore_ascii_case(FRPC_CONTENT_TYPE) {
        None
    } else {
        Some(content_type)
    }
}

/// Pump the request body into `requests` until it ends or the handler stops
/// reading. Request trailer frames are ignored.
async fn read_requests<Req>(
    body: Body,
    requests: EventBuffer<Req>,
    codec: BoxedMessageCodec<Req>,
) where
    Req: Send + 'static,
{
    let mut body = pin!(body);
    let mut assembler = FrameAssembler::new();

    loop {
        if requests.is_drain_ended() {
            debug!("handler stopped reading requests");
            break;
        }
        match body.frame().await {
            Some(Ok(frame)) => {
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                assembler.feed(
                    &data,
                    |payload| match codec.deserialize_binary(&payload) {
                        Ok(message) => requests.push(message),
                        Err(err) => warn!(error = %err, "skipping undecodable request message"),
                    },
                    |key, _| debug!(key = %key, "ignoring request trailer"),
                );
            }
            Some(Err(err)) => {
                warn!(error = %err, "request body failed");
                break;
            }
            None => {
                if let Err(err) = assembler.finish() {
                    warn!(error = %err, "request body ended mid-frame");
                }
                break;
            }
        }
    }
    requests.finish();
}

/// Message frames for every response, then one trailer frame per entry.
///
/// A response that fails to serialize or a rejected trailer ends the stream
/// with an error, which aborts the HTTP response.
fn response_frames<Res>(
    mut responses: Drain<Res>,
    trailer: Settled<Metadata>,
    codec: BoxedMessageCodec<Res>,
    span: Span,
) -> impl Stream<Item = Result<Bytes, RpcError>> + Send + 'static
where
    Res: Send + 'static,
{
    async_stream::stream! {
        while let Some(response) = responses.next().await {
            let frame = codec
                .serialize_binary(&response)
                .and_then(|payload| encode_message(&payload).map_err(RpcError::from));
            match frame {
                Ok(frame) => yield Ok(frame),
                Err(err) => {
                    error!(parent: &span, error = %err, "failed to serialize response");
                    yield Err(err);
                    return;
                }
            }
        }
        drop(responses);

        match trailer.await {
            Ok(trailer) => {
                for (key, value) in trailer {
                    match encode_trailer(&key, &value) {
                        Ok(frame) => yield Ok(frame),
                        Err(err) => {
                            error!(
                                parent: &span,
                                error = %err,
                                key = %key,
                                "failed to encode trailer"
                            );
                            yield Err(RpcError::from(err));
                            return;
                        }
                    }
                }
                debug!(parent: &span, "response finished");
            }
            Err(err) => {
                error!(parent: &span, error = %err, "handler failed after sending a header");
                yield Err(err);
            }
        }
    }
}

/// Copy header metadata into response headers, skipping invalid entries.
fn apply_header(headers: &mut HeaderMap, server_header: &ServerHeader) {
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(FRPC_CONTENT_TYPE));
    for (key, value) in server_header.metadata.iter() {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(key, "skipping invalid response header"),
        }
    }
}

/// `500` whose body carries the error as `status` / `statusMessage` trailers.
fn failure_response(err: &RpcError) -> Response {
    let code = err.code().as_i32().to_string();
    let mut body = Vec::new();
    for (key, value) in [(STATUS_KEY, code.as_str()), (STATUS_MESSAGE_KEY, err.message())] {
        match encode_trailer(key, value) {
            Ok(frame) => body.extend_from_slice(&frame),
            Err(frame_err) => warn!(error = %frame_err, key, "dropping failure trailer"),
        }
    }

    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(FRPC_CONTENT_TYPE),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use frpc_core::{Code, RpcCall};

    #[test]
    fn test_unsupported_content_type() {
        let mut headers = HeaderMap::new();
        assert_eq!(unsupported_content_type(&headers), None);

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/frpc+proto; charset=binary"),
        );
        assert_eq!(unsupported_content_type(&headers), None);

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert_eq!(unsupported_content_type(&headers), Some("application/json"));
    }

    #[test]
    fn test_apply_header_skips_invalid_names() {
        let header = ServerHeader::ok()
            .with_metadata("x-request-id", "42")
            .with_metadata("bad name", "x");
        let mut headers = HeaderMap::new();
        apply_header(&mut headers, &header);

        assert_eq!(headers.get("x-request-id").unwrap(), "42");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), FRPC_CONTENT_TYPE);
        assert_eq!(headers.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_response_carries_status() {
        let response = failure_response(&RpcError::new(Code::NotFound, "missing"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let mut expected = Vec::new();
        expected.extend_from_slice(&encode_trailer("status", "5").unwrap());
        expected.extend_from_slice(&encode_trailer("statusMessage", "missing").unwrap());
        assert_eq!(body.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_read_requests_decodes_and_ignores_trailers() {
        struct Utf8;
        impl frpc_core::MessageCodec<String> for Utf8 {
            fn serialize_binary(&self, value: &String) -> Result<Bytes, RpcError> {
                Ok(Bytes::from(value.clone()))
            }
            fn deserialize_binary(&self, bytes: &[u8]) -> Result<String, RpcError> {
                String::from_utf8(bytes.to_vec()).map_err(|e| RpcError::Decode(e.to_string()))
            }
        }

        let mut payload = Vec::new();
        payload.extend_from_slice(&encode_message(b"a").unwrap());
        payload.extend_from_slice(&encode_trailer("k", "v").unwrap());
        payload.extend_from_slice(&encode_message(b"b").unwrap());

        let buffer = EventBuffer::new();
        let drain = buffer.drain();
        read_requests(Body::from(payload), buffer, std::sync::Arc::new(Utf8)).await;

        assert_eq!(drain.collect::<Vec<_>>().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_response_frames_aborts_on_rejected_trailer() {
        let (responder, call) = RpcCall::<Bytes, ServerHeader, Metadata>::responder();
        responder.header(ServerHeader::ok());
        responder.send(Bytes::from_static(b"x"));
        responder.fail(RpcError::internal("boom"));

        struct Raw;
        impl frpc_core::MessageCodec<Bytes> for Raw {
            fn serialize_binary(&self, value: &Bytes) -> Result<Bytes, RpcError> {
                Ok(value.clone())
            }
            fn deserialize_binary(&self, bytes: &[u8]) -> Result<Bytes, RpcError> {
                Ok(Bytes::copy_from_slice(bytes))
            }
        }

        let (responses, _header, trailer) = call.into_parts();
        let codec = std::sync::Arc::new(Raw);
        let frames: Vec<_> = response_frames(responses, trailer, codec, Span::none())
            .collect()
            .await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap(), &encode_message(b"x").unwrap());
        assert!(frames[1].is_err());
    }
}

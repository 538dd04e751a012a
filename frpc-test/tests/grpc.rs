use std::time::Duration;

use frpc_client::{Code, GrpcClientBuilder, Metadata};
use frpc_test::{Ping, Pong, TestServer, UNKNOWN_PING, ping_pong};
use futures::StreamExt;
use tokio::time::timeout;

const LIMIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn grpc_ping_pong_over_tonic_channel() -> anyhow::Result<()> {
    let server = TestServer::spawn_grpc().await?;
    let client = GrpcClientBuilder::new(server.url())
        .metadata("x-client", "frpc-test")
        .connect()?;

    let call = client.unary(&ping_pong(), Ping::new("hello"), Metadata::new());
    let (responses, header, trailer) = call.into_parts();

    let header = timeout(LIMIT, header).await??;
    assert_eq!(header.get("x-client-echo"), Some("frpc-test"));

    let responses: Vec<Pong> = timeout(LIMIT, responses.collect()).await?;
    assert_eq!(responses, vec![Pong::new("world")]);

    let trailer = timeout(LIMIT, trailer).await??;
    assert_eq!(trailer.get("status"), Some("0"));
    assert_eq!(trailer.get("statusMessage"), Some(""));
    Ok(())
}

#[tokio::test]
async fn grpc_error_status_reaches_the_trailer() -> anyhow::Result<()> {
    let server = TestServer::spawn_grpc().await?;
    let client = GrpcClientBuilder::new(server.url()).connect()?;

    let call = client.unary(&ping_pong(), Ping::new(UNKNOWN_PING), Metadata::new());
    let (responses, header, trailer) = call.into_parts();

    let header = timeout(LIMIT, header).await?;
    assert_eq!(header.unwrap_err().code(), Code::NotFound);
    assert_eq!(timeout(LIMIT, responses.count()).await?, 0);

    let trailer = timeout(LIMIT, trailer).await??;
    assert_eq!(trailer.get("status"), Some("5"));
    assert_eq!(trailer.get("statusMessage"), Some("gone"));
    Ok(())
}

#[tokio::test]
async fn grpc_web_ping_pong() -> anyhow::Result<()> {
    let server = TestServer::spawn_grpc_web().await?;
    let client = GrpcClientBuilder::new(server.url())
        .metadata("x-client", "frpc-test")
        .grpc_web()?;

    let call = client.unary(&ping_pong(), Ping::new("hello"), Metadata::new());
    let (responses, header, trailer) = call.into_parts();

    let header = timeout(LIMIT, header).await??;
    assert_eq!(header.get("x-client-echo"), Some("frpc-test"));
    assert!(
        header
            .get("content-type")
            .is_some_and(|v| v.starts_with("application/grpc-web"))
    );

    let responses: Vec<Pong> = timeout(LIMIT, responses.collect()).await?;
    assert_eq!(responses, vec![Pong::new("world")]);

    let trailer = timeout(LIMIT, trailer).await??;
    assert_eq!(trailer.get("status"), Some("0"));
    assert_eq!(trailer.get("statusMessage"), Some(""));
    Ok(())
}

#[tokio::test]
async fn grpc_web_error_status_reaches_the_trailer() -> anyhow::Result<()> {
    let server = TestServer::spawn_grpc_web().await?;
    let client = GrpcClientBuilder::new(server.url()).grpc_web()?;

    let call = client.unary(&ping_pong(), Ping::new(UNKNOWN_PING), Metadata::new());
    let (responses, _header, trailer) = call.into_parts();

    assert_eq!(timeout(LIMIT, responses.count()).await?, 0);
    let trailer = timeout(LIMIT, trailer).await??;
    assert_eq!(trailer.get("status"), Some("5"));
    assert_eq!(trailer.get("statusMessage"), Some("gone"));
    Ok(())
}

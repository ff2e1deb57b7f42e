use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::mcp::server::{McpServer, create_server};
use crate::mcp::transport::{SocketTransport, StreamTransport};

/// Load and validate the configuration used by every command
#[inline]
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    ServerConfig::load(path).context("Failed to load configuration")
}

/// The binary ships no tools of its own. Embedders pass their
/// [`ToolProvider`](crate::mcp::ToolProvider)s to [`create_server`], which
/// honours the `enable_*_tools` flags.
async fn build_server(config: ServerConfig) -> McpServer {
    let server = create_server(config, &[], Vec::new()).await;
    info!(
        "Server ready with {} registered tools",
        server.registry().len().await
    );
    server
}

/// Serve a single session on stdin/stdout
#[inline]
pub async fn serve_stdio(config: ServerConfig) -> Result<()> {
    info!("Starting MCP server on stdio");

    let server = build_server(config).await;
    server
        .run(StreamTransport::stdio())
        .await
        .context("MCP server terminated with an error")?;

    Ok(())
}

/// Accept WebSocket connections, one session per connection, until Ctrl-C
#[inline]
pub async fn listen(config: ServerConfig, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening for WebSocket connections on {}", addr);

    let server = build_server(config).await;
    accept_sessions(&listener, &server, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Received Ctrl-C, no longer accepting connections");
    })
    .await;

    Ok(())
}

/// Serve every accepted connection until `shutdown` resolves, then stop the
/// open sessions and wait for each to close its socket.
async fn accept_sessions<F>(listener: &TcpListener, server: &McpServer, shutdown: F)
where
    F: Future<Output = ()>,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut sessions = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    sessions.spawn(serve_connection(server.session(), stream, peer, stop_rx.clone()));
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    error!("Session task failed: {}", e);
                }
            }
            () = &mut shutdown => break,
        }
    }

    stop_tx.send_replace(true);
    info!("Waiting for {} open sessions to close", sessions.len());
    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            error!("Session task failed: {}", e);
        }
    }
}

async fn serve_connection(
    session: McpServer,
    stream: TcpStream,
    peer: SocketAddr,
    mut stop: watch::Receiver<bool>,
) {
    let socket = tokio::select! {
        handshake = tokio_tungstenite::accept_async(stream) => match handshake {
            Ok(socket) => socket,
            Err(e) => {
                warn!("WebSocket handshake with {} failed: {}", peer, e);
                return;
            }
        },
        _ = stop.changed() => return,
    };

    info!("Session opened for {}", peer);
    let run = session.run(SocketTransport::new(socket));
    tokio::pin!(run);
    let finished = tokio::select! {
        outcome = &mut run => Some(outcome),
        _ = stop.changed() => None,
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            session.stop();
            run.await
        }
    };

    match outcome {
        Ok(()) => info!("Session closed for {}", peer),
        Err(e) => error!("Session for {} ended with an error: {}", peer, e),
    }
}

/// Print the effective configuration as TOML
#[inline]
pub fn show_config(config: &ServerConfig, path: Option<&Path>) -> Result<()> {
    println!("# Current Configuration");
    match path {
        Some(path) => println!("# Config file: {}", path.display()),
        None => {
            let default_path =
                ServerConfig::config_file_path().context("Failed to get config file path")?;
            println!("# Config file: {}", default_path.display());
        }
    }
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Print where the configuration is read from
#[inline]
pub fn show_config_path(path: Option<&Path>) -> Result<()> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => ServerConfig::config_file_path().context("Failed to get config file path")?,
    };
    println!("{}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn shutdown_closes_open_sessions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (trigger, shutdown) = oneshot::channel::<()>();

        let acceptor = tokio::spawn(async move {
            let server = McpServer::new(ServerConfig::default());
            accept_sessions(&listener, &server, async {
                let _ = shutdown.await;
            })
            .await;
        });

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .expect("connect");
        client
            .send(Message::Text(
                json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string(),
            ))
            .await
            .expect("send ping");
        let Some(Ok(Message::Text(reply))) = client.next().await else {
            panic!("expected a text reply");
        };
        let reply: Value = serde_json::from_str(&reply).expect("json reply");
        assert_eq!(reply["result"]["pong"], true);

        trigger.send(()).expect("acceptor waiting");
        tokio::time::timeout(Duration::from_secs(5), acceptor)
            .await
            .expect("acceptor drains its sessions")
            .expect("acceptor joins");

        let frame = client.next().await;
        assert!(matches!(frame, Some(Ok(Message::Close(_)))));
    }
}

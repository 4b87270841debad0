//! WebSocket transport
//!
//! Responsibilities:
//! - Accept TCP connections and route `/ws/{channel}` upgrades
//! - Run the handshake through `ChannelBroadcaster::connect`
//! - Forward queued frames to the socket from a per-client writer task
//! - Answer `ping` frames and disconnect the client when its socket closes

use std::sync::Arc;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::Receiver;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::Message as WsMessage;

use crate::broadcaster::ChannelBroadcaster;
use crate::connection::{Connection, ConnectionId, SendOutcome};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::transport::route::{channel_from_path, peek_channel};
use crate::utils::error::BroadcastError;

type WsReader = SplitStream<WebSocketStream<TcpStream>>;

/// Binds `addr` and serves WebSocket clients until the task is dropped.
pub async fn start_websocket_server(
    addr: String,
    broadcaster: Arc<ChannelBroadcaster>,
) -> Result<(), BroadcastError> {
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket server listening on ws://{addr}");
    serve(listener, broadcaster).await
}

/// Accept loop over an already bound listener.
pub async fn serve(
    listener: TcpListener,
    broadcaster: Arc<ChannelBroadcaster>,
) -> Result<(), BroadcastError> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let broadcaster = broadcaster.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, broadcaster).await {
                warn!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    broadcaster: Arc<ChannelBroadcaster>,
) -> Result<(), BroadcastError> {
    let channel = match peek_channel(&stream).await {
        Ok(channel) => channel,
        Err(e @ BroadcastError::InvalidRoute(_)) => {
            reject(stream).await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let (connection, rx) = broadcaster.open_connection();
    let mut reader = None;
    let id = broadcaster
        .connect(&channel, handshake(stream, &channel, connection, rx, &mut reader))
        .await?;
    let Some(reader) = reader else {
        return Ok(());
    };

    let connected = ServerMessage::Connected {
        channel: channel.clone(),
        connection_id: id.to_string(),
    };
    if reply(&broadcaster, &channel, &id, &connected).await == Some(SendOutcome::Closed) {
        return Ok(());
    }

    read_loop(reader, &broadcaster, &channel, &id).await;

    // close detected: the writer task ends once the broadcaster drops its handle
    broadcaster.disconnect(&id, &channel);
    Ok(())
}

/// Upgrades the socket, starts the writer task and hands the read half back
/// through `reader`.
async fn handshake(
    stream: TcpStream,
    channel: &str,
    connection: Connection,
    mut rx: Receiver<WsMessage>,
    reader: &mut Option<WsReader>,
) -> Result<Connection, BroadcastError> {
    let expected = channel.to_string();
    let check_route = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        match channel_from_path(req.uri().path()) {
            Ok(name) if name == expected => Ok(resp),
            _ => Err(not_found()),
        }
    };

    let ws_stream = accept_hdr_async(stream, check_route)
        .await
        .map_err(|e| BroadcastError::handshake(e.to_string()))?;
    let (mut ws_sender, ws_receiver) = ws_stream.split();

    let id = connection.id();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = msg.is_close();
            if let Err(e) = ws_sender.send(msg).await {
                debug!(connection = %id, error = %e, "failed to write frame");
                break;
            }
            if closing {
                break;
            }
        }
        // dropping rx makes every later send report Closed
        let _ = ws_sender.close().await;
        debug!(connection = %id, "send loop closed");
    });

    *reader = Some(ws_receiver);
    Ok(connection)
}

async fn read_loop(
    mut reader: WsReader,
    broadcaster: &ChannelBroadcaster,
    channel: &str,
    id: &ConnectionId,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                let response = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(ClientMessage::Ping) => ServerMessage::Pong,
                    Err(err) => {
                        warn!(
                            channel,
                            connection = %id,
                            error = %err,
                            "invalid client message: {}",
                            text.as_str().chars().take(100).collect::<String>()
                        );
                        ServerMessage::Error {
                            message: "unsupported message".to_string(),
                        }
                    }
                };

                // evicted by a broadcast: nothing will reach this client again
                if reply(broadcaster, channel, id, &response).await == Some(SendOutcome::Closed) {
                    debug!(channel, connection = %id, "connection no longer registered, stop reading");
                    break;
                }
            }
            Ok(WsMessage::Close(_)) => break,
            // tungstenite answers pings itself
            Ok(_) => {}
            Err(e) => {
                debug!(channel, connection = %id, error = %e, "read failed");
                break;
            }
        }
    }
}

/// Queues `msg` for one client. `None` means it could not be encoded.
async fn reply(
    broadcaster: &ChannelBroadcaster,
    channel: &str,
    id: &ConnectionId,
    msg: &ServerMessage,
) -> Option<SendOutcome> {
    match msg.to_json() {
        Ok(json) => Some(broadcaster.send_personal_message(channel, id, &json).await),
        Err(e) => {
            warn!(error = %e, "failed to encode server message");
            None
        }
    }
}

/// Completes the HTTP exchange with a 404 so the client sees why.
async fn reject(stream: TcpStream) {
    let refuse = |_: &Request, _: Response| -> Result<Response, ErrorResponse> { Err(not_found()) };
    let _ = accept_hdr_async(stream, refuse).await;
}

fn not_found() -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some("no such channel route".to_string()));
    *resp.status_mut() = StatusCode::NOT_FOUND;
    resp
}

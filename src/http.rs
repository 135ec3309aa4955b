use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};

use crate::docker::StateResolver;
use crate::events::{Connection, Notification, Registration, SendError, SubscriberRegistry};

pub const DEFAULT_PORT: u16 = 8090;

/// State shared across axum handlers.
pub struct AppState {
    pub resolver: StateResolver,
    pub registry: Arc<SubscriberRegistry>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/containers", get(list_containers))
        .route("/containers/{id}", get(get_container))
        .route("/events", get(follow_events))
        .with_state(state)
}

/// Serve the container API on all interfaces until the listener fails.
pub async fn serve(port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP service on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

fn pretty_json<T: Serialize>(value: &T) -> Response {
    match serde_json::to_string_pretty(value) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!("Unable to serialize response: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn list_containers(State(state): State<Arc<AppState>>) -> Response {
    match state.resolver.resolve_all().await {
        Ok(records) => pretty_json(&records),
        Err(e) => {
            error!("Unable to resolve containers: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn get_container(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.resolver.resolve_one(&id).await {
        Ok(Some(record)) => pretty_json(&record),
        Ok(None) => (StatusCode::NOT_FOUND, format!("No such container: {id}")).into_response(),
        Err(e) => {
            error!("Unable to resolve container {id}: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Outbound half of a viewer's WebSocket.
struct WebSocketConnection {
    peer: SocketAddr,
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn peer(&self) -> String {
        self.peer.to_string()
    }

    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let json = serde_json::to_string(notification)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await
            .map_err(send_error)
    }
}

/// Only errors meaning the socket is gone count as transport failures; a
/// refused frame leaves the viewer connected.
fn send_error(err: axum::Error) -> SendError {
    let err = err.into_inner();
    let gone = match err.downcast_ref::<WsError>() {
        Some(
            WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Io(_)
            | WsError::Tls(_)
            | WsError::Protocol(
                ProtocolError::SendAfterClosing | ProtocolError::ResetWithoutClosingHandshake,
            ),
        ) => true,
        Some(_) => false,
        None => true,
    };
    if gone {
        SendError::Transport(err)
    } else {
        SendError::Rejected(err)
    }
}

async fn follow_events(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, peer, state))
}

async fn stream_events(socket: WebSocket, peer: SocketAddr, state: Arc<AppState>) {
    let (sink, mut inbound) = socket.split();
    let Registration {
        id,
        mut disconnected,
    } = state.registry.register(Box::new(WebSocketConnection {
        peer,
        sink: Mutex::new(sink),
    }));

    loop {
        tokio::select! {
            _ = &mut disconnected => {
                debug!("Subscriber {id} ({peer}) was dropped by the broadcaster");
                break;
            }
            message = inbound.next() => match message {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Viewer {peer} closed the connection");
                    state.registry.remove(&[id]);
                    break;
                }
                Some(Err(e)) => {
                    debug!("Viewer {peer} connection failed: {e}");
                    state.registry.remove(&[id]);
                    break;
                }
                // Viewers only listen
                Some(Ok(_)) => {}
            }
        }
    }
}

//! WebSocket client for `farmsync-server`.
//!
//! One connection carries every subscription and mutation. A background task
//! owns the socket; callers talk to it over a command channel and get their
//! replies through per-request oneshots. When the socket drops, every pending
//! request and live subscription fails with a transport error.

use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::key::KeyGenerator;
use super::path::StorePath;
use super::{RecordStore, Snapshot, StoreError, Subscription};
use crate::protocol::{ClientMessage, ServerMessage, UNSOLICITED_ID};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SnapshotSender = mpsc::UnboundedSender<Result<Snapshot, StoreError>>;
type Reply = oneshot::Sender<Result<(), StoreError>>;

enum Command {
    Subscribe {
        id: u64,
        path: String,
        sender: SnapshotSender,
    },
    Unsubscribe {
        id: u64,
    },
    Request {
        message: ClientMessage,
        reply: Reply,
    },
}

/// [`RecordStore`] backed by a `farmsync-server` WebSocket connection.
#[derive(Debug)]
pub struct RemoteStore {
    commands: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
    keys: KeyGenerator,
}

impl RemoteStore {
    /// Opens the connection, authenticating with `api_key`.
    ///
    /// An API key the server does not know is reported as
    /// [`StoreError::PermissionDenied`].
    pub async fn connect(
        server_url: &str,
        api_key: &str,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let url = build_ws_url(server_url, api_key);

        let (socket, _) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                StoreError::Transport(format!("Timed out connecting to {}", server_url))
            })?
            .map_err(connect_error)?;

        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(socket, receiver));
        info!(server = server_url, "connected to record store");

        Ok(Self {
            commands,
            next_id: AtomicU64::new(UNSOLICITED_ID + 1),
            keys: KeyGenerator::new(),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn request(&self, message: ClientMessage) -> Result<(), StoreError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Request { message, reply })
            .map_err(|_| closed())?;
        response.await.map_err(|_| closed())?
    }
}

impl RecordStore for RemoteStore {
    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        let id = self.next_id();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.commands
            .send(Command::Subscribe {
                id,
                path: path.to_string(),
                sender,
            })
            .map_err(|_| closed())?;

        let commands = self.commands.clone();
        Ok(Subscription::new(receiver).with_cancel(move || {
            let _ = commands.send(Command::Unsubscribe { id });
        }))
    }

    fn create_key(&self, _path: &StorePath) -> String {
        self.keys.next_key()
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let id = self.next_id();
        self.request(ClientMessage::Write {
            id,
            path: path.to_string(),
            value,
        })
        .await
    }

    async fn patch(&self, path: &StorePath, fields: Map<String, Value>) -> Result<(), StoreError> {
        let id = self.next_id();
        self.request(ClientMessage::Patch {
            id,
            path: path.to_string(),
            value: fields,
        })
        .await
    }

    async fn delete(&self, path: &StorePath) -> Result<(), StoreError> {
        let id = self.next_id();
        self.request(ClientMessage::Delete {
            id,
            path: path.to_string(),
        })
        .await
    }
}

fn closed() -> StoreError {
    StoreError::Transport("Connection to record store closed".to_string())
}

fn connect_error(error: tungstenite::Error) -> StoreError {
    match error {
        tungstenite::Error::Http(response) if response.status().as_u16() == 401 => {
            StoreError::PermissionDenied("Server rejected the API key".to_string())
        }
        other => StoreError::Transport(other.to_string()),
    }
}

/// Bookkeeping for one connection: who is waiting for which reply.
#[derive(Default)]
struct Connection {
    pending: HashMap<u64, Reply>,
    subscriptions: HashMap<u64, SnapshotSender>,
}

impl Connection {
    /// Records a command and returns the frame to send, if any.
    fn register(&mut self, command: Command) -> Option<ClientMessage> {
        match command {
            Command::Subscribe { id, path, sender } => {
                self.subscriptions.insert(id, sender);
                Some(ClientMessage::Subscribe { id, path })
            }
            Command::Unsubscribe { id } => self
                .subscriptions
                .remove(&id)
                .map(|_| ClientMessage::Unsubscribe { id }),
            Command::Request { message, reply } => {
                self.pending.insert(message.id(), reply);
                Some(message)
            }
        }
    }

    fn reject(&mut self, id: u64, error: StoreError) {
        if let Some(reply) = self.pending.remove(&id) {
            let _ = reply.send(Err(error));
        } else if let Some(sender) = self.subscriptions.remove(&id) {
            let _ = sender.send(Err(error));
        }
    }

    fn dispatch(&mut self, text: &str) {
        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "ignoring malformed frame from record store");
                return;
            }
        };

        match message {
            ServerMessage::Snapshot { id, value } => match self.subscriptions.get(&id) {
                Some(sender) => {
                    if sender.send(Ok(value)).is_err() {
                        self.subscriptions.remove(&id);
                    }
                }
                None => debug!(id, "snapshot for a subscription that is gone"),
            },
            ServerMessage::Ack { id } => {
                if let Some(reply) = self.pending.remove(&id) {
                    let _ = reply.send(Ok(()));
                }
            }
            ServerMessage::Error { id, kind, message } => {
                let error = StoreError::new(kind, message);
                if id == UNSOLICITED_ID {
                    warn!(%error, "record store reported an error");
                    return;
                }
                self.reject(id, error);
            }
        }
    }

    fn fail_all(&mut self, error: StoreError) {
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(error.clone()));
        }
        for (_, sender) in self.subscriptions.drain() {
            let _ = sender.send(Err(error.clone()));
        }
    }
}

async fn run_connection(socket: Socket, mut commands: mpsc::UnboundedReceiver<Command>) {
    let (mut sender, mut receiver) = socket.split();
    let mut connection = Connection::default();

    let lost = loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break None;
                };
                let Some(frame) = connection.register(command) else {
                    continue;
                };
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        connection.reject(frame.id(), StoreError::Transport(e.to_string()));
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(text.into())).await {
                    break Some(e.to_string());
                }
            }
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => connection.dispatch(text.as_str()),
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = sender.send(Message::Pong(data)).await {
                        break Some(e.to_string());
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    break Some("server closed the connection".to_string());
                }
                Some(Ok(_)) => {
                    // Binary and pong frames carry nothing for us
                }
                Some(Err(e)) => break Some(e.to_string()),
            }
        }
    };

    match lost {
        Some(reason) => {
            warn!(%reason, "record store connection lost");
            connection.fail_all(StoreError::Transport(reason));
        }
        None => {
            debug!("record store handle dropped, closing connection");
            let _ = sender.send(Message::Close(None)).await;
        }
    }
}

/// Builds the WebSocket URL for the store endpoint.
fn build_ws_url(server_url: &str, api_key: &str) -> String {
    // Convert http(s) to ws(s) if needed
    let base_url = if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if !server_url.starts_with("ws://") && !server_url.starts_with("wss://") {
        format!("ws://{}", server_url)
    } else {
        server_url.to_string()
    };

    format!(
        "{}/store?key={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(api_key)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreErrorKind;
    use serde_json::json;

    #[test]
    fn test_build_ws_url() {
        assert_eq!(
            build_ws_url("ws://localhost:8080", "k"),
            "ws://localhost:8080/store?key=k"
        );
        assert_eq!(
            build_ws_url("http://localhost:8080/", "k"),
            "ws://localhost:8080/store?key=k"
        );
        assert_eq!(
            build_ws_url("https://farm.example.com", "k"),
            "wss://farm.example.com/store?key=k"
        );
        assert_eq!(
            build_ws_url("localhost:8080", "a b&c"),
            "ws://localhost:8080/store?key=a%20b%26c"
        );
    }

    #[tokio::test]
    async fn test_dispatch_routes_snapshots_and_acks() {
        let mut connection = Connection::default();
        let (sender, mut snapshots) = mpsc::unbounded_channel();
        let (reply, response) = oneshot::channel();

        connection.register(Command::Subscribe {
            id: 1,
            path: "users/u1/crops".into(),
            sender,
        });
        connection.register(Command::Request {
            message: ClientMessage::Delete {
                id: 2,
                path: "users/u1/crops/k1".into(),
            },
            reply,
        });

        connection.dispatch(r#"{"type":"snapshot","id":1,"value":{"k1":{"name":"Wheat"}}}"#);
        connection.dispatch(r#"{"type":"ack","id":2}"#);

        assert_eq!(
            snapshots.recv().await,
            Some(Ok(Some(json!({"k1": {"name": "Wheat"}}))))
        );
        assert_eq!(response.await.unwrap(), Ok(()));
        assert!(connection.pending.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_error_keeps_kind() {
        let mut connection = Connection::default();
        let (reply, response) = oneshot::channel();
        connection.register(Command::Request {
            message: ClientMessage::Write {
                id: 5,
                path: "users/u2/crops/k1".into(),
                value: json!({}),
            },
            reply,
        });

        connection.dispatch(
            r#"{"type":"error","id":5,"kind":"permission_denied","message":"not yours"}"#,
        );

        let err = response.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::PermissionDenied);
        assert_eq!(err.message(), "not yours");
    }

    #[test]
    fn test_unsubscribe_of_unknown_id_sends_nothing() {
        let mut connection = Connection::default();
        assert!(connection
            .register(Command::Unsubscribe { id: 9 })
            .is_none());
    }

    #[tokio::test]
    async fn test_fail_all_reaches_everyone() {
        let mut connection = Connection::default();
        let (sender, mut snapshots) = mpsc::unbounded_channel();
        let (reply, response) = oneshot::channel();
        connection.register(Command::Subscribe {
            id: 1,
            path: "users/u1/crops".into(),
            sender,
        });
        connection.register(Command::Request {
            message: ClientMessage::Delete {
                id: 2,
                path: "users/u1/crops/k1".into(),
            },
            reply,
        });

        connection.fail_all(StoreError::Transport("gone".into()));

        assert!(matches!(
            snapshots.recv().await,
            Some(Err(StoreError::Transport(_)))
        ));
        assert!(matches!(
            response.await.unwrap(),
            Err(StoreError::Transport(_))
        ));
    }
}

//! One WebSocket client session.
//!
//! A writer task owns the socket's sink and drains an outgoing queue. Each
//! subscription gets a watcher task that pushes a snapshot right away and
//! again after every change notice from the hub. Mutations are applied to
//! storage, announced on the hub, then acknowledged.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::auth::AuthUser;
use super::storage::{RecordRepository, StorageError};
use super::AppState;
use crate::protocol::{ClientMessage, ServerMessage, UNSOLICITED_ID};
use crate::store::{StoreError, StorePath};

/// Where a path points inside the caller's own tree.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Collection { collection: String },
    Record { collection: String, key: String },
}

impl Target {
    /// Accepts `users/{uid}/{collection}` and `users/{uid}/{collection}/{key}`
    /// where `uid` is the authenticated user.
    fn parse(path: &str, user_id: &str) -> Result<Self, StoreError> {
        let parsed = StorePath::parse(path)?;

        let (uid, rest) = match parsed.segments() {
            [root, uid, rest @ ..] if root.as_str() == "users" => (uid, rest),
            _ => {
                return Err(StoreError::PermissionDenied(format!(
                    "{} is outside users/{}",
                    parsed, user_id
                )))
            }
        };
        if uid.as_str() != user_id {
            return Err(StoreError::PermissionDenied(format!(
                "{} belongs to another user",
                parsed
            )));
        }

        match rest {
            [collection] => Ok(Target::Collection {
                collection: collection.clone(),
            }),
            [collection, key] => Ok(Target::Record {
                collection: collection.clone(),
                key: key.clone(),
            }),
            [] => Err(StoreError::MalformedPath(format!(
                "{} does not name a collection",
                parsed
            ))),
            _ => Err(StoreError::MalformedPath(format!(
                "{} is deeper than a record",
                parsed
            ))),
        }
    }

    fn collection(&self) -> &str {
        match self {
            Target::Collection { collection } | Target::Record { collection, .. } => collection,
        }
    }
}

enum Mutation {
    Write(Value),
    Patch(Map<String, Value>),
    Delete,
}

fn storage_error(error: StorageError) -> StoreError {
    match error {
        StorageError::NotACollection(_) => StoreError::MalformedPath(error.to_string()),
        other => StoreError::Transport(other.to_string()),
    }
}

async fn load(
    repo: &RecordRepository,
    user_id: &str,
    target: &Target,
) -> Result<Option<Value>, StorageError> {
    let collection = repo.load_collection(user_id, target.collection()).await?;
    Ok(match target {
        Target::Collection { .. } => collection,
        Target::Record { key, .. } => collection.and_then(|mut records| {
            records.as_object_mut().and_then(|records| records.remove(key))
        }),
    })
}

struct Session {
    id: Uuid,
    user: AuthUser,
    state: AppState,
    outgoing: mpsc::UnboundedSender<ServerMessage>,
    watchers: HashMap<u64, JoinHandle<()>>,
}

impl Session {
    fn send(&self, message: ServerMessage) {
        let _ = self.outgoing.send(message);
    }

    async fn handle(&mut self, text: &str) {
        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(session = %self.id, error = %e, "malformed frame");
                self.send(ServerMessage::error(
                    UNSOLICITED_ID,
                    &StoreError::Transport(format!("Malformed frame: {}", e)),
                ));
                return;
            }
        };

        match message {
            ClientMessage::Subscribe { id, path } => {
                match Target::parse(&path, &self.user.user_id) {
                    Ok(target) => self.subscribe(id, target).await,
                    Err(e) => self.send(ServerMessage::error(id, &e)),
                }
            }
            ClientMessage::Unsubscribe { id } => {
                if let Some(watcher) = self.watchers.remove(&id) {
                    watcher.abort();
                    debug!(session = %self.id, id, "unsubscribed");
                }
            }
            ClientMessage::Write { id, path, value } => {
                let result = self.mutate(&path, Mutation::Write(value)).await;
                self.reply(id, result);
            }
            ClientMessage::Patch { id, path, value } => {
                let result = self.mutate(&path, Mutation::Patch(value)).await;
                self.reply(id, result);
            }
            ClientMessage::Delete { id, path } => {
                let result = self.mutate(&path, Mutation::Delete).await;
                self.reply(id, result);
            }
        }
    }

    fn reply(&self, id: u64, result: Result<(), StoreError>) {
        match result {
            Ok(()) => self.send(ServerMessage::Ack { id }),
            Err(e) => {
                debug!(session = %self.id, id, error = %e, "request failed");
                self.send(ServerMessage::error(id, &e));
            }
        }
    }

    async fn subscribe(&mut self, id: u64, target: Target) {
        if let Some(previous) = self.watchers.remove(&id) {
            previous.abort();
        }

        // Subscribe before the first read so no change can slip in between.
        let mut changes = self
            .state
            .hub
            .subscribe(&self.user.user_id, target.collection())
            .await;
        let repo = self.state.repo.clone();
        let outgoing = self.outgoing.clone();
        let user_id = self.user.user_id.clone();
        let session = self.id;

        debug!(%session, id, collection = target.collection(), "subscribed");
        let watcher = tokio::spawn(async move {
            loop {
                let message = match load(&repo, &user_id, &target).await {
                    Ok(value) => ServerMessage::Snapshot { id, value },
                    Err(e) => {
                        warn!(%session, id, error = %e, "failed to load snapshot");
                        let _ = outgoing.send(ServerMessage::error(id, &storage_error(e)));
                        break;
                    }
                };
                if outgoing.send(message).is_err() {
                    break;
                }

                match changes.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.watchers.insert(id, watcher);
    }

    async fn mutate(&self, path: &str, mutation: Mutation) -> Result<(), StoreError> {
        let target = Target::parse(path, &self.user.user_id)?;
        let user_id = self.user.user_id.as_str();
        let repo = &self.state.repo;

        let result = match (&target, mutation) {
            (Target::Collection { collection }, Mutation::Write(value)) => {
                repo.replace_collection(user_id, collection, &value).await
            }
            (Target::Record { collection, key }, Mutation::Write(value)) => {
                repo.put(user_id, collection, key, &value).await
            }
            (Target::Collection { collection }, Mutation::Patch(records)) => {
                validate_fields(path, &records)?;
                repo.patch_collection(user_id, collection, &records).await
            }
            (Target::Record { collection, key }, Mutation::Patch(fields)) => {
                validate_fields(path, &fields)?;
                repo.patch(user_id, collection, key, &fields).await
            }
            (Target::Collection { collection }, Mutation::Delete) => {
                repo.delete_collection(user_id, collection).await
            }
            (Target::Record { collection, key }, Mutation::Delete) => {
                repo.delete(user_id, collection, key).await
            }
        };
        result.map_err(storage_error)?;

        self.state.hub.notify(user_id, target.collection()).await;
        Ok(())
    }

    fn close(&mut self) {
        for (_, watcher) in self.watchers.drain() {
            watcher.abort();
        }
    }
}

/// Patch field names become path segments and must be valid as such.
fn validate_fields(path: &str, fields: &Map<String, Value>) -> Result<(), StoreError> {
    let parsed = StorePath::parse(path)?;
    for field in fields.keys() {
        parsed.child(field)?;
    }
    Ok(())
}

/// Runs a session until the client disconnects.
pub async fn run_session(socket: WebSocket, state: AppState, user: AuthUser) {
    let id = Uuid::new_v4();
    info!(session = %id, user = %user.user_id, "session opened");

    let (mut sink, mut stream) = socket.split();
    let (outgoing, mut queue) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to encode frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session {
        id,
        user,
        state,
        outgoing,
        watchers: HashMap::new(),
    };

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => session.handle(text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(session = %id, error = %e, "socket error");
                break;
            }
        }
    }

    session.close();
    writer.abort();
    info!(session = %id, "session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreErrorKind;

    #[test]
    fn test_target_accepts_own_collection_and_record() {
        assert_eq!(
            Target::parse("users/u1/crops", "u1").unwrap(),
            Target::Collection {
                collection: "crops".into()
            }
        );
        assert_eq!(
            Target::parse("/users/u1/inventory/k1", "u1").unwrap(),
            Target::Record {
                collection: "inventory".into(),
                key: "k1".into()
            }
        );
    }

    #[test]
    fn test_target_rejects_other_users() {
        let err = Target::parse("users/u2/crops", "u1").unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::PermissionDenied);

        let err = Target::parse("admin/crops", "u1").unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::PermissionDenied);
    }

    #[test]
    fn test_target_rejects_bad_shapes() {
        let deep = Target::parse("users/u1/crops/k1/name", "u1").unwrap_err();
        assert_eq!(deep.kind(), StoreErrorKind::MalformedPath);

        let shallow = Target::parse("users/u1", "u1").unwrap_err();
        assert_eq!(shallow.kind(), StoreErrorKind::MalformedPath);

        let invalid = Target::parse("users/u1/cr.ops", "u1").unwrap_err();
        assert_eq!(invalid.kind(), StoreErrorKind::MalformedPath);
    }

    #[test]
    fn test_validate_fields() {
        let mut fields = Map::new();
        fields.insert("healthScore".into(), Value::from(80));
        assert!(validate_fields("users/u1/crops/k1", &fields).is_ok());

        fields.insert("a/b".into(), Value::Null);
        assert!(validate_fields("users/u1/crops/k1", &fields).is_err());
    }
}

//! Wire protocol between [`RemoteStore`](crate::store::RemoteStore) and
//! `farmsync-server`.
//!
//! Every frame is a JSON text message tagged by `type`. Requests carry a
//! client-chosen `id`; the server answers mutations with `ack` or `error`
//! under the same id, and tags every `snapshot` with the id of the
//! subscription it belongs to.
//!
//! ```json
//! {"type":"subscribe","id":1,"path":"users/u1/crops"}
//! {"type":"snapshot","id":1,"value":{"-NxA...":{"name":"Wheat"}}}
//! {"type":"patch","id":2,"path":"users/u1/crops/-NxA...","value":{"healthScore":80}}
//! {"type":"ack","id":2}
//! {"type":"error","id":3,"kind":"permission_denied","message":"..."}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::{Snapshot, StoreError, StoreErrorKind};

/// Id used by the server for errors not tied to any request.
pub const UNSOLICITED_ID: u64 = 0;

/// Client to server frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        id: u64,
        path: String,
    },
    Unsubscribe {
        id: u64,
    },
    Write {
        id: u64,
        path: String,
        value: Value,
    },
    Patch {
        id: u64,
        path: String,
        value: Map<String, Value>,
    },
    Delete {
        id: u64,
        path: String,
    },
}

impl ClientMessage {
    pub fn id(&self) -> u64 {
        match self {
            ClientMessage::Subscribe { id, .. }
            | ClientMessage::Unsubscribe { id }
            | ClientMessage::Write { id, .. }
            | ClientMessage::Patch { id, .. }
            | ClientMessage::Delete { id, .. } => *id,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Server to client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot {
        id: u64,
        #[serde(default)]
        value: Snapshot,
    },
    Ack {
        id: u64,
    },
    Error {
        id: u64,
        kind: StoreErrorKind,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(id: u64, error: &StoreError) -> Self {
        ServerMessage::Error {
            id,
            kind: error.kind(),
            message: error.message().to_string(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

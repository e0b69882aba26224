//! Inbound message shape and codecs.

use crate::error::Result;
use crate::types::MutationKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Encoding of frames on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Json,
    MessagePack,
}

/// One change message as sent by the backend.
///
/// Field names follow the `{ mutationKind, entityType, record, previousRecord }`
/// contract; the `eventType`/`table`/`new`/`old` spelling used by
/// row-change feeds is accepted too.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(alias = "eventType")]
    pub mutation_kind: MutationKind,

    /// Kept as text: unknown entity names must not fail decoding.
    #[serde(alias = "table")]
    pub entity_type: String,

    #[serde(default, alias = "new")]
    pub record: Value,

    #[serde(default, alias = "old", skip_serializing_if = "Option::is_none")]
    pub previous_record: Option<Value>,
}

impl WireMessage {
    pub fn new(mutation_kind: MutationKind, entity_type: impl Into<String>, record: Value) -> Self {
        Self {
            mutation_kind,
            entity_type: entity_type.into(),
            record,
            previous_record: None,
        }
    }

    pub fn with_previous(mut self, previous: Value) -> Self {
        self.previous_record = Some(previous);
        self
    }

    /// Decode a frame.
    pub fn decode(payload: &[u8], format: WireFormat) -> Result<Self> {
        match format {
            WireFormat::Json => Ok(serde_json::from_slice(payload)?),
            WireFormat::MessagePack => Ok(rmp_serde::from_slice(payload)?),
        }
    }

    /// Encode a frame.
    pub fn encode(&self, format: WireFormat) -> Result<Vec<u8>> {
        match format {
            WireFormat::Json => Ok(serde_json::to_vec(self)?),
            WireFormat::MessagePack => Ok(rmp_serde::to_vec_named(self)?),
        }
    }
}

/// `null` and `{}` both mean "no payload".
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

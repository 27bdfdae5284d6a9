//! Chat message texts: plain strings or client-side translation keys,
//! carried as JSON on the wire.

use serde::{Deserialize, Serialize};

use crate::codec::{PacketDecode, PacketEncode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translate: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub with: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A message the client renders through its own translation table,
    /// e.g. `multiplayer.disconnect.invalid_player_movement`.
    pub fn translate(key: impl Into<String>) -> Self {
        Self {
            translate: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn with(mut self, arg: Message) -> Self {
        self.with.push(arg);
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

impl PacketEncode for Message {
    fn encode(&self, out: &mut Vec<u8>) {
        let json = serde_json::to_string(self).expect("message serializes");
        json.encode(out);
    }
}

impl PacketDecode for Message {
    fn decode(inp: &mut &[u8]) -> anyhow::Result<Self> {
        let json = String::decode(inp)?;
        Ok(serde_json::from_str(&json)?)
    }
}

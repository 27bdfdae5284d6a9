//! Global chat: join/leave announcements and player messages with the
//! validation ladder (illegal characters, ordering, expiry). Signatures
//! pass through opaquely; this server does not verify them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;

use net_core::codec::{Bytes, PacketDecode};
use net_core::{Message, Packet};

use super::client::{Client, PacketHandler};
use super::playerlist::PlayerList;

/// Messages older than this are dropped rather than relayed.
pub const MSG_EXPIRES: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct ChatState {
    last_timestamp_ms: i64,
    last_signature: Option<Vec<u8>>,
}

pub struct GlobalChat {
    players: Arc<PlayerList>,
    states: Mutex<HashMap<Client, ChatState>>,
}

impl GlobalChat {
    pub fn new(players: Arc<PlayerList>) -> Self {
        Self {
            players,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// The serverbound chat handler bound to this chat service.
    pub fn handler(self: Arc<Self>) -> PacketHandler {
        Arc::new(move |client, pkt| self.handle(client, pkt))
    }

    pub fn broadcast_system(&self, msg: &Message, overlay: bool) {
        log::info!("chat: {msg:?}");
        self.players.broadcast_system_chat(msg, overlay);
    }

    /// Drop per-client state on disconnect.
    pub fn forget(&self, client: &Client) {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(client);
    }

    fn handle(&self, client: &Client, pkt: &Packet) -> Result<()> {
        let mut cur = pkt.data.as_slice();
        let message = String::decode(&mut cur)?;
        let timestamp_ms = i64::decode(&mut cur)?;
        let salt = i64::decode(&mut cur)?;
        let signature = Option::<Bytes>::decode(&mut cur)?;

        let sender = client.profile();
        if contains_illegal_chars(&message) {
            client.send_disconnect_message(&Message::translate(
                "multiplayer.disconnect.illegal_characters",
            ));
            return Ok(());
        }

        {
            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            let state = states.entry(client.clone()).or_default();
            // Timestamps must advance; a regression means a replayed or
            // reordered message.
            if timestamp_ms <= state.last_timestamp_ms {
                client.send_disconnect_message(&Message::translate(
                    "multiplayer.disconnect.out_of_order_chat",
                ));
                return Ok(());
            }
            state.last_timestamp_ms = timestamp_ms;
            state.last_signature = signature.as_ref().map(|b| b.0.clone());
        }

        if now_ms().saturating_sub(timestamp_ms) > MSG_EXPIRES.as_millis() as i64 {
            log::warn!("{} sent an expired chat message: {message:?}", sender.name);
            return Ok(());
        }

        log::info!("<{}> {message}", sender.name);
        self.players.for_each(|other| {
            other.send_player_chat(
                sender.uuid,
                &sender.name,
                0,
                &message,
                timestamp_ms,
                salt,
                signature.as_ref(),
            );
        });
        Ok(())
    }
}

/// Color codes, control characters and DEL have no business in chat; a
/// client sending them is modified.
fn contains_illegal_chars(message: &str) -> bool {
    message.chars().any(|c| c == '§' || c < ' ' || c == '\x7f')
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as i64
}

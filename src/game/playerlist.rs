//! Roster of connected players: tab-list style broadcasts and the
//! max-players gate.

use std::sync::Mutex;
use std::time::Duration;

use net_core::Message;

use super::client::{
    Client, PlayerInfoEntry, INFO_ADD_PLAYER, INFO_UPDATE_LATENCY, INFO_UPDATE_LISTED,
};

pub struct PlayerList {
    max_players: usize,
    entries: Mutex<Vec<Client>>,
}

impl PlayerList {
    pub fn new(max_players: usize) -> Self {
        Self {
            max_players,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Admit a player: everyone already listed learns about the joiner,
    /// then the joiner receives the full roster (itself included). Refuses
    /// when the server is full.
    pub fn join(&self, client: &Client) -> bool {
        let mut entries = self.lock();
        if entries.len() >= self.max_players {
            return false;
        }
        let add = INFO_ADD_PLAYER | INFO_UPDATE_LISTED;
        let mut roster = vec![entry_of(client)];
        for other in entries.iter() {
            other.send_player_info_update(add, &[entry_of(client)]);
            roster.push(entry_of(other));
        }
        client.send_player_info_update(add, &roster);
        entries.push(client.clone());
        true
    }

    pub fn leave(&self, client: &Client) {
        let mut entries = self.lock();
        let Some(idx) = entries.iter().position(|c| c == client) else {
            return;
        };
        entries.swap_remove(idx);
        for other in entries.iter() {
            other.send_player_info_remove(&[client.profile().uuid]);
        }
    }

    /// Record a fresh latency measurement and broadcast it to the roster.
    pub fn update_latency(&self, client: &Client, latency: Duration) {
        client.set_latency(latency);
        let entry = [entry_of(client)];
        for other in self.lock().iter() {
            other.send_player_info_update(INFO_UPDATE_LATENCY, &entry);
        }
    }

    pub fn broadcast_system_chat(&self, msg: &Message, overlay: bool) {
        for client in self.lock().iter() {
            client.send_system_chat(msg, overlay);
        }
    }

    pub fn for_each(&self, mut f: impl FnMut(&Client)) {
        for client in self.lock().iter() {
            f(client);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Client>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn entry_of(client: &Client) -> PlayerInfoEntry {
    let profile = client.profile();
    PlayerInfoEntry {
        uuid: profile.uuid,
        name: profile.name.clone(),
        properties: profile.properties.clone(),
        gamemode: profile.gamemode.id(),
        latency_ms: client.latency().as_millis() as i32,
        listed: true,
    }
}

//! Callback interfaces the world uses to reach connected clients. The
//! world never sees packets; it dispatches through these traits and the
//! game layer turns the calls into queued packets.

use std::hash::Hash;

use glam::{DVec3, Vec2};

use crate::chunk::{Chunk, ChunkPos};
use crate::entity::EntityId;
use crate::player::Player;

/// Receives chunk streaming callbacks.
pub trait ChunkViewer {
    fn view_chunk_load(&self, pos: ChunkPos, chunk: &Chunk);
    fn view_chunk_unload(&self, pos: ChunkPos);
}

/// Receives entity visibility callbacks.
///
/// `delta` components encode `(new - old) * 32 * 128` blocks clamped to
/// i16; rotation bytes encode `angle * 256 / 360` wrapping. Entities whose
/// displacement exceeds the delta range are teleported instead.
pub trait EntityViewer {
    fn view_add_player(&self, player: &Player);
    fn view_remove_entities(&self, eids: &[EntityId]);
    fn view_move_entity_pos(&self, eid: EntityId, delta: [i16; 3], on_ground: bool);
    fn view_move_entity_pos_and_rot(
        &self,
        eid: EntityId,
        delta: [i16; 3],
        rot: [i8; 2],
        on_ground: bool,
    );
    fn view_move_entity_rot(&self, eid: EntityId, rot: [i8; 2], on_ground: bool);
    fn view_rotate_head(&self, eid: EntityId, yaw: i8);
    fn view_teleport_entity(&self, eid: EntityId, pos: DVec3, rot: [i8; 2], on_ground: bool);
}

/// Everything the world needs from a connected client. Handles are cheap
/// clones with identity semantics: the same connection must compare equal
/// wherever it is used as a table key.
pub trait ClientHandle: ChunkViewer + EntityViewer + Clone + Eq + Hash + Send + 'static {
    /// `reason` is a client-side translation key.
    fn send_disconnect(&self, reason: &str);
    /// Issue a position correction; returns the teleport id the client
    /// must acknowledge.
    fn send_player_position(&self, pos: DVec3, rot: Vec2) -> i32;
    fn send_set_chunk_cache_center(&self, x: i32, z: i32);
}

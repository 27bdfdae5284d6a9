//! Shared test double: a client handle that records every callback.
#![allow(dead_code)]

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use glam::{DVec3, Vec2};
use uuid::Uuid;

use server_core::{
    Chunk, ChunkPos, ChunkViewer, ClientHandle, ClientInfo, EntityId, EntityViewer, GameMode,
    Inputs, MemoryChunkStore, Player, RateLimiter, World, WorldConfig,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ChunkLoad(ChunkPos),
    ChunkUnload(ChunkPos),
    SetCenter(i32, i32),
    AddPlayer(EntityId),
    RemoveEntities(Vec<EntityId>),
    MovePos(EntityId, [i16; 3], bool),
    MovePosRot(EntityId, [i16; 3], [i8; 2], bool),
    MoveRot(EntityId, [i8; 2], bool),
    RotateHead(EntityId, i8),
    TeleportEntity(EntityId, DVec3, [i8; 2], bool),
    Disconnect(String),
    PlayerPosition(i32, DVec3, Vec2),
}

#[derive(Default)]
struct Inner {
    events: Mutex<Vec<Event>>,
    teleport_ids: AtomicI32,
}

#[derive(Clone, Default)]
pub struct RecordingClient(Arc<Inner>);

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: Event) {
        self.0.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.events.lock().unwrap().clone()
    }

    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut self.0.events.lock().unwrap())
    }
}

impl PartialEq for RecordingClient {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for RecordingClient {}
impl std::hash::Hash for RecordingClient {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl ChunkViewer for RecordingClient {
    fn view_chunk_load(&self, pos: ChunkPos, _chunk: &Chunk) {
        self.record(Event::ChunkLoad(pos));
    }
    fn view_chunk_unload(&self, pos: ChunkPos) {
        self.record(Event::ChunkUnload(pos));
    }
}

impl EntityViewer for RecordingClient {
    fn view_add_player(&self, player: &Player) {
        self.record(Event::AddPlayer(player.entity.eid));
    }
    fn view_remove_entities(&self, eids: &[EntityId]) {
        self.record(Event::RemoveEntities(eids.to_vec()));
    }
    fn view_move_entity_pos(&self, eid: EntityId, delta: [i16; 3], on_ground: bool) {
        self.record(Event::MovePos(eid, delta, on_ground));
    }
    fn view_move_entity_pos_and_rot(
        &self,
        eid: EntityId,
        delta: [i16; 3],
        rot: [i8; 2],
        on_ground: bool,
    ) {
        self.record(Event::MovePosRot(eid, delta, rot, on_ground));
    }
    fn view_move_entity_rot(&self, eid: EntityId, rot: [i8; 2], on_ground: bool) {
        self.record(Event::MoveRot(eid, rot, on_ground));
    }
    fn view_rotate_head(&self, eid: EntityId, yaw: i8) {
        self.record(Event::RotateHead(eid, yaw));
    }
    fn view_teleport_entity(&self, eid: EntityId, pos: DVec3, rot: [i8; 2], on_ground: bool) {
        self.record(Event::TeleportEntity(eid, pos, rot, on_ground));
    }
}

impl ClientHandle for RecordingClient {
    fn send_disconnect(&self, reason: &str) {
        self.record(Event::Disconnect(reason.to_owned()));
    }
    fn send_player_position(&self, pos: DVec3, rot: Vec2) -> i32 {
        let id = self.0.teleport_ids.fetch_add(1, Ordering::Relaxed) + 1;
        self.record(Event::PlayerPosition(id, pos, rot));
        id
    }
    fn send_set_chunk_cache_center(&self, x: i32, z: i32) {
        self.record(Event::SetCenter(x, z));
    }
}

pub fn test_world() -> World<RecordingClient> {
    World::new(Box::new(MemoryChunkStore::new()), WorldConfig::default())
}

/// Join a fresh player and return its handle plus the shared input
/// snapshot a connection would normally write.
pub fn join(
    world: &World<RecordingClient>,
    pos: DVec3,
    view_distance: i32,
) -> (RecordingClient, Arc<Mutex<Inputs>>, EntityId) {
    let eid = world.next_entity_id();
    let inputs = Arc::new(Mutex::new(Inputs {
        info: ClientInfo {
            view_distance: view_distance as i8,
            ..ClientInfo::default()
        },
        position: pos,
        ..Inputs::default()
    }));
    let client = RecordingClient::new();
    let player = Player::new(
        eid,
        format!("player-{eid}"),
        Uuid::from_u128(eid as u128),
        Vec::new(),
        GameMode::Creative,
        pos,
        Vec2::ZERO,
        view_distance,
        inputs.clone(),
    );
    world.add_player(client.clone(), player, RateLimiter::unlimited());
    (client, inputs, eid)
}

pub fn set_input_position(inputs: &Arc<Mutex<Inputs>>, pos: DVec3) {
    inputs.lock().unwrap().position = pos;
}

pub fn set_input_rotation(inputs: &Arc<Mutex<Inputs>>, rot: Vec2) {
    inputs.lock().unwrap().rotation = rot;
}

//! Per-connection client: two pipeline threads around a bounded outbound
//! queue, the handler dispatch table, and every clientbound packet builder.
//!
//! A `Client` is a cheap handle with identity semantics; the world and the
//! playerlist key their tables on it.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use glam::{DVec3, Vec2};
use uuid::Uuid;

use net_core::codec::{Bytes, PacketEncode};
use net_core::packet::{clientbound, serverbound};
use net_core::queue::{PacketQueue, PushError};
use net_core::transport::Connection;
use net_core::{Message, Packet};
use server_core::{
    angle_to_byte, Chunk, ChunkPos, ChunkViewer, ClientHandle, EntityId, EntityViewer, GameMode,
    Inputs, Player, Property,
};

use super::movement;

/// Outbound capacity. Sized so one bursty chunk subtick cannot block the
/// world tick; a client that falls further behind than this is dead weight
/// and gets dropped.
const QUEUE_CAPACITY: usize = 256;

pub type PacketHandler = Arc<dyn Fn(&Client, &Packet) -> anyhow::Result<()> + Send + Sync>;
pub(crate) type HandlerTable = [Option<PacketHandler>; serverbound::COUNT];

/// Identity fixed at login.
pub struct Profile {
    pub name: String,
    pub uuid: Uuid,
    pub properties: Vec<Property>,
    pub gamemode: GameMode,
}

struct ClientInner {
    conn: Box<dyn Connection>,
    queue: PacketQueue,
    handlers: Mutex<HandlerTable>,
    profile: Profile,
    inputs: Arc<Mutex<Inputs>>,
    eid: EntityId,
    teleport_ids: AtomicI32,
}

#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Client {}
impl std::hash::Hash for Client {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl Client {
    pub fn new(
        conn: Box<dyn Connection>,
        profile: Profile,
        inputs: Arc<Mutex<Inputs>>,
        eid: EntityId,
    ) -> Self {
        Self(Arc::new(ClientInner {
            conn,
            queue: PacketQueue::new(QUEUE_CAPACITY),
            handlers: Mutex::new(movement::default_handlers()),
            profile,
            inputs,
            eid,
            teleport_ids: AtomicI32::new(0),
        }))
    }

    pub fn profile(&self) -> &Profile {
        &self.0.profile
    }

    pub fn eid(&self) -> EntityId {
        self.0.eid
    }

    pub fn inputs(&self) -> &Arc<Mutex<Inputs>> {
        &self.0.inputs
    }

    pub fn latency(&self) -> Duration {
        self.0.inputs.lock().unwrap_or_else(|e| e.into_inner()).latency
    }

    pub fn set_latency(&self, latency: Duration) {
        self.0.inputs.lock().unwrap_or_else(|e| e.into_inner()).latency = latency;
    }

    /// Override one entry of the dispatch table. The table starts as a copy
    /// of the defaults; the gameplay layer installs its chat and keepalive
    /// handlers here before the pipeline starts.
    pub fn add_handler(&self, id: i32, handler: PacketHandler) {
        let mut table = self.0.handlers.lock().unwrap_or_else(|e| e.into_inner());
        table[usize::try_from(id).expect("valid serverbound id")] = Some(handler);
    }

    /// Run the pipeline until either side stops: spawns the send and
    /// receive threads, waits for the first to finish, then tears both
    /// down. Returns when the connection is dead.
    pub fn start(&self) {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(2);
        let send = {
            let client = self.clone();
            let done = done_tx.clone();
            std::thread::Builder::new()
                .name("client-send".to_owned())
                .spawn(move || {
                    client.run_send();
                    let _ = done.send(());
                })
                .expect("spawn send thread")
        };
        let receive = {
            let client = self.clone();
            std::thread::Builder::new()
                .name("client-receive".to_owned())
                .spawn(move || {
                    client.run_receive();
                    let _ = done_tx.send(());
                })
                .expect("spawn receive thread")
        };

        let _ = done_rx.recv();
        self.0.conn.shutdown();
        self.0.queue.close();
        let _ = send.join();
        let _ = receive.join();
    }

    fn run_send(&self) {
        while let Some(pkt) = self.0.queue.pull() {
            if let Err(err) = self.0.conn.write_packet(&pkt) {
                log::debug!("send packet failed: {err:#}");
                return;
            }
            if pkt.id == clientbound::DISCONNECT {
                return;
            }
        }
    }

    fn run_receive(&self) {
        loop {
            let pkt = match self.0.conn.read_packet() {
                Ok(pkt) => pkt,
                Err(err) => {
                    log::debug!("receive packet failed: {err:#}");
                    return;
                }
            };
            let Ok(idx) = usize::try_from(pkt.id) else {
                log::debug!("invalid packet id {}", pkt.id);
                return;
            };
            if idx >= serverbound::COUNT {
                log::debug!("invalid packet id {}", pkt.id);
                return;
            }
            let handler = self.0.handlers.lock().unwrap_or_else(|e| e.into_inner())[idx].clone();
            if let Some(handler) = handler {
                if let Err(err) = handler(self, &pkt) {
                    log::error!("packet {} handler failed: {err:#}", pkt.id);
                    return;
                }
            }
        }
    }

    fn push(&self, pkt: Packet) {
        match self.0.queue.push(pkt) {
            Ok(()) => {}
            Err(PushError::Full) => {
                log::warn!(
                    "outbound queue full, dropping slow client {}",
                    self.0.profile.name
                );
                self.0.conn.shutdown();
            }
            // Teardown already in progress.
            Err(PushError::Closed) => {}
        }
    }

    fn send(&self, id: i32, build: impl FnOnce(&mut Vec<u8>)) {
        let mut data = Vec::new();
        build(&mut data);
        self.push(Packet::new(id, data));
    }

    // Clientbound packet builders.

    pub fn send_keep_alive(&self, token: i64) {
        self.send(clientbound::KEEP_ALIVE, |out| token.encode(out));
    }

    /// Once the packet is written the send thread closes the connection.
    pub fn send_disconnect_message(&self, reason: &Message) {
        log::debug!("disconnecting {}: {reason:?}", self.0.profile.name);
        self.send(clientbound::DISCONNECT, |out| reason.encode(out));
    }

    pub fn send_login(&self, level_name: &str, view_distance: i32) {
        let profile = &self.0.profile;
        self.send(clientbound::LOGIN, |out| {
            self.0.eid.encode(out);
            false.encode(out); // hardcore
            profile.gamemode.id().encode(out);
            level_name.encode(out);
            view_distance.encode(out);
            view_distance.encode(out); // simulation distance
            false.encode(out); // reduced debug info
            false.encode(out); // respawn screen
        });
    }

    pub fn send_server_data(&self, motd: &Message, enforce_secure_profile: bool) {
        self.send(clientbound::SERVER_DATA, |out| {
            motd.encode(out);
            enforce_secure_profile.encode(out);
        });
    }

    pub fn send_system_chat(&self, msg: &Message, overlay: bool) {
        self.send(clientbound::SYSTEM_CHAT, |out| {
            msg.encode(out);
            overlay.encode(out);
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn send_player_chat(
        &self,
        sender: Uuid,
        sender_name: &str,
        index: i32,
        message: &str,
        timestamp_ms: i64,
        salt: i64,
        signature: Option<&Bytes>,
    ) {
        self.send(clientbound::PLAYER_CHAT, |out| {
            sender.encode(out);
            index.encode(out);
            signature.cloned().encode(out);
            message.encode(out);
            timestamp_ms.encode(out);
            salt.encode(out);
            sender_name.encode(out);
        });
    }

    pub fn send_player_info_update(&self, actions: u8, entries: &[PlayerInfoEntry]) {
        self.send(clientbound::PLAYER_INFO_UPDATE, |out| {
            actions.encode(out);
            let len = u32::try_from(entries.len()).expect("entry count fits u32");
            len.encode(out);
            for entry in entries {
                entry.uuid.encode(out);
                if actions & INFO_ADD_PLAYER != 0 {
                    entry.name.encode(out);
                    encode_properties(out, &entry.properties);
                }
                if actions & INFO_UPDATE_GAMEMODE != 0 {
                    entry.gamemode.encode(out);
                }
                if actions & INFO_UPDATE_LISTED != 0 {
                    entry.listed.encode(out);
                }
                if actions & INFO_UPDATE_LATENCY != 0 {
                    entry.latency_ms.encode(out);
                }
            }
        });
    }

    pub fn send_player_info_remove(&self, uuids: &[Uuid]) {
        self.send(clientbound::PLAYER_INFO_REMOVE, |out| {
            uuids.to_vec().encode(out);
        });
    }

    pub fn send_level_chunk(&self, pos: ChunkPos, chunk: &Chunk) {
        self.send(clientbound::LEVEL_CHUNK, |out| {
            pos[0].encode(out);
            pos[1].encode(out);
            let sections = u32::try_from(chunk.sections.len()).expect("section count fits u32");
            sections.encode(out);
            for section in &chunk.sections {
                section.non_air.encode(out);
                for block in section.blocks.iter() {
                    block.encode(out);
                }
            }
        });
    }

    pub fn send_forget_level_chunk(&self, pos: ChunkPos) {
        self.send(clientbound::FORGET_LEVEL_CHUNK, |out| {
            pos[0].encode(out);
            pos[1].encode(out);
        });
    }

    pub fn send_add_player(&self, player: &Player) {
        self.send(clientbound::ADD_PLAYER, |out| {
            player.entity.eid.encode(out);
            player.uuid.encode(out);
            player.entity.position.x.encode(out);
            player.entity.position.y.encode(out);
            player.entity.position.z.encode(out);
            angle_to_byte(player.entity.rotation.x).encode(out);
            angle_to_byte(player.entity.rotation.y).encode(out);
        });
    }

    pub fn send_remove_entities(&self, eids: &[EntityId]) {
        self.send(clientbound::REMOVE_ENTITIES, |out| {
            eids.to_vec().encode(out);
        });
    }

    pub fn send_move_entity_pos(&self, eid: EntityId, delta: [i16; 3], on_ground: bool) {
        self.send(clientbound::MOVE_ENTITY_POS, |out| {
            eid.encode(out);
            delta[0].encode(out);
            delta[1].encode(out);
            delta[2].encode(out);
            on_ground.encode(out);
        });
    }

    pub fn send_move_entity_pos_rot(
        &self,
        eid: EntityId,
        delta: [i16; 3],
        rot: [i8; 2],
        on_ground: bool,
    ) {
        self.send(clientbound::MOVE_ENTITY_POS_ROT, |out| {
            eid.encode(out);
            delta[0].encode(out);
            delta[1].encode(out);
            delta[2].encode(out);
            rot[0].encode(out);
            rot[1].encode(out);
            on_ground.encode(out);
        });
    }

    pub fn send_move_entity_rot(&self, eid: EntityId, rot: [i8; 2], on_ground: bool) {
        self.send(clientbound::MOVE_ENTITY_ROT, |out| {
            eid.encode(out);
            rot[0].encode(out);
            rot[1].encode(out);
            on_ground.encode(out);
        });
    }

    pub fn send_rotate_head(&self, eid: EntityId, yaw: i8) {
        self.send(clientbound::ROTATE_HEAD, |out| {
            eid.encode(out);
            yaw.encode(out);
        });
    }

    pub fn send_teleport_entity(&self, eid: EntityId, pos: DVec3, rot: [i8; 2], on_ground: bool) {
        self.send(clientbound::TELEPORT_ENTITY, |out| {
            eid.encode(out);
            pos.x.encode(out);
            pos.y.encode(out);
            pos.z.encode(out);
            rot[0].encode(out);
            rot[1].encode(out);
            on_ground.encode(out);
        });
    }

    pub fn send_set_default_spawn_position(&self, pos: DVec3, angle: f32) {
        self.send(clientbound::SET_DEFAULT_SPAWN_POSITION, |out| {
            (pos.x.floor() as i32).encode(out);
            (pos.y.floor() as i32).encode(out);
            (pos.z.floor() as i32).encode(out);
            angle.encode(out);
        });
    }
}

/// Player-info action bits.
pub const INFO_ADD_PLAYER: u8 = 1 << 0;
pub const INFO_UPDATE_GAMEMODE: u8 = 1 << 2;
pub const INFO_UPDATE_LISTED: u8 = 1 << 3;
pub const INFO_UPDATE_LATENCY: u8 = 1 << 4;

pub struct PlayerInfoEntry {
    pub uuid: Uuid,
    pub name: String,
    pub properties: Vec<Property>,
    pub gamemode: u8,
    pub latency_ms: i32,
    pub listed: bool,
}

fn encode_properties(out: &mut Vec<u8>, properties: &[Property]) {
    let len = u32::try_from(properties.len()).expect("property count fits u32");
    len.encode(out);
    for property in properties {
        property.name.encode(out);
        property.value.encode(out);
        property.signature.encode(out);
    }
}

impl ChunkViewer for Client {
    fn view_chunk_load(&self, pos: ChunkPos, chunk: &Chunk) {
        self.send_level_chunk(pos, chunk);
    }
    fn view_chunk_unload(&self, pos: ChunkPos) {
        self.send_forget_level_chunk(pos);
    }
}

impl EntityViewer for Client {
    fn view_add_player(&self, player: &Player) {
        self.send_add_player(player);
    }
    fn view_remove_entities(&self, eids: &[EntityId]) {
        self.send_remove_entities(eids);
    }
    fn view_move_entity_pos(&self, eid: EntityId, delta: [i16; 3], on_ground: bool) {
        self.send_move_entity_pos(eid, delta, on_ground);
    }
    fn view_move_entity_pos_and_rot(
        &self,
        eid: EntityId,
        delta: [i16; 3],
        rot: [i8; 2],
        on_ground: bool,
    ) {
        self.send_move_entity_pos_rot(eid, delta, rot, on_ground);
    }
    fn view_move_entity_rot(&self, eid: EntityId, rot: [i8; 2], on_ground: bool) {
        self.send_move_entity_rot(eid, rot, on_ground);
    }
    fn view_rotate_head(&self, eid: EntityId, yaw: i8) {
        self.send_rotate_head(eid, yaw);
    }
    fn view_teleport_entity(&self, eid: EntityId, pos: DVec3, rot: [i8; 2], on_ground: bool) {
        self.send_teleport_entity(eid, pos, rot, on_ground);
    }
}

impl ClientHandle for Client {
    fn send_disconnect(&self, reason: &str) {
        self.send_disconnect_message(&Message::translate(reason));
    }

    fn send_player_position(&self, pos: DVec3, rot: Vec2) -> i32 {
        // Teleport ids are a per-client sequence; they only need to be
        // unambiguous within this connection.
        let id = self.0.teleport_ids.fetch_add(1, Ordering::Relaxed) + 1;
        self.send(clientbound::PLAYER_POSITION, |out| {
            pos.x.encode(out);
            pos.y.encode(out);
            pos.z.encode(out);
            rot.x.encode(out);
            rot.y.encode(out);
            0u8.encode(out); // absolute coordinates
            id.encode(out);
        });
        id
    }

    fn send_set_chunk_cache_center(&self, x: i32, z: i32) {
        self.send(clientbound::SET_CHUNK_CACHE_CENTER, |out| {
            x.encode(out);
            z.encode(out);
        });
    }
}

impl net_core::keepalive::KeepaliveClient for Client {
    fn send_keep_alive(&self, token: i64) {
        Client::send_keep_alive(self, token);
    }

    fn disconnect_timeout(&self) {
        self.send_disconnect_message(&Message::translate("disconnect.timeout"));
    }
}

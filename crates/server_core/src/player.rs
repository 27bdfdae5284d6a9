//! Players: entity state plus identity, client settings and the shared
//! input snapshot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use glam::{DVec3, Vec2};
use spatial_core::{Aabb, LeafId};
use uuid::Uuid;

use crate::entity::{Entity, EntityId};
use crate::loader::MAX_RADIUS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl GameMode {
    pub fn id(self) -> u8 {
        match self {
            GameMode::Survival => 0,
            GameMode::Creative => 1,
            GameMode::Adventure => 2,
            GameMode::Spectator => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(GameMode::Survival),
            1 => Some(GameMode::Creative),
            2 => Some(GameMode::Adventure),
            3 => Some(GameMode::Spectator),
            _ => None,
        }
    }
}

/// Opaque profile property handed over by login (skin textures and the
/// like); forwarded to clients, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

/// Client settings, refreshed whenever the client sends an information
/// packet.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub locale: String,
    pub view_distance: i8,
    pub chat_mode: i32,
    pub chat_colors: bool,
    pub displayed_skin_parts: u8,
    pub main_hand: i32,
    pub text_filtering: bool,
    pub allow_listings: bool,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            locale: "en_us".to_owned(),
            view_distance: 10,
            chat_mode: 0,
            chat_colors: true,
            displayed_skin_parts: 0x7f,
            main_hand: 1,
            text_filtering: false,
            allow_listings: true,
        }
    }
}

/// Snapshot of the latest client input, written by the receive task and
/// read by the tick under `try_lock` (a contended tick skips the player).
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    pub info: ClientInfo,
    pub position: DVec3,
    pub rotation: Vec2,
    pub on_ground: bool,
    pub latency: Duration,
    pub teleport_id: i32,
}

/// A corrective teleport the server has issued and the client has not yet
/// acknowledged. While pending, position reports are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeleportRequest {
    pub id: i32,
    pub position: DVec3,
    pub rotation: Vec2,
}

pub struct Player {
    pub entity: Entity,
    pub name: String,
    pub uuid: Uuid,
    pub properties: Vec<Property>,
    pub gamemode: GameMode,
    /// Cached chunk coordinates of `position`; the chunk subtick refreshes
    /// it and tells the client when the center moved.
    pub chunk_pos: [i32; 3],
    pub view_distance: i32,
    /// Remote entities this player has been told about.
    pub entities_in_view: HashSet<EntityId>,
    pub teleport: Option<TeleportRequest>,
    /// Shared with the connection's receive task.
    pub inputs: Arc<Mutex<Inputs>>,
    /// This player's leaf in the world's view-volume BVH; set while the
    /// player is registered with a world.
    pub view: Option<LeafId>,
}

impl Player {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        eid: EntityId,
        name: String,
        uuid: Uuid,
        properties: Vec<Property>,
        gamemode: GameMode,
        position: DVec3,
        rotation: Vec2,
        view_distance: i32,
        inputs: Arc<Mutex<Inputs>>,
    ) -> Self {
        Self {
            entity: Entity::new(eid, position, rotation),
            name,
            uuid,
            properties,
            gamemode,
            chunk_pos: chunk_pos_of(position),
            view_distance,
            entities_in_view: HashSet::new(),
            teleport: None,
            inputs,
            view: None,
        }
    }

    pub fn chunk_position(&self) -> [i32; 2] {
        [self.chunk_pos[0], self.chunk_pos[2]]
    }

    pub fn chunk_radius(&self) -> i32 {
        self.view_distance.min(MAX_RADIUS)
    }

    /// The axis-aligned cube of world space this player can observe.
    pub fn view_box(&self) -> Aabb {
        view_box(self.entity.position, self.view_distance)
    }
}

pub fn view_box(center: DVec3, view_distance: i32) -> Aabb {
    Aabb::cube(center, f64::from(view_distance) * 16.0)
}

pub fn chunk_pos_of(position: DVec3) -> [i32; 3] {
    [
        (position.x.floor() as i32) >> 4,
        (position.y.floor() as i32) >> 4,
        (position.z.floor() as i32) >> 4,
    ]
}

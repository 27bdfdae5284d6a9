//! Base entity state shared by everything that moves through the world.

use glam::{DVec3, Vec2};

/// Entity ids are signed 32-bit and unique within one world.
pub type EntityId = i32;

/// Position in world blocks, rotation as (yaw, pitch) degrees. The `*_prev`
/// fields are the pose most recently accepted from the owner but not yet
/// broadcast; the entity subtick diffs them against the broadcast pose and
/// commits them afterwards.
#[derive(Debug, Clone)]
pub struct Entity {
    pub eid: EntityId,
    pub position: DVec3,
    pub rotation: Vec2,
    pub on_ground: bool,
    pub pos_prev: DVec3,
    pub rot_prev: Vec2,
}

impl Entity {
    pub fn new(eid: EntityId, position: DVec3, rotation: Vec2) -> Self {
        Self {
            eid,
            position,
            rotation,
            on_ground: false,
            pos_prev: position,
            rot_prev: rotation,
        }
    }
}

/// A client-reported position is usable only when every axis is a finite
/// number; NaN or infinite coordinates would corrupt the spatial index.
pub fn position_valid(p: DVec3) -> bool {
    p.is_finite()
}

/// Angle byte encoding used by entity rotation packets: full turn = 256,
/// wrapping.
pub fn angle_to_byte(degrees: f32) -> i8 {
    (degrees * 256.0 / 360.0) as i32 as i8
}

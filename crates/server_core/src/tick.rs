//! The fixed-cadence tick: chunk streaming, player input integration and
//! entity movement broadcast, strictly in that order under the world lock.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use glam::DVec3;
use spatial_core::touch_point;
use spatial_core::Bound;

use crate::chunk::{Chunk, ChunkPos, LoadedChunk};
use crate::entity::{angle_to_byte, position_valid, EntityId};
use crate::player::{chunk_pos_of, view_box, TeleportRequest};
use crate::store::{ChunkStore, StoreError};
use crate::viewer::ClientHandle;
use crate::world::{World, WorldState};

pub const TICK_INTERVAL: Duration = Duration::from_millis(50);
/// The chunk subtick runs on every eighth tick.
const CHUNK_SUBTICK_PERIOD: u64 = 8;
/// Movement beyond this many blocks in one tick is a desync or a speed
/// hack; the player is snapped back with a corrective teleport.
const MAX_MOVE_PER_TICK: f64 = 100.0;
/// Displacements at or past this many blocks per axis overflow the i16
/// delta encoding and are broadcast as entity teleports.
const DELTA_RANGE: f64 = 8.0;

/// Placeholder block for generated chunks until a real generator exists.
const FILLER_BLOCK: u16 = 1;

impl<C: ClientHandle> World<C> {
    /// Drive ticks until [`World::stop`]. A late tick runs once and the
    /// schedule re-bases instead of bursting to catch up.
    pub fn run_tick_loop(&self) {
        let mut n = 0u64;
        let mut next = Instant::now();
        while self.running.load(Ordering::Relaxed) {
            self.tick(n);
            n = n.wrapping_add(1);
            next += TICK_INTERVAL;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            } else {
                next = now;
            }
        }
    }

    /// One world tick. Exposed so tests can step the world deterministically.
    pub fn tick(&self, n: u64) {
        let mut st = self.lock();
        if n % CHUNK_SUBTICK_PERIOD == 0 {
            st.subtick_chunk_load();
        }
        st.subtick_update_players(self.config().view_distance);
        st.subtick_update_entities();
    }
}

enum LoadOutcome {
    Loaded,
    /// The global limiter refused; the whole subtick stops.
    Limited,
    /// Store failure; the coordinate is skipped this round.
    Failed,
}

/// Fetch or generate a chunk into the chunk table. Free function so the
/// caller can keep its loader borrow alive.
fn load_chunk<C: ClientHandle>(
    store: &mut Box<dyn ChunkStore>,
    chunks: &mut HashMap<ChunkPos, LoadedChunk<C>>,
    pos: ChunkPos,
) -> LoadOutcome {
    let chunk = match store.get(pos) {
        Ok(chunk) => chunk,
        Err(StoreError::NotExist) => {
            log::debug!("generating chunk ({}, {})", pos[0], pos[1]);
            Chunk::solid_filler(FILLER_BLOCK)
        }
        Err(StoreError::RateLimited) => return LoadOutcome::Limited,
        Err(err) => {
            log::error!("chunk ({}, {}) load failed: {err}", pos[0], pos[1]);
            return LoadOutcome::Failed;
        }
    };
    chunks.insert(pos, LoadedChunk::new(chunk));
    LoadOutcome::Loaded
}

impl<C: ClientHandle> WorldState<C> {
    /// Chunk streaming: refresh cache centers, drain load queues under the
    /// rate limiters, process unload queues, then drop chunks nobody views.
    pub(crate) fn subtick_chunk_load(&mut self) {
        for (c, p) in &mut self.players {
            let pos = chunk_pos_of(p.entity.position);
            if pos != p.chunk_pos {
                p.chunk_pos = pos;
                c.send_set_chunk_cache_center(pos[0], pos[2]);
            }
        }

        let viewers: Vec<C> = self.loaders.keys().cloned().collect();
        'load: for c in &viewers {
            let Some(p) = self.players.get(c) else { continue };
            let (center, radius) = (p.chunk_position(), p.chunk_radius());
            let Some(loader) = self.loaders.get_mut(c) else { continue };
            loader.calc_load_queue(center, radius);
            for i in 0..loader.load_queue.len() {
                let pos = loader.load_queue[i];
                if !loader.limiter.allow() {
                    break;
                }
                if !self.chunks.contains_key(&pos) {
                    match load_chunk(&mut self.store, &mut self.chunks, pos) {
                        LoadOutcome::Loaded => {}
                        LoadOutcome::Limited => break 'load,
                        LoadOutcome::Failed => continue,
                    }
                }
                loader.loaded.insert(pos);
                let chunk = self.chunks.get_mut(&pos).expect("chunk was just loaded");
                chunk.add_viewer(c.clone());
                c.view_chunk_load(pos, &chunk.chunk);
            }
        }

        for c in &viewers {
            let Some(p) = self.players.get(c) else { continue };
            let (center, radius) = (p.chunk_position(), p.chunk_radius());
            let Some(loader) = self.loaders.get_mut(c) else { continue };
            loader.calc_unload_queue(center, radius);
            for i in 0..loader.unload_queue.len() {
                let pos = loader.unload_queue[i];
                loader.loaded.remove(&pos);
                let chunk = self
                    .chunks
                    .get_mut(&pos)
                    .unwrap_or_else(|| panic!("loaded chunk {pos:?} missing from chunk table"));
                assert!(
                    chunk.remove_viewer(c),
                    "viewer is not registered with its loaded chunk"
                );
                c.view_chunk_unload(pos);
            }
        }

        let empty: Vec<ChunkPos> = self
            .chunks
            .iter()
            .filter(|(_, chunk)| chunk.viewer_count() == 0)
            .map(|(pos, _)| *pos)
            .collect();
        for pos in empty {
            self.unload_chunk(pos);
        }
    }

    /// Drop a chunk from the world, notifying remaining viewers and
    /// offering the payload back to the store.
    fn unload_chunk(&mut self, pos: ChunkPos) {
        let Some(chunk) = self.chunks.remove(&pos) else {
            panic!("unloading chunk {pos:?} that is not loaded");
        };
        for viewer in chunk.viewers() {
            viewer.view_chunk_unload(pos);
        }
        if let Err(err) = self.store.put(pos, &chunk.chunk) {
            log::error!("chunk ({}, {}) store failed: {err}", pos[0], pos[1]);
        }
    }

    /// Integrate client input: view-distance changes, stale observation
    /// culling, teleport acknowledgements and movement validation.
    pub(crate) fn subtick_update_players(&mut self, max_view_distance: i32) {
        let positions: HashMap<EntityId, DVec3> = self
            .players
            .values()
            .map(|p| (p.entity.eid, p.entity.position))
            .collect();

        let clients: Vec<C> = self.players.keys().cloned().collect();
        for c in &clients {
            let Some(p) = self.players.get_mut(c) else { continue };
            let inputs_arc = p.inputs.clone();
            let inputs = match inputs_arc.try_lock() {
                Ok(guard) => guard,
                Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(std::sync::TryLockError::WouldBlock) => continue,
            };

            let cap = max_view_distance.clamp(2, 32);
            let wanted = i32::from(inputs.info.view_distance).clamp(2, cap);
            if p.view_distance != wanted {
                p.view_distance = wanted;
                if let Some(leaf) = p.view.take() {
                    let value = self.views.delete(leaf);
                    p.view = Some(self.views.insert(view_box(p.entity.position, wanted), value));
                }
            }

            if let Some(leaf) = p.view {
                let vbox = self.views.bound(leaf);
                let stale: Vec<EntityId> = p
                    .entities_in_view
                    .iter()
                    .copied()
                    .filter(|eid| match positions.get(eid) {
                        Some(pos) => !vbox.contains(*pos),
                        None => true,
                    })
                    .collect();
                for eid in stale {
                    p.entities_in_view.remove(&eid);
                    c.view_remove_entities(&[eid]);
                }
            }

            if let Some(teleport) = &p.teleport {
                // Only the matching acknowledgement commits; everything
                // else leaves the correction pending.
                if inputs.teleport_id == teleport.id {
                    p.entity.pos_prev = teleport.position;
                    p.entity.rot_prev = teleport.rotation;
                    p.teleport = None;
                }
            } else {
                let distance = (inputs.position - p.entity.position).length();
                if distance > MAX_MOVE_PER_TICK {
                    let id = c.send_player_position(p.entity.position, p.entity.rotation);
                    p.teleport = Some(TeleportRequest {
                        id,
                        position: p.entity.position,
                        rotation: p.entity.rotation,
                    });
                } else if position_valid(inputs.position) {
                    p.entity.pos_prev = inputs.position;
                    p.entity.rot_prev = inputs.rotation;
                    p.entity.on_ground = inputs.on_ground;
                } else {
                    log::info!(
                        "player {} reported invalid position ({}, {}, {})",
                        p.name,
                        inputs.position.x,
                        inputs.position.y,
                        inputs.position.z
                    );
                    c.send_disconnect("multiplayer.disconnect.invalid_player_movement");
                }
            }
        }
    }

    /// Broadcast entity motion to every observer whose view volume contains
    /// the entity, then commit the accepted pose.
    pub(crate) fn subtick_update_entities(&mut self) {
        let clients: Vec<C> = self.players.keys().cloned().collect();
        for c in &clients {
            let Some(p) = self.players.get(c) else { continue };
            let eid = p.entity.eid;
            let broadcast_pos = p.entity.position;
            let next_pos = p.entity.pos_prev;
            let next_rot = p.entity.rot_prev;
            let on_ground = p.entity.on_ground;
            let pos_changed = next_pos != broadcast_pos;
            let rot_changed = next_rot != p.entity.rotation;

            let moved = next_pos - broadcast_pos;
            let teleported = pos_changed && moved.abs().max_element() >= DELTA_RANGE;
            let delta = encode_delta(moved);
            let rot = [angle_to_byte(next_rot.x), angle_to_byte(next_rot.y)];

            let mut observers = Vec::new();
            self.views.find(touch_point(broadcast_pos), |_, v: &C| {
                observers.push(v.clone());
                true
            });
            for o in &observers {
                if o == c {
                    continue;
                }
                let known = self
                    .players
                    .get(o)
                    .is_some_and(|op| op.entities_in_view.contains(&eid));
                if !known {
                    let Some(op) = self.players.get_mut(o) else { continue };
                    op.entities_in_view.insert(eid);
                    let source = self.players.get(c).expect("entity player is registered");
                    o.view_add_player(source);
                } else if teleported {
                    o.view_teleport_entity(eid, next_pos, rot, on_ground);
                } else if pos_changed && rot_changed {
                    o.view_move_entity_pos_and_rot(eid, delta, rot, on_ground);
                    o.view_rotate_head(eid, rot[0]);
                } else if pos_changed {
                    o.view_move_entity_pos(eid, delta, on_ground);
                } else if rot_changed {
                    o.view_move_entity_rot(eid, rot, on_ground);
                    o.view_rotate_head(eid, rot[0]);
                }
            }

            let p = self.players.get_mut(c).expect("entity player is registered");
            p.entity.position = next_pos;
            p.entity.rotation = next_rot;
            if pos_changed {
                if let Some(leaf) = p.view.take() {
                    let value = self.views.delete(leaf);
                    p.view = Some(self.views.insert(view_box(next_pos, p.view_distance), value));
                }
            }
        }
    }
}

/// Relative move encoding: `(new - old) * 32 * 128` per axis, clamped to
/// the i16 range.
fn encode_delta(moved: DVec3) -> [i16; 3] {
    let encode = |d: f64| (d * 32.0 * 128.0).clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
    [encode(moved.x), encode(moved.y), encode(moved.z)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_encoding_scales_and_clamps() {
        assert_eq!(encode_delta(DVec3::ZERO), [0, 0, 0]);
        assert_eq!(encode_delta(DVec3::new(1.0, -1.0, 0.5)), [4096, -4096, 2048]);
        // 8 blocks either way saturates the i16 range.
        assert_eq!(encode_delta(DVec3::new(8.0, -8.0, 0.0)), [i16::MAX, i16::MIN, 0]);
    }
}

//! The world: every mutable table behind one mutex, mutated by the tick
//! thread and by player registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use glam::DVec3;
use spatial_core::{touch_point, Aabb, Bvh};

use crate::chunk::{ChunkPos, LoadedChunk};
use crate::entity::EntityId;
use crate::limiter::RateLimiter;
use crate::loader::Loader;
use crate::player::Player;
use crate::store::ChunkStore;
use crate::viewer::ClientHandle;

#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Server-side cap on any player's chunk radius.
    pub view_distance: i32,
    pub spawn_position: DVec3,
    pub spawn_angle: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            view_distance: 10,
            spawn_position: DVec3::new(48.0, 100.0, 35.0),
            spawn_angle: 0.0,
        }
    }
}

pub struct World<C: ClientHandle> {
    config: WorldConfig,
    pub(crate) state: Mutex<WorldState<C>>,
    entity_ids: AtomicI32,
    pub(crate) running: AtomicBool,
}

/// The tables. Invariants, all enforced under the world mutex: every loader
/// key has a player entry; every chunk in a loader's `loaded` set exists in
/// the chunk table and lists that viewer; every chunk viewer has a loader;
/// each registered player owns a live leaf in `views`.
pub(crate) struct WorldState<C: ClientHandle> {
    pub(crate) store: Box<dyn ChunkStore>,
    pub(crate) chunks: HashMap<ChunkPos, LoadedChunk<C>>,
    pub(crate) loaders: HashMap<C, Loader>,
    pub(crate) players: HashMap<C, Player>,
    pub(crate) by_eid: HashMap<EntityId, C>,
    pub(crate) views: Bvh<Aabb, C>,
}

impl<C: ClientHandle> World<C> {
    pub fn new(store: Box<dyn ChunkStore>, config: WorldConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WorldState {
                store,
                chunks: HashMap::new(),
                loaders: HashMap::new(),
                players: HashMap::new(),
                by_eid: HashMap::new(),
                views: Bvh::new(),
            }),
            entity_ids: AtomicI32::new(0),
            running: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Fresh entity id, unique within this world.
    pub fn next_entity_id(&self) -> EntityId {
        self.entity_ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a player: create its loader, index its entity id and
    /// insert its view volume into the spatial index.
    pub fn add_player(&self, client: C, mut player: Player, limiter: RateLimiter) {
        let mut st = self.lock();
        let mut loader = Loader::new(limiter);
        loader.calc_load_queue(player.chunk_position(), player.chunk_radius());
        st.loaders.insert(client.clone(), loader);
        st.by_eid.insert(player.entity.eid, client.clone());
        let leaf = st.views.insert(player.view_box(), client.clone());
        player.view = Some(leaf);
        st.players.insert(client, player);
    }

    /// Unregister a player: detach it from every chunk it was viewing,
    /// drop its tables and tell observers to forget its entity.
    pub fn remove_player(&self, client: &C) {
        let mut st = self.lock();
        let Some(loader) = st.loaders.remove(client) else {
            return;
        };
        log::debug!(
            "removing player: {} chunks held, {} loaded in world",
            loader.loaded.len(),
            st.chunks.len()
        );
        for pos in &loader.loaded {
            let chunk = st
                .chunks
                .get_mut(pos)
                .unwrap_or_else(|| panic!("loaded chunk {pos:?} missing from chunk table"));
            assert!(
                chunk.remove_viewer(client),
                "viewer is not registered with its loaded chunk"
            );
        }
        let Some(player) = st.players.remove(client) else {
            panic!("loader existed for a client with no player entry");
        };
        st.by_eid.remove(&player.entity.eid);
        if let Some(leaf) = player.view {
            st.views.delete(leaf);
        }

        let eid = player.entity.eid;
        let mut observers = Vec::new();
        st.views.find(touch_point(player.entity.position), |_, c: &C| {
            observers.push(c.clone());
            true
        });
        for o in observers {
            if let Some(op) = st.players.get_mut(&o) {
                op.entities_in_view.remove(&eid);
            }
            o.view_remove_entities(&[eid]);
        }
    }

    /// Ask the tick loop to stop after the tick in progress.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, WorldState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Inspection helpers, mainly for integration tests and admin tooling.

    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    pub fn player_position(&self, client: &C) -> Option<DVec3> {
        self.lock().players.get(client).map(|p| p.entity.position)
    }

    pub fn pending_teleport_id(&self, client: &C) -> Option<i32> {
        self.lock()
            .players
            .get(client)
            .and_then(|p| p.teleport.as_ref().map(|t| t.id))
    }

    pub fn has_chunk(&self, pos: ChunkPos) -> bool {
        self.lock().chunks.contains_key(&pos)
    }

    pub fn chunk_viewer_count(&self, pos: ChunkPos) -> Option<usize> {
        self.lock().chunks.get(&pos).map(|c| c.viewer_count())
    }

    pub fn loaded_chunks_of(&self, client: &C) -> Vec<ChunkPos> {
        self.lock()
            .loaders
            .get(client)
            .map(|l| l.loaded.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn sees_entity(&self, client: &C, eid: EntityId) -> bool {
        self.lock()
            .players
            .get(client)
            .is_some_and(|p| p.entities_in_view.contains(&eid))
    }
}

//! Persistence seams: the world loads chunks and player records through
//! these traits and stays indifferent to what backs them.

use glam::{DVec3, Vec2};
use thiserror::Error;
use uuid::Uuid;

use crate::chunk::{Chunk, ChunkPos};
use crate::limiter::RateLimiter;
use crate::player::GameMode;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The record was never written. Chunks get generated, players get
    /// defaults.
    #[error("record does not exist")]
    NotExist,
    /// The store-wide limiter refused; retried on a later subtick.
    #[error("rate limit reached")]
    RateLimited,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub trait ChunkStore: Send {
    fn get(&mut self, pos: ChunkPos) -> Result<Chunk, StoreError>;
    /// Best-effort write-back on unload.
    fn put(&mut self, pos: ChunkPos, chunk: &Chunk) -> Result<(), StoreError>;
}

/// What persistence knows about a player. The entity id is assigned fresh
/// on every load.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub position: DVec3,
    pub rotation: Vec2,
    pub gamemode: GameMode,
}

pub trait PlayerStore: Send {
    fn get(&mut self, name: &str, uuid: Uuid) -> Result<PlayerRecord, StoreError>;
}

/// Keeps chunks for the lifetime of the process. Serves as the world
/// store until region persistence lands, and as the store for tests.
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: std::collections::HashMap<ChunkPos, Chunk>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkStore for MemoryChunkStore {
    fn get(&mut self, pos: ChunkPos) -> Result<Chunk, StoreError> {
        self.chunks.get(&pos).cloned().ok_or(StoreError::NotExist)
    }

    fn put(&mut self, pos: ChunkPos, chunk: &Chunk) -> Result<(), StoreError> {
        self.chunks.insert(pos, chunk.clone());
        Ok(())
    }
}

/// Applies the world-wide chunk loading limiter in front of another store.
pub struct ThrottledChunkStore<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S: ChunkStore> ThrottledChunkStore<S> {
    pub fn new(inner: S, limiter: RateLimiter) -> Self {
        Self { inner, limiter }
    }
}

impl<S: ChunkStore> ChunkStore for ThrottledChunkStore<S> {
    fn get(&mut self, pos: ChunkPos) -> Result<Chunk, StoreError> {
        if !self.limiter.allow() {
            return Err(StoreError::RateLimited);
        }
        self.inner.get(pos)
    }

    fn put(&mut self, pos: ChunkPos, chunk: &Chunk) -> Result<(), StoreError> {
        self.inner.put(pos, chunk)
    }
}

/// Player store with no backing records; every player starts fresh.
pub struct NullPlayerStore;

impl PlayerStore for NullPlayerStore {
    fn get(&mut self, _name: &str, _uuid: Uuid) -> Result<PlayerRecord, StoreError> {
        Err(StoreError::NotExist)
    }
}

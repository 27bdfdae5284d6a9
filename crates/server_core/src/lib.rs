//! server_core: authoritative world state for a chunked voxel world.
//!
//! The world owns every mutable table (chunks, loaders, players, the BVH of
//! view volumes) behind one mutex and mutates them from a fixed 50 ms tick.
//! Connections talk to it only through the viewer traits and the shared
//! per-player input snapshot.

pub mod chunk;
pub mod entity;
pub mod limiter;
pub mod loader;
pub mod player;
pub mod store;
pub mod tick;
pub mod viewer;
pub mod world;

pub use chunk::{Chunk, ChunkPos, LoadedChunk, Section};
pub use entity::{angle_to_byte, position_valid, Entity, EntityId};
pub use limiter::RateLimiter;
pub use loader::Loader;
pub use player::{ClientInfo, GameMode, Inputs, Player, Property, TeleportRequest};
pub use store::{ChunkStore, MemoryChunkStore, NullPlayerStore, PlayerRecord, PlayerStore, StoreError, ThrottledChunkStore};
pub use viewer::{ChunkViewer, ClientHandle, EntityViewer};
pub use world::{World, WorldConfig};

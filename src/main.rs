use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use net_core::codec::PacketDecode;
use net_core::packet::login;
use net_core::transport::{Connection, TcpConnection};
use server_core::{MemoryChunkStore, ThrottledChunkStore, World, WorldConfig};

use stonereach::config;
use stonereach::game::Game;

fn main() {
    // Developer-friendly default logging (info+) unless RUST_LOG overrides
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();

    let config = match config::load("server.toml") {
        Ok(config) => config,
        Err(err) => {
            log::error!("configuration failed to load: {err:#}");
            return;
        }
    };
    log::info!("server starting");

    let store = ThrottledChunkStore::new(
        MemoryChunkStore::new(),
        config.chunk_loading_limiter.limiter(),
    );
    let world = Arc::new(World::new(
        Box::new(store),
        WorldConfig {
            view_distance: config.view_distance.clamp(2, 32),
            ..WorldConfig::default()
        },
    ));
    {
        let world = Arc::clone(&world);
        std::thread::Builder::new()
            .name("world-tick".to_owned())
            .spawn(move || world.run_tick_loop())
            .expect("spawn tick thread");
    }

    let game = Game::new(config.clone(), world, Box::new(server_core::NullPlayerStore));

    let listener = match TcpListener::bind(&config.listen_address) {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("cannot listen on {}: {err}", config.listen_address);
            return;
        }
    };
    log::info!("listening on {}", config.listen_address);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let game = Arc::clone(&game);
                let spawned = std::thread::Builder::new()
                    .name("connection".to_owned())
                    .spawn(move || {
                        if let Err(err) = handle_connection(&game, stream) {
                            log::debug!("connection ended: {err:#}");
                        }
                    });
                if let Err(err) = spawned {
                    log::warn!("cannot spawn connection thread: {err}");
                }
            }
            Err(err) => log::warn!("accept failed: {err}"),
        }
    }
}

/// Minimal login: one hello frame carrying protocol version, name and
/// uuid, then the play-state pipeline takes over for the rest of the
/// session.
fn handle_connection(game: &Game, stream: TcpStream) -> Result<()> {
    let peer = stream.peer_addr().context("peer address")?;
    let conn = TcpConnection::new(stream).context("wrap connection")?;

    let hello = conn.read_packet().context("read hello")?;
    if hello.id != login::HELLO {
        bail!("expected hello, got packet {}", hello.id);
    }
    let mut cur = hello.data.as_slice();
    let protocol = i32::decode(&mut cur).context("hello protocol")?;
    let name = String::decode(&mut cur).context("hello name")?;
    let uuid = Uuid::decode(&mut cur).context("hello uuid")?;
    if name.is_empty() || name.len() > 16 {
        bail!("bad player name {name:?}");
    }
    log::debug!("{peer} hello: {name} ({uuid}), protocol {protocol}");

    game.accept_player(name, uuid, Vec::new(), Box::new(conn));
    Ok(())
}

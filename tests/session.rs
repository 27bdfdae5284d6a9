//! End-to-end sessions over the loopback transport: login choreography,
//! chunk streaming into the pipeline, movement round-trips and chat
//! validation.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use net_core::codec::{Bytes, PacketDecode, PacketEncode};
use net_core::packet::{clientbound, serverbound};
use net_core::transport::{loopback_pair, Connection, LoopbackConnection};
use net_core::{Message, Packet};
use server_core::{MemoryChunkStore, NullPlayerStore, World, WorldConfig};

use stonereach::config::Config;
use stonereach::game::Game;

struct Session {
    world: Arc<World<stonereach::game::Client>>,
    game: Arc<Game>,
    conn: LoopbackConnection,
    pipeline: std::thread::JoinHandle<()>,
}

fn start_session(name: &str) -> Session {
    let world = Arc::new(World::new(
        Box::new(MemoryChunkStore::new()),
        WorldConfig::default(),
    ));
    let game = Game::new(Config::default(), Arc::clone(&world), Box::new(NullPlayerStore));
    let (server_end, client_end) = loopback_pair(4096);
    let pipeline = {
        let game = Arc::clone(&game);
        let name = name.to_owned();
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes());
        std::thread::spawn(move || {
            game.accept_player(name, uuid, Vec::new(), Box::new(server_end));
        })
    };
    Session {
        world,
        game,
        conn: client_end,
        pipeline,
    }
}

impl Session {
    /// Read packets until one with `id` arrives, failing after too many
    /// unrelated packets.
    fn read_until(&self, id: i32) -> Packet {
        for _ in 0..2000 {
            let pkt = self.conn.read_packet().expect("connection alive");
            if pkt.id == id {
                return pkt;
            }
        }
        panic!("packet {id} never arrived");
    }

    fn send(&self, id: i32, build: impl FnOnce(&mut Vec<u8>)) {
        let mut data = Vec::new();
        build(&mut data);
        self.conn.write_packet(&Packet::new(id, data)).expect("send");
        // Give the server-side receive thread a moment to apply it.
        std::thread::sleep(Duration::from_millis(30));
    }

    fn finish(self) {
        self.conn.shutdown();
        self.pipeline.join().expect("pipeline thread");
        self.game.stop();
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_millis() as i64
}

#[test]
fn login_streams_the_world_and_tracks_movement() {
    let session = start_session("steve");

    // Join choreography, in order: login, server data, roster, the initial
    // position sync and the spawn point.
    let login = session.read_until(clientbound::LOGIN);
    let mut cur = login.data.as_slice();
    let eid = i32::decode(&mut cur).expect("eid");
    assert!(eid > 0);
    session.read_until(clientbound::SERVER_DATA);
    session.read_until(clientbound::PLAYER_INFO_UPDATE);
    let pos_sync = session.read_until(clientbound::PLAYER_POSITION);
    let mut cur = pos_sync.data.as_slice();
    let x = f64::decode(&mut cur).expect("x");
    assert_eq!(x, 48.0);
    session.read_until(clientbound::SET_DEFAULT_SPAWN_POSITION);

    // First tick streams chunks around the spawn chunk (3, 2).
    session.world.tick(0);
    let chunk = session.read_until(clientbound::LEVEL_CHUNK);
    let mut cur = chunk.data.as_slice();
    let cx = i32::decode(&mut cur).expect("cx");
    let cz = i32::decode(&mut cur).expect("cz");
    assert_eq!([cx, cz], [3, 2]);

    // Walk east across two chunk borders; the cache center follows.
    session.send(serverbound::MOVE_PLAYER_POS, |out| {
        80.0f64.encode(out);
        100.0f64.encode(out);
        35.0f64.encode(out);
        true.encode(out);
    });
    session.world.tick(1);
    session.world.tick(8);
    let center = session.read_until(clientbound::SET_CHUNK_CACHE_CENTER);
    let mut cur = center.data.as_slice();
    assert_eq!(i32::decode(&mut cur).expect("x"), 5);
    assert_eq!(i32::decode(&mut cur).expect("z"), 2);

    session.finish();
}

#[test]
fn chat_with_illegal_characters_disconnects() {
    let session = start_session("alex");
    session.read_until(clientbound::SET_DEFAULT_SPAWN_POSITION);

    session.send(serverbound::CHAT, |out| {
        "ding\x07".encode(out);
        now_ms().encode(out);
        0i64.encode(out);
        Option::<Bytes>::None.encode(out);
    });

    let disconnect = session.read_until(clientbound::DISCONNECT);
    let mut cur = disconnect.data.as_slice();
    let reason = Message::decode(&mut cur).expect("reason");
    assert_eq!(
        reason.translate.as_deref(),
        Some("multiplayer.disconnect.illegal_characters")
    );

    session.pipeline.join().expect("pipeline ends after disconnect");
    session.game.stop();
    assert_eq!(session.game.player_count(), 0);
}

#[test]
fn valid_chat_is_relayed_to_the_roster() {
    let session = start_session("carol");
    session.read_until(clientbound::SET_DEFAULT_SPAWN_POSITION);

    session.send(serverbound::CHAT, |out| {
        "hello there".encode(out);
        now_ms().encode(out);
        42i64.encode(out);
        Option::<Bytes>::None.encode(out);
    });

    let chat = session.read_until(clientbound::PLAYER_CHAT);
    let mut cur = chat.data.as_slice();
    let sender = Uuid::decode(&mut cur).expect("sender");
    let _index = i32::decode(&mut cur).expect("index");
    let signature = Option::<Bytes>::decode(&mut cur).expect("signature");
    let message = String::decode(&mut cur).expect("message");
    assert_eq!(sender, Uuid::new_v5(&Uuid::NAMESPACE_OID, b"carol"));
    assert!(signature.is_none());
    assert_eq!(message, "hello there");

    session.finish();
}

#[test]
fn out_of_order_chat_disconnects() {
    let session = start_session("dave");
    session.read_until(clientbound::SET_DEFAULT_SPAWN_POSITION);

    let first = now_ms();
    session.send(serverbound::CHAT, |out| {
        "first".encode(out);
        first.encode(out);
        0i64.encode(out);
        Option::<Bytes>::None.encode(out);
    });
    session.send(serverbound::CHAT, |out| {
        "stale".encode(out);
        (first - 1000).encode(out);
        0i64.encode(out);
        Option::<Bytes>::None.encode(out);
    });

    let disconnect = session.read_until(clientbound::DISCONNECT);
    let mut cur = disconnect.data.as_slice();
    let reason = Message::decode(&mut cur).expect("reason");
    assert_eq!(
        reason.translate.as_deref(),
        Some("multiplayer.disconnect.out_of_order_chat")
    );
    session.pipeline.join().expect("pipeline ends after disconnect");
    session.game.stop();
}

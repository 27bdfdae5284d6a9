//! The game layer: join/leave choreography around the world, the roster
//! and chat services, and keepalive wiring.

pub mod chat;
pub mod client;
pub mod movement;
pub mod playerlist;

use std::sync::{Arc, Mutex};

use glam::Vec2;
use uuid::Uuid;

use net_core::codec::PacketDecode;
use net_core::keepalive::{Keepalive, KEEPALIVE_INTERVAL};
use net_core::packet::serverbound;
use net_core::transport::Connection;
use net_core::Message;
use server_core::{
    ClientHandle, GameMode, Inputs, Player, PlayerRecord, PlayerStore, Property, StoreError, World,
};

use crate::config::Config;
use self::chat::GlobalChat;
use self::playerlist::PlayerList;
pub use self::client::Client;

pub struct Game {
    config: Config,
    world: Arc<World<Client>>,
    players: Arc<PlayerList>,
    chat: Arc<GlobalChat>,
    keepalive: Arc<Keepalive<Client>>,
    player_store: Mutex<Box<dyn PlayerStore>>,
}

impl Game {
    pub fn new(
        config: Config,
        world: Arc<World<Client>>,
        player_store: Box<dyn PlayerStore>,
    ) -> Arc<Self> {
        let players = Arc::new(PlayerList::new(config.max_players));
        let keepalive = {
            let players = Arc::clone(&players);
            Arc::new(Keepalive::new(KEEPALIVE_INTERVAL, move |client, latency| {
                players.update_latency(client, latency);
            }))
        };
        {
            let keepalive = Arc::clone(&keepalive);
            std::thread::Builder::new()
                .name("keepalive".to_owned())
                .spawn(move || keepalive.run())
                .expect("spawn keepalive thread");
        }
        Arc::new(Self {
            chat: Arc::new(GlobalChat::new(Arc::clone(&players))),
            config,
            world,
            players,
            keepalive,
            player_store: Mutex::new(player_store),
        })
    }

    pub fn world(&self) -> &Arc<World<Client>> {
        &self.world
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Stop the background services and disconnect everyone still online.
    /// The caller stops the listener; each client's own pipeline finishes
    /// the teardown.
    pub fn stop(&self) {
        self.keepalive.stop();
        self.world.stop();
        self.players.for_each(|client| {
            client.send_disconnect_message(&Message::translate("multiplayer.disconnect.server_shutdown"));
        });
    }

    /// Run one player's whole session: load-or-create the record, wire the
    /// client into every service, pump the pipeline until it stops, then
    /// unwind in reverse order. Called from the connection's own thread
    /// after login has produced an identity.
    pub fn accept_player(
        &self,
        name: String,
        uuid: Uuid,
        properties: Vec<Property>,
        conn: Box<dyn Connection>,
    ) {
        let record = match self
            .player_store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&name, uuid)
        {
            Ok(record) => record,
            Err(StoreError::NotExist) => PlayerRecord {
                position: self.world.config().spawn_position,
                rotation: Vec2::ZERO,
                gamemode: GameMode::Creative,
            },
            Err(err) => {
                log::error!("player record for {name} failed to load: {err}");
                return;
            }
        };

        let eid = self.world.next_entity_id();
        log::info!("{name} ({uuid}) joined with eid {eid}");

        let inputs = Arc::new(Mutex::new(Inputs {
            position: record.position,
            rotation: record.rotation,
            ..Inputs::default()
        }));
        let profile = client::Profile {
            name: name.clone(),
            uuid,
            properties: properties.clone(),
            gamemode: record.gamemode,
        };
        let client = Client::new(conn, profile, Arc::clone(&inputs), eid);

        let view_distance = self.config.view_distance.clamp(2, 32);
        client.send_login(&self.config.level_name, view_distance);
        client.send_server_data(
            &Message::text(self.config.motd.clone()),
            self.config.enforce_secure_profile,
        );

        self.chat.broadcast_system(
            &Message::translate("multiplayer.player.joined")
                .with(Message::text(name.clone()))
                .color("yellow"),
            false,
        );

        client.add_handler(serverbound::CHAT, Arc::clone(&self.chat).handler());
        client.add_handler(serverbound::KEEP_ALIVE, {
            let keepalive = Arc::clone(&self.keepalive);
            Arc::new(move |client: &Client, pkt| {
                let mut cur = pkt.data.as_slice();
                let token = i64::decode(&mut cur)?;
                keepalive.client_ack(client, token);
                Ok(())
            })
        });

        if !self.players.join(&client) {
            log::info!("{name} rejected: server is full");
            client.send_disconnect_message(&Message::translate(
                "multiplayer.disconnect.server_full",
            ));
            client.start();
            self.chat.forget(&client);
            return;
        }
        self.keepalive.client_join(client.clone());

        client.send_player_position(record.position, record.rotation);
        let player = Player::new(
            eid,
            name.clone(),
            uuid,
            properties,
            record.gamemode,
            record.position,
            record.rotation,
            view_distance,
            Arc::clone(&inputs),
        );
        self.world
            .add_player(client.clone(), player, self.config.player_chunk_loading_limiter.limiter());
        let world_config = self.world.config();
        client.send_set_default_spawn_position(world_config.spawn_position, world_config.spawn_angle);

        client.start();

        self.world.remove_player(&client);
        self.keepalive.client_left(&client);
        self.players.leave(&client);
        self.chat.forget(&client);
        self.chat.broadcast_system(
            &Message::translate("multiplayer.player.left")
                .with(Message::text(name.clone()))
                .color("yellow"),
            false,
        );
        log::info!("{name} left");
    }
}

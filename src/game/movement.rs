//! Default serverbound handlers: movement, teleport acknowledgement and
//! client settings. All of them only write the player's input snapshot;
//! the tick integrates it.

use anyhow::Result;
use glam::{DVec3, Vec2};

use net_core::codec::PacketDecode;
use net_core::packet::serverbound;
use net_core::Packet;

use super::client::{Client, HandlerTable, PacketHandler};

/// The table every fresh client starts from. Chat and keepalive slots stay
/// empty here; the gameplay layer overrides them per connection.
pub(crate) fn default_handlers() -> HandlerTable {
    let mut table: HandlerTable = std::array::from_fn(|_| None);
    table[serverbound::ACCEPT_TELEPORTATION as usize] = Some(handler(accept_teleportation));
    table[serverbound::CLIENT_INFORMATION as usize] = Some(handler(client_information));
    table[serverbound::MOVE_PLAYER_POS as usize] = Some(handler(move_player_pos));
    table[serverbound::MOVE_PLAYER_POS_ROT as usize] = Some(handler(move_player_pos_rot));
    table[serverbound::MOVE_PLAYER_ROT as usize] = Some(handler(move_player_rot));
    table[serverbound::MOVE_PLAYER_STATUS_ONLY as usize] = Some(handler(move_player_status_only));
    table
}

fn handler(f: fn(&Client, &Packet) -> Result<()>) -> PacketHandler {
    std::sync::Arc::new(f)
}

fn accept_teleportation(client: &Client, pkt: &Packet) -> Result<()> {
    let mut cur = pkt.data.as_slice();
    let teleport_id = i32::decode(&mut cur)?;
    let mut inputs = client.inputs().lock().unwrap_or_else(|e| e.into_inner());
    inputs.teleport_id = teleport_id;
    Ok(())
}

fn client_information(client: &Client, pkt: &Packet) -> Result<()> {
    let mut cur = pkt.data.as_slice();
    let locale = String::decode(&mut cur)?;
    let view_distance = i8::decode(&mut cur)?;
    let chat_mode = i32::decode(&mut cur)?;
    let chat_colors = bool::decode(&mut cur)?;
    let displayed_skin_parts = u8::decode(&mut cur)?;
    let main_hand = i32::decode(&mut cur)?;
    let text_filtering = bool::decode(&mut cur)?;
    let allow_listings = bool::decode(&mut cur)?;

    let mut inputs = client.inputs().lock().unwrap_or_else(|e| e.into_inner());
    inputs.info.locale = locale;
    inputs.info.view_distance = view_distance;
    inputs.info.chat_mode = chat_mode;
    inputs.info.chat_colors = chat_colors;
    inputs.info.displayed_skin_parts = displayed_skin_parts;
    inputs.info.main_hand = main_hand;
    inputs.info.text_filtering = text_filtering;
    inputs.info.allow_listings = allow_listings;
    Ok(())
}

fn move_player_pos(client: &Client, pkt: &Packet) -> Result<()> {
    let mut cur = pkt.data.as_slice();
    let x = f64::decode(&mut cur)?;
    let feet_y = f64::decode(&mut cur)?;
    let z = f64::decode(&mut cur)?;
    let on_ground = bool::decode(&mut cur)?;
    let mut inputs = client.inputs().lock().unwrap_or_else(|e| e.into_inner());
    inputs.position = DVec3::new(x, feet_y, z);
    inputs.on_ground = on_ground;
    Ok(())
}

fn move_player_pos_rot(client: &Client, pkt: &Packet) -> Result<()> {
    let mut cur = pkt.data.as_slice();
    let x = f64::decode(&mut cur)?;
    let feet_y = f64::decode(&mut cur)?;
    let z = f64::decode(&mut cur)?;
    let yaw = f32::decode(&mut cur)?;
    let pitch = f32::decode(&mut cur)?;
    let on_ground = bool::decode(&mut cur)?;
    let mut inputs = client.inputs().lock().unwrap_or_else(|e| e.into_inner());
    inputs.position = DVec3::new(x, feet_y, z);
    inputs.rotation = Vec2::new(yaw, pitch);
    inputs.on_ground = on_ground;
    Ok(())
}

fn move_player_rot(client: &Client, pkt: &Packet) -> Result<()> {
    let mut cur = pkt.data.as_slice();
    let yaw = f32::decode(&mut cur)?;
    let pitch = f32::decode(&mut cur)?;
    let on_ground = bool::decode(&mut cur)?;
    let mut inputs = client.inputs().lock().unwrap_or_else(|e| e.into_inner());
    inputs.rotation = Vec2::new(yaw, pitch);
    inputs.on_ground = on_ground;
    Ok(())
}

fn move_player_status_only(client: &Client, pkt: &Packet) -> Result<()> {
    let mut cur = pkt.data.as_slice();
    let on_ground = u8::decode(&mut cur)?;
    let mut inputs = client.inputs().lock().unwrap_or_else(|e| e.into_inner());
    inputs.on_ground = on_ground != 0;
    Ok(())
}

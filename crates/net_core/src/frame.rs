//! Length framing for packets on a byte stream.
//!
//! Layout (little-endian): 4-byte magic `SRP1`, i32 packet id, u32 payload
//! length, payload bytes. The magic lets a desynchronized peer fail fast
//! instead of mis-decoding.

use std::io::{Read, Write};

use anyhow::{bail, Context, Result};

use crate::packet::Packet;

const FRAME_MAGIC: [u8; 4] = *b"SRP1";
/// Chunk payloads are the largest frames by far; cap well above them.
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Append one framed packet to `out`.
pub fn write_frame(out: &mut Vec<u8>, pkt: &Packet) {
    out.extend_from_slice(&FRAME_MAGIC);
    out.extend_from_slice(&pkt.id.to_le_bytes());
    let len = u32::try_from(pkt.data.len()).expect("payload length fits u32");
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&pkt.data);
}

/// Write one framed packet to a stream.
pub fn write_to(w: &mut impl Write, pkt: &Packet) -> Result<()> {
    let mut buf = Vec::with_capacity(12 + pkt.data.len());
    write_frame(&mut buf, pkt);
    w.write_all(&buf).context("write frame")?;
    Ok(())
}

/// Read one framed packet from a stream. Blocks until a whole frame is
/// available or the stream ends.
pub fn read_from(r: &mut impl Read) -> Result<Packet> {
    let mut header = [0u8; 12];
    r.read_exact(&mut header).context("read frame header")?;
    if header[0..4] != FRAME_MAGIC {
        bail!("bad frame magic");
    }
    let id = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let len = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
    if len > MAX_FRAME_LEN {
        bail!("frame too large: {len} > {MAX_FRAME_LEN}");
    }
    let mut data = vec![0u8; len];
    r.read_exact(&mut data).context("read frame payload")?;
    Ok(Packet::new(id, data))
}

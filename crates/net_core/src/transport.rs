//! Connection abstraction: blocking packet I/O.
//!
//! Handles use interior mutability so one reader thread and one writer
//! thread can share them. Implementations:
//! - `TcpConnection`: length-framed packets over a `TcpStream`
//! - `LoopbackConnection`: in-process bounded channels for tests and local
//!   tooling

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::frame;
use crate::packet::Packet;

pub trait Connection: Send + Sync {
    /// Blocks until a packet arrives; errors on close or malformed frame.
    fn read_packet(&self) -> Result<Packet>;
    fn write_packet(&self, pkt: &Packet) -> Result<()>;
    /// Unblocks both directions; subsequent reads and writes fail.
    fn shutdown(&self);
}

pub struct TcpConnection {
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<BufWriter<TcpStream>>,
    stream: TcpStream,
}

impl TcpConnection {
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            stream,
        })
    }
}

impl Connection for TcpConnection {
    fn read_packet(&self) -> Result<Packet> {
        let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        frame::read_from(&mut *reader)
    }

    fn write_packet(&self, pkt: &Packet) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        frame::write_to(&mut *writer, pkt)?;
        writer.flush().context("flush frame")?;
        Ok(())
    }

    fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

enum Never {}

/// One end of an in-process connection pair.
pub struct LoopbackConnection {
    tx: Mutex<Option<Sender<Packet>>>,
    rx: Receiver<Packet>,
    stop_tx: Mutex<Option<Sender<Never>>>,
    stop_rx: Receiver<Never>,
}

/// Build a connected pair of loopback endpoints with the given per-direction
/// channel capacity.
pub fn loopback_pair(capacity: usize) -> (LoopbackConnection, LoopbackConnection) {
    let (tx_a, rx_a) = bounded(capacity);
    let (tx_b, rx_b) = bounded(capacity);
    let (stop_a_tx, stop_a_rx) = bounded(0);
    let (stop_b_tx, stop_b_rx) = bounded(0);
    let a = LoopbackConnection {
        tx: Mutex::new(Some(tx_a)),
        rx: rx_b,
        stop_tx: Mutex::new(Some(stop_a_tx)),
        stop_rx: stop_a_rx,
    };
    let b = LoopbackConnection {
        tx: Mutex::new(Some(tx_b)),
        rx: rx_a,
        stop_tx: Mutex::new(Some(stop_b_tx)),
        stop_rx: stop_b_rx,
    };
    (a, b)
}

impl Connection for LoopbackConnection {
    fn read_packet(&self) -> Result<Packet> {
        // The stop channel never carries a value; it becomes selectable
        // only once shutdown drops its sender.
        select! {
            recv(self.rx) -> msg => match msg {
                Ok(pkt) => Ok(pkt),
                Err(_) => bail!("connection closed by peer"),
            },
            recv(self.stop_rx) -> _ => bail!("connection shut down"),
        }
    }

    fn write_packet(&self, pkt: &Packet) -> Result<()> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            bail!("connection shut down");
        };
        if tx.send(pkt.clone()).is_err() {
            bail!("connection closed by peer");
        }
        Ok(())
    }

    fn shutdown(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.stop_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_delivers_in_order() {
        let (a, b) = loopback_pair(8);
        a.write_packet(&Packet::new(1, b"ping".to_vec())).expect("send");
        a.write_packet(&Packet::new(2, b"pong".to_vec())).expect("send");
        assert_eq!(b.read_packet().expect("recv").id, 1);
        assert_eq!(b.read_packet().expect("recv").id, 2);
    }

    #[test]
    fn shutdown_unblocks_a_pending_read() {
        let (a, b) = loopback_pair(1);
        let reader = std::thread::spawn(move || b.read_packet());
        std::thread::sleep(std::time::Duration::from_millis(20));
        a.shutdown();
        assert!(reader.join().expect("join").is_err());
    }

    #[test]
    fn local_shutdown_fails_reads_and_writes() {
        let (a, _b) = loopback_pair(1);
        a.shutdown();
        assert!(a.read_packet().is_err());
        assert!(a.write_packet(&Packet::new(0, Vec::new())).is_err());
    }
}

//! Keepalive service: periodic ping, latency measurement, dead-connection
//! detection.
//!
//! Every cycle each registered client either gets a fresh token or, if the
//! previous one is still unanswered, a missed-cycle mark. Two consecutive
//! misses disconnect the client. Acks carry the token back; a matching ack
//! yields a round-trip latency that is reported through the callback.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const MISSED_CYCLE_LIMIT: u32 = 2;

pub trait KeepaliveClient: Clone + Eq + Hash + Send + Sync + 'static {
    fn send_keep_alive(&self, token: i64);
    fn disconnect_timeout(&self);
}

struct Entry {
    pending: Option<(i64, Instant)>,
    missed: u32,
}

type LatencyCallback<K> = Box<dyn Fn(&K, Duration) + Send + Sync>;

pub struct Keepalive<K: KeepaliveClient> {
    interval: Duration,
    next_token: AtomicI64,
    clients: Mutex<HashMap<K, Entry>>,
    on_latency: LatencyCallback<K>,
    running: AtomicBool,
}

impl<K: KeepaliveClient> Keepalive<K> {
    pub fn new(interval: Duration, on_latency: impl Fn(&K, Duration) + Send + Sync + 'static) -> Self {
        Self {
            interval,
            next_token: AtomicI64::new(1),
            clients: Mutex::new(HashMap::new()),
            on_latency: Box::new(on_latency),
            running: AtomicBool::new(true),
        }
    }

    pub fn client_join(&self, client: K) {
        self.lock().insert(
            client,
            Entry {
                pending: None,
                missed: 0,
            },
        );
    }

    pub fn client_left(&self, client: &K) {
        self.lock().remove(client);
    }

    /// Handle an acknowledged token from the client's keepalive packet.
    /// Tokens that do not match the outstanding ping are ignored.
    pub fn client_ack(&self, client: &K, token: i64) {
        let latency = {
            let mut clients = self.lock();
            let Some(entry) = clients.get_mut(client) else {
                return;
            };
            match entry.pending {
                Some((expect, sent_at)) if expect == token => {
                    entry.pending = None;
                    entry.missed = 0;
                    sent_at.elapsed()
                }
                _ => return,
            }
        };
        (self.on_latency)(client, latency);
    }

    /// Drives the service until `stop`. Run on a dedicated thread.
    pub fn run(&self) {
        while self.running.load(Ordering::Relaxed) {
            std::thread::sleep(self.interval);
            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            self.cycle();
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// One keepalive cycle over all registered clients.
    pub fn cycle(&self) {
        let mut pings = Vec::new();
        let mut timeouts = Vec::new();
        {
            let mut clients = self.lock();
            clients.retain(|client, entry| {
                if entry.pending.is_some() {
                    entry.missed += 1;
                    if entry.missed >= MISSED_CYCLE_LIMIT {
                        timeouts.push(client.clone());
                        return false;
                    }
                    return true;
                }
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                entry.pending = Some((token, Instant::now()));
                pings.push((client.clone(), token));
                true
            });
        }
        // Dispatch outside the table lock; both calls only enqueue packets.
        for (client, token) in pings {
            client.send_keep_alive(token);
        }
        for client in timeouts {
            log::debug!("keepalive timeout, disconnecting client");
            client.disconnect_timeout();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Entry>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }
}

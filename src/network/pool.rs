//! The set of live connections, split into a normal pool and a
//! long-polling pool.
//!
//! Every connection handed out by [`BrokerPool::get_or_open`] is watched by
//! a supervisor task (spawned alongside it) that bridges the connection's
//! own `ConnEvent`s onto the client-level [`EventBus`](crate::events::EventBus)
//! and owns the reconnect policy: on an unintentional close the dead
//! connection is dropped from the pool and, unless it's sat idle for the
//! reconnect delay, reopened and renegotiated automatically.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::ClientConfig;
use crate::correlation::CorrelationCounter;
use crate::errors::{Error, Result};
use crate::events::{ClientEvent, EventBus};
use crate::negotiator;
use crate::network::callback_queue::CallbackQueue;
use crate::network::connection::{BrokerConnection, BrokerEndpoint, ConnEvent};
use crate::protocol::CodecRegistry;

/// Delay before a dropped connection is reopened, unless it went idle in
/// the meantime.
const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

#[derive(Default)]
struct Pools {
    brokers: HashMap<String, Arc<BrokerConnection>>,
    longpolling_brokers: HashMap<String, Arc<BrokerConnection>>,
}

pub struct BrokerPool {
    pools: Mutex<Pools>,
    closing: std::sync::atomic::AtomicBool,
    events: EventBus,
}

impl BrokerPool {
    pub fn new(events: EventBus) -> Self {
        BrokerPool {
            pools: Mutex::new(Pools::default()),
            closing: std::sync::atomic::AtomicBool::new(false),
            events,
        }
    }

    pub fn mark_closing(&self) {
        self.closing.store(true, std::sync::atomic::Ordering::Release);
    }

    fn is_closing(&self) -> bool {
        self.closing.load(std::sync::atomic::Ordering::Acquire)
    }

    fn select(pools: &mut Pools, longpolling: bool) -> &mut HashMap<String, Arc<BrokerConnection>> {
        if longpolling {
            &mut pools.longpolling_brokers
        } else {
            &mut pools.brokers
        }
    }

    /// Looks up `host:port` in the requested pool; opens and version-
    /// negotiates a new connection on miss. Rejects new connections once
    /// the client is closing. The new connection is handed to a supervisor
    /// task that owns its reconnect policy for as long as it lives.
    pub async fn get_or_open(
        self: &Arc<Self>,
        endpoint: BrokerEndpoint,
        longpolling: bool,
        config: &ClientConfig,
        callback_queue: &CallbackQueue,
        registry: &Arc<CodecRegistry>,
        correlation: &Arc<CorrelationCounter>,
    ) -> Result<Arc<BrokerConnection>> {
        let key = endpoint.key();

        if let Some(conn) = {
            let mut pools = self.pools.lock();
            Self::select(&mut pools, longpolling).get(&key).cloned()
        } {
            if conn.is_connected() {
                return Ok(conn);
            }
        }

        if self.is_closing() {
            return Err(Error::ClientIsClosing);
        }

        let conn = BrokerConnection::open(endpoint.clone(), longpolling, config, callback_queue.clone()).await?;
        negotiator::negotiate(&conn, registry, correlation, config).await?;

        let mut pools = self.pools.lock();
        Self::select(&mut pools, longpolling).insert(key, conn.clone());
        drop(pools);

        self.spawn_supervisor(
            conn.clone(),
            endpoint,
            longpolling,
            config.clone(),
            callback_queue.clone(),
            registry.clone(),
            correlation.clone(),
        );

        Ok(conn)
    }

    /// Watches one connection for the rest of its life: bridges
    /// `socket_error` onto the client event bus, and on an unintentional
    /// close removes it from the pool and reopens it after
    /// [`RECONNECT_DELAY`] unless it has since gone idle.
    fn spawn_supervisor(
        self: &Arc<Self>,
        conn: Arc<BrokerConnection>,
        endpoint: BrokerEndpoint,
        longpolling: bool,
        config: ClientConfig,
        callback_queue: CallbackQueue,
        registry: Arc<CodecRegistry>,
        correlation: Arc<CorrelationCounter>,
    ) {
        let pool = self.clone();
        let mut events = conn.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnEvent::SocketError(err)) => {
                        pool.events.emit(ClientEvent::SocketError(Arc::new(
                            Error::BrokerNotAvailable(err).background(),
                        )));
                    }
                    Ok(ConnEvent::Close) => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            if conn.is_closing() {
                return;
            }

            let key = endpoint.key();
            {
                let mut pools = pool.pools.lock();
                let map = Self::select(&mut pools, longpolling);
                if map.get(&key).is_some_and(|current| Arc::ptr_eq(current, &conn)) {
                    map.remove(&key);
                }
            }

            if pool.is_closing() {
                return;
            }

            tokio::time::sleep(RECONNECT_DELAY).await;

            if conn.is_idle() || pool.is_closing() {
                return;
            }

            match BrokerConnection::open(endpoint.clone(), longpolling, &config, callback_queue.clone()).await {
                Ok(new_conn) => {
                    if let Err(e) = negotiator::negotiate(&new_conn, &registry, &correlation, &config).await {
                        pool.events.emit(ClientEvent::Error(Arc::new(e.background())));
                        return;
                    }

                    {
                        let mut pools = pool.pools.lock();
                        Self::select(&mut pools, longpolling).insert(key, new_conn.clone());
                    }

                    pool.events.emit(ClientEvent::Reconnect);
                    pool.spawn_supervisor(new_conn, endpoint, longpolling, config, callback_queue, registry, correlation);
                }
                Err(e) => {
                    pool.events.emit(ClientEvent::Error(Arc::new(e.background())));
                }
            }
        });
    }

    /// All connections, both pools, that are currently connected.
    pub fn get_connected(&self) -> Vec<Arc<BrokerConnection>> {
        let pools = self.pools.lock();
        pools
            .brokers
            .values()
            .chain(pools.longpolling_brokers.values())
            .filter(|c| c.is_connected())
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &str, longpolling: bool) -> Option<Arc<BrokerConnection>> {
        let mut pools = self.pools.lock();
        Self::select(&mut pools, longpolling).get(key).cloned()
    }

    /// Closes and drops every connection whose key is not in `valid_addrs`,
    /// in both pools.
    pub async fn close_dead(&self, valid_addrs: &HashSet<String>) {
        let dead: Vec<Arc<BrokerConnection>> = {
            let mut pools = self.pools.lock();
            let mut dead = Vec::new();

            pools.brokers.retain(|key, conn| {
                let keep = valid_addrs.contains(key);
                if !keep {
                    dead.push(conn.clone());
                }
                keep
            });
            pools.longpolling_brokers.retain(|key, conn| {
                let keep = valid_addrs.contains(key);
                if !keep {
                    dead.push(conn.clone());
                }
                keep
            });

            dead
        };

        for conn in dead {
            conn.close().await;
        }
    }

    /// Removes a connection from both pools without closing it (the caller
    /// has already observed it dead via a `Close` event).
    pub fn remove(&self, key: &str) {
        let mut pools = self.pools.lock();
        pools.brokers.remove(key);
        pools.longpolling_brokers.remove(key);
    }

    pub async fn close_all(&self) {
        self.mark_closing();
        let conns: Vec<Arc<BrokerConnection>> = {
            let pools = self.pools.lock();
            pools
                .brokers
                .values()
                .chain(pools.longpolling_brokers.values())
                .cloned()
                .collect()
        };
        for conn in conns {
            conn.close().await;
        }
        let mut pools = self.pools.lock();
        pools.brokers.clear();
        pools.longpolling_brokers.clear();
    }
}

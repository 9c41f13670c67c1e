use std::collections::HashMap;

use chatproto::conn::ConnId;
use chatproto::event::ServerEvent;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Per-connection outbound queue depth. A client that falls this far behind loses messages.
pub const OUTBOUND_QUEUE: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    JsonText(String),
    /// Ask the writer to close the socket after flushing what came before.
    Close,
}

/// Best-effort fan-out to connected sessions.
///
/// Delivery never waits: a full or closed queue drops that one message.
#[derive(Debug, Default)]
pub struct Fanout {
    peers: HashMap<ConnId, mpsc::Sender<Outbound>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conn: ConnId, tx: mpsc::Sender<Outbound>) {
        self.peers.insert(conn, tx);
    }

    pub fn remove(&mut self, conn: ConnId) -> Option<mpsc::Sender<Outbound>> {
        self.peers.remove(&conn)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Returns whether the message was queued.
    pub fn send_to(&self, conn: ConnId, ev: &ServerEvent) -> bool {
        let Some(tx) = self.peers.get(&conn) else {
            return false;
        };
        deliver(conn, tx, Outbound::JsonText(ev.to_json()))
    }

    /// Returns the number of recipients the message was queued for.
    pub fn broadcast(&self, ev: &ServerEvent) -> usize {
        self.fan(ev, None)
    }

    pub fn broadcast_except(&self, skip: ConnId, ev: &ServerEvent) -> usize {
        self.fan(ev, Some(skip))
    }

    fn fan(&self, ev: &ServerEvent, skip: Option<ConnId>) -> usize {
        let s = ev.to_json();
        self.peers
            .iter()
            .filter(|(c, _)| Some(**c) != skip)
            .filter(|(c, tx)| deliver(**c, tx, Outbound::JsonText(s.clone())))
            .count()
    }
}

/// Queue without waiting. Also used for connections that never join the fan-out.
pub fn deliver(conn: ConnId, tx: &mpsc::Sender<Outbound>, msg: Outbound) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!(conn=%conn, "outbound queue full; dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

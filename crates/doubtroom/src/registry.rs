use std::collections::HashMap;

use chatproto::conn::ConnId;
use chatproto::persona::Persona;

#[derive(Debug, Clone)]
struct Slot {
    seq: u64,
    persona: Persona,
}

/// Live sessions: who is online, keyed by connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    by_conn: HashMap<ConnId, Slot>,
    next_seq: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any persona previously held by `conn`.
    pub fn register(&mut self, conn: ConnId, persona: Persona) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_conn.insert(conn, Slot { seq, persona });
    }

    pub fn unregister(&mut self, conn: ConnId) -> Option<Persona> {
        self.by_conn.remove(&conn).map(|s| s.persona)
    }

    pub fn contains(&self, conn: ConnId) -> bool {
        self.by_conn.contains_key(&conn)
    }

    pub fn get(&self, conn: ConnId) -> Option<&Persona> {
        self.by_conn.get(&conn).map(|s| &s.persona)
    }

    /// Personas in join order.
    pub fn list(&self) -> Vec<Persona> {
        let mut v = self.by_conn.values().collect::<Vec<_>>();
        v.sort_by_key(|s| s.seq);
        v.into_iter().map(|s| s.persona.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_conn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_conn.is_empty()
    }
}

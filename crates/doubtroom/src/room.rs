use std::sync::Arc;

use chatproto::conn::ConnId;
use chatproto::event::ServerEvent;
use chatproto::persona::{Catalog, Persona};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fanout::{Fanout, Outbound, deliver};
use crate::history::{ConversationEntry, ConversationLog, DEFAULT_HISTORY_CAP};
use crate::pool::NamePool;
use crate::registry::SessionRegistry;
use crate::responder::{Responder, ResponderConfig, pick_speaker};

#[derive(Clone, Debug)]
pub struct RoomConfig {
    pub catalog: Catalog,
    /// Only used when the catalog has AI personas.
    pub history_cap: usize,
    /// `None` keeps AI personas silent (present on the roster, never speaking).
    pub responder: Option<ResponderConfig>,
    /// Fixed seed for the trigger/speaker RNG; entropy when unset.
    pub rng_seed: Option<u64>,
}

impl RoomConfig {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            history_cap: DEFAULT_HISTORY_CAP,
            responder: None,
            rng_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    RoomFull { capacity: usize },
    AlreadyJoined,
}

impl std::fmt::Display for JoinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinError::RoomFull { capacity } => write!(f, "room full ({capacity} seats)"),
            JoinError::AlreadyJoined => write!(f, "connection already joined"),
        }
    }
}

impl std::error::Error for JoinError {}

/// Lifecycle of one transport connection as seen by the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnState {
    Unassigned,
    Active(Persona),
    Closed,
}

impl ConnState {
    pub fn persona(&self) -> Option<&Persona> {
        match self {
            ConnState::Active(p) => Some(p),
            _ => None,
        }
    }

    /// Move to `Closed`, returning the persona if the connection was active.
    pub fn close(&mut self) -> Option<Persona> {
        match std::mem::replace(self, ConnState::Closed) {
            ConnState::Active(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ChatOutcome {
    /// Unknown sender or blank body; nothing was sent or recorded.
    Dropped,
    /// Relayed to the other sessions. `ai` is the spawned AI turn, if one fired.
    Relayed { ai: Option<JoinHandle<()>> },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub connected_users: usize,
    pub available_slots: usize,
    pub users: Vec<Persona>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_users: Option<Vec<Persona>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_active_users: Option<usize>,
}

/// Point-in-time copy of the room state.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub free: Vec<Persona>,
    pub online: Vec<Persona>,
    pub history: Vec<ConversationEntry>,
}

struct RoomState {
    pool: NamePool,
    registry: SessionRegistry,
    log: Option<ConversationLog>,
    fanout: Fanout,
    rng: StdRng,
}

struct RoomInner {
    catalog: Arc<Catalog>,
    responder: Option<Responder>,
    // One lock for pool + registry + log + fan-out: every handler mutates them together.
    state: Mutex<RoomState>,
}

/// The chat room: presence, relay and AI turns over one shared state.
#[derive(Clone)]
pub struct Room {
    inner: Arc<RoomInner>,
}

impl Room {
    pub fn new(cfg: RoomConfig) -> anyhow::Result<Self> {
        let catalog = Arc::new(cfg.catalog);
        let has_ai = catalog.has_ai();

        let responder = match (has_ai, cfg.responder) {
            (true, Some(rc)) => Some(Responder::new(rc)?),
            (true, None) => {
                warn!("ai personas configured without a completion endpoint; they will stay silent");
                None
            }
            (false, _) => None,
        };

        let rng = match cfg.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let state = RoomState {
            pool: NamePool::new(catalog.clone()),
            registry: SessionRegistry::new(),
            log: has_ai.then(|| ConversationLog::new(cfg.history_cap)),
            fanout: Fanout::new(),
            rng,
        };

        Ok(Self {
            inner: Arc::new(RoomInner {
                catalog,
                responder,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Seat a new connection. On a full room the connection gets one error event
    /// followed by a close request, and nothing else changes.
    pub async fn connect(
        &self,
        conn: ConnId,
        tx: mpsc::Sender<Outbound>,
    ) -> Result<Persona, JoinError> {
        let mut st = self.inner.state.lock().await;
        if st.registry.contains(conn) {
            return Err(JoinError::AlreadyJoined);
        }

        let Some(persona) = st.pool.acquire() else {
            let capacity = self.inner.catalog.capacity();
            let err = ServerEvent::Error {
                message: format!("The chat room is full. (max {capacity} users)"),
            };
            deliver(conn, &tx, Outbound::JsonText(err.to_json()));
            deliver(conn, &tx, Outbound::Close);
            warn!(conn=%conn, capacity, "room full; rejecting connection");
            return Err(JoinError::RoomFull { capacity });
        };

        st.registry.register(conn, persona.clone());
        st.fanout.add(conn, tx);

        st.fanout.send_to(
            conn,
            &ServerEvent::Connected {
                name: persona.clone(),
                message: format!("Connected as {persona}!"),
            },
        );
        st.fanout.broadcast_except(
            conn,
            &ServerEvent::UserJoined {
                name: persona.clone(),
                message: format!("{persona} joined the chat room."),
            },
        );
        let roster = self.roster(&st);
        st.fanout.broadcast(&roster);

        info!(conn=%conn, name=%persona, online=st.registry.len(), "user joined");
        Ok(persona)
    }

    /// Release whatever `conn` held. Unknown connections are ignored.
    pub async fn disconnect(&self, conn: ConnId) -> Option<Persona> {
        let mut st = self.inner.state.lock().await;
        let persona = st.registry.unregister(conn)?;
        st.fanout.remove(conn);
        if !st.pool.release(persona.clone()) {
            warn!(conn=%conn, name=%persona, "released persona was already free");
        }

        st.fanout.broadcast(&ServerEvent::UserLeft {
            name: persona.clone(),
            message: format!("{persona} left the chat room."),
        });
        let roster = self.roster(&st);
        st.fanout.broadcast(&roster);

        info!(conn=%conn, name=%persona, online=st.registry.len(), "user left");
        Some(persona)
    }

    /// Relay a human message to everyone but the sender and maybe schedule an AI turn.
    pub async fn chat(&self, conn: ConnId, message: &str, timestamp: Option<f64>) -> ChatOutcome {
        let mut st = self.inner.state.lock().await;
        let Some(speaker) = st.registry.get(conn).cloned() else {
            debug!(conn=%conn, "chat from unseated connection; dropping");
            return ChatOutcome::Dropped;
        };
        if message.trim().is_empty() {
            return ChatOutcome::Dropped;
        }

        if let Some(log) = st.log.as_mut() {
            log.push(ConversationEntry {
                speaker: speaker.clone(),
                text: message.to_string(),
                timestamp,
            });
        }
        st.fanout.broadcast_except(
            conn,
            &ServerEvent::Chat {
                name: speaker.clone(),
                message: message.to_string(),
                timestamp,
            },
        );
        info!(conn=%conn, name=%speaker, text=%message, "chat");

        let ai = self.maybe_spawn_ai_turn(&mut st);
        ChatOutcome::Relayed { ai }
    }

    pub async fn status(&self) -> StatusReport {
        let st = self.inner.state.lock().await;
        let users = st.registry.list();
        let has_ai = self.inner.catalog.has_ai();
        let ai = self.inner.catalog.ai().to_vec();
        StatusReport {
            status: "running",
            connected_users: users.len(),
            available_slots: st.pool.len(),
            total_active_users: has_ai.then(|| users.len() + ai.len()),
            ai_users: has_ai.then_some(ai),
            users,
        }
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let st = self.inner.state.lock().await;
        RoomSnapshot {
            free: st.pool.available().to_vec(),
            online: st.registry.list(),
            history: st
                .log
                .as_ref()
                .map(|l| l.recent(l.len()).cloned().collect())
                .unwrap_or_default(),
        }
    }

    fn roster(&self, st: &RoomState) -> ServerEvent {
        let humans = st.registry.list();
        let ai = self.inner.catalog.ai().to_vec();
        let mut users = humans.clone();
        users.extend(ai.iter().cloned());
        let has_ai = self.inner.catalog.has_ai();
        ServerEvent::UserList {
            count: users.len(),
            users,
            human_users: has_ai.then_some(humans),
            ai_users: has_ai.then_some(ai),
        }
    }

    fn maybe_spawn_ai_turn(&self, st: &mut RoomState) -> Option<JoinHandle<()>> {
        let responder = self.inner.responder.as_ref()?;
        if !responder.should_fire(&mut st.rng) {
            return None;
        }
        let log = st.log.as_ref()?;
        if log.is_empty() {
            return None;
        }
        let transcript = log.transcript(responder.context_turns());
        let speaker = pick_speaker(self.inner.catalog.ai(), &mut st.rng)?;

        let room = self.clone();
        Some(tokio::spawn(async move {
            room.ai_turn(speaker, transcript).await;
        }))
    }

    async fn ai_turn(&self, speaker: Persona, transcript: String) {
        let Some(responder) = self.inner.responder.as_ref() else {
            return;
        };

        // Network call happens outside the room lock.
        let reply = match responder.complete(&speaker, &transcript).await {
            Ok(r) => r,
            Err(e) => {
                warn!(ai=%speaker, err=%format!("{e:#}"), "ai reply failed; dropping turn");
                return;
            }
        };

        let mut st = self.inner.state.lock().await;
        if let Some(log) = st.log.as_mut() {
            log.push(ConversationEntry {
                speaker: speaker.clone(),
                text: reply.clone(),
                timestamp: None,
            });
        }
        st.fanout.broadcast(&ServerEvent::Chat {
            name: speaker.clone(),
            message: reply,
            timestamp: None,
        });
        info!(ai=%speaker, "ai reply");
    }
}

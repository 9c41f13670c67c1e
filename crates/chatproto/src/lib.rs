//! `chatproto`: the wire vocabulary shared by the DOUBT chat server and its clients.
//!
//! - `conn`: opaque connection ids issued by the transport
//! - `persona`: the fixed persona catalog (human-assignable + AI-reserved)
//! - `event`: JSON text frames, tagged by `"type"`, in both directions

pub mod conn;
pub mod event;
pub mod persona;

#[derive(Debug, Clone)]
pub enum ProtoError {
    NotJson(String),
    UnknownType(String),
    Malformed(&'static str),
}

impl std::fmt::Display for ProtoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtoError::NotJson(e) => write!(f, "frame is not json: {e}"),
            ProtoError::UnknownType(t) => write!(f, "unknown event type: {t:?}"),
            ProtoError::Malformed(s) => write!(f, "malformed event: {s}"),
        }
    }
}

impl std::error::Error for ProtoError {}

//! `doubtroom`: the DOUBT chat room core.
//!
//! A fixed catalog of mathematician personas is handed out to connections in
//! canonical order (`pool`), tracked per connection (`registry`), and announced
//! through best-effort fan-out (`fanout`). In AI mode a bounded `history` feeds
//! the `responder`, which lets the reserved personas chime in.
//!
//! All mutable state lives behind one lock inside [`room::Room`].

pub mod fanout;
pub mod history;
pub mod pool;
pub mod registry;
pub mod responder;
pub mod room;

pub use fanout::Outbound;
pub use room::{ChatOutcome, ConnState, JoinError, Room, RoomConfig, StatusReport};

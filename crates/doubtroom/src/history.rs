use std::collections::VecDeque;

use chatproto::persona::Persona;

pub const DEFAULT_HISTORY_CAP: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationEntry {
    pub speaker: Persona,
    pub text: String,
    pub timestamp: Option<f64>,
}

/// Bounded chat history. Appending past the cap drops the oldest entry.
#[derive(Debug)]
pub struct ConversationLog {
    entries: VecDeque<ConversationEntry>,
    cap: usize,
}

impl ConversationLog {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Returns the evicted entry, if any.
    pub fn push(&mut self, e: ConversationEntry) -> Option<ConversationEntry> {
        self.entries.push_back(e);
        if self.entries.len() > self.cap {
            return self.entries.pop_front();
        }
        None
    }

    /// The last `k` entries, oldest first.
    pub fn recent(&self, k: usize) -> impl Iterator<Item = &ConversationEntry> {
        let skip = self.entries.len().saturating_sub(k);
        self.entries.iter().skip(skip)
    }

    /// `speaker: text` lines for the last `k` entries, oldest first.
    pub fn transcript(&self, k: usize) -> String {
        self.recent(k)
            .map(|e| format!("{}: {}", e.speaker, e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

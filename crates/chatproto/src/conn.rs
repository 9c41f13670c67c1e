#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u128);

impl ConnId {
    /// Fresh random id. Falls back to a process-local counter if the OS RNG is unavailable.
    pub fn random() -> Self {
        let mut b = [0u8; 16];
        if getrandom::getrandom(&mut b).is_err() {
            use std::sync::atomic::{AtomicU64, Ordering};
            static NEXT: AtomicU64 = AtomicU64::new(1);
            return Self(NEXT.fetch_add(1, Ordering::Relaxed) as u128);
        }
        Self(u128::from_be_bytes(b))
    }

    pub fn short(self) -> u64 {
        // Good enough for logs: XOR high/low halves.
        (self.0 as u64) ^ ((self.0 >> 64) as u64)
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.short())
    }
}

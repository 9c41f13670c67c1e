use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A named identity slot. Cheap to clone; compared by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Persona(Arc<str>);

impl Persona {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Persona {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

pub const MATHEMATICIANS: [&str; 5] = ["Turing", "Neumann", "Gauss", "Euler", "Pascal"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Five human slots, no automated participants.
    Classic,
    /// Three human slots; the remaining two mathematicians are AI-driven.
    Ai,
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(Mode::Classic),
            "ai" => Ok(Mode::Ai),
            other => Err(format!("unknown mode {other:?} (want classic|ai)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    NoHumans,
    Duplicate(String),
    Blank,
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::NoHumans => write!(f, "catalog needs at least one human persona"),
            CatalogError::Duplicate(n) => write!(f, "persona listed twice: {n}"),
            CatalogError::Blank => write!(f, "persona names must not be blank"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Master list of personas, in canonical order. The human subset is handed out
/// to connections; the AI subset is always present and never allocated.
#[derive(Debug, Clone)]
pub struct Catalog {
    human: Vec<Persona>,
    ai: Vec<Persona>,
}

impl Catalog {
    pub fn new(human: &[&str], ai: &[&str]) -> Result<Self, CatalogError> {
        if human.is_empty() {
            return Err(CatalogError::NoHumans);
        }
        let mut seen = std::collections::HashSet::new();
        for n in human.iter().chain(ai.iter()) {
            if n.trim().is_empty() {
                return Err(CatalogError::Blank);
            }
            if !seen.insert(*n) {
                return Err(CatalogError::Duplicate(n.to_string()));
            }
        }
        Ok(Self {
            human: human.iter().map(|n| Persona::new(n)).collect(),
            ai: ai.iter().map(|n| Persona::new(n)).collect(),
        })
    }

    pub fn for_mode(mode: Mode) -> Self {
        let (human, ai) = match mode {
            Mode::Classic => (&MATHEMATICIANS[..], &[][..]),
            Mode::Ai => MATHEMATICIANS.split_at(3),
        };
        Self {
            human: human.iter().map(|n| Persona::new(n)).collect(),
            ai: ai.iter().map(|n| Persona::new(n)).collect(),
        }
    }

    pub fn human(&self) -> &[Persona] {
        &self.human
    }

    pub fn ai(&self) -> &[Persona] {
        &self.ai
    }

    pub fn has_ai(&self) -> bool {
        !self.ai.is_empty()
    }

    /// Number of concurrent human occupants.
    pub fn capacity(&self) -> usize {
        self.human.len()
    }

    /// Canonical position of a human-assignable persona.
    pub fn human_index(&self, p: &Persona) -> Option<usize> {
        self.human.iter().position(|h| h == p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_split_the_mathematicians() {
        let c = Catalog::for_mode(Mode::Classic);
        assert_eq!(c.capacity(), 5);
        assert!(!c.has_ai());

        let a = Catalog::for_mode(Mode::Ai);
        let human = a.human().iter().map(|p| p.as_str()).collect::<Vec<_>>();
        let ai = a.ai().iter().map(|p| p.as_str()).collect::<Vec<_>>();
        assert_eq!(human, vec!["Turing", "Neumann", "Gauss"]);
        assert_eq!(ai, vec!["Euler", "Pascal"]);
        assert_eq!(a.human_index(&Persona::new("Gauss")), Some(2));
        assert_eq!(a.human_index(&Persona::new("Euler")), None);
    }

    #[test]
    fn rejects_bad_catalogs() {
        assert_eq!(Catalog::new(&[], &["X"]).unwrap_err(), CatalogError::NoHumans);
        assert_eq!(
            Catalog::new(&["A", "B"], &["A"]).unwrap_err(),
            CatalogError::Duplicate("A".to_string())
        );
        assert_eq!(Catalog::new(&["A", " "], &[]).unwrap_err(), CatalogError::Blank);
        assert!(Catalog::new(&["A", "B", "C"], &[]).is_ok());
    }

    #[test]
    fn parses_mode() {
        assert_eq!("AI".parse::<Mode>(), Ok(Mode::Ai));
        assert_eq!(" classic ".parse::<Mode>(), Ok(Mode::Classic));
        assert!("both".parse::<Mode>().is_err());
    }
}

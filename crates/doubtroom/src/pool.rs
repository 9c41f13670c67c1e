use std::sync::Arc;

use chatproto::persona::{Catalog, Persona};

/// Free human personas, always kept in catalog order.
#[derive(Debug)]
pub struct NamePool {
    catalog: Arc<Catalog>,
    available: Vec<Persona>,
}

impl NamePool {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let available = catalog.human().to_vec();
        Self { catalog, available }
    }

    /// Takes the lowest-index free persona.
    pub fn acquire(&mut self) -> Option<Persona> {
        if self.available.is_empty() {
            return None;
        }
        Some(self.available.remove(0))
    }

    /// Returns a persona to the pool and restores canonical order.
    ///
    /// Refuses (returns `false`) personas that are not human-assignable or are already free.
    pub fn release(&mut self, p: Persona) -> bool {
        if self.catalog.human_index(&p).is_none() || self.available.contains(&p) {
            return false;
        }
        self.available.push(p);
        let catalog = &self.catalog;
        self.available
            .sort_by_key(|x| catalog.human_index(x).unwrap_or(usize::MAX));
        true
    }

    pub fn available(&self) -> &[Persona] {
        &self.available
    }

    pub fn len(&self) -> usize {
        self.available.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> NamePool {
        NamePool::new(Arc::new(Catalog::new(&["A", "B", "C"], &["X"]).unwrap()))
    }

    fn names(ps: &[Persona]) -> Vec<&str> {
        ps.iter().map(|p| p.as_str()).collect()
    }

    #[test]
    fn acquires_in_catalog_order_until_empty() {
        let mut p = abc();
        assert_eq!(p.acquire().unwrap().as_str(), "A");
        assert_eq!(p.acquire().unwrap().as_str(), "B");
        assert_eq!(p.acquire().unwrap().as_str(), "C");
        assert!(p.acquire().is_none());
        assert!(p.is_empty());
        assert!(p.acquire().is_none());
    }

    #[test]
    fn release_order_never_affects_acquire_order() {
        let orders: [[&str; 3]; 6] = [
            ["A", "B", "C"],
            ["A", "C", "B"],
            ["B", "A", "C"],
            ["B", "C", "A"],
            ["C", "A", "B"],
            ["C", "B", "A"],
        ];
        for order in orders {
            let mut p = abc();
            while p.acquire().is_some() {}
            for n in order {
                assert!(p.release(Persona::new(n)));
            }
            assert_eq!(names(p.available()), vec!["A", "B", "C"], "release order {order:?}");
            let got = (0..3)
                .filter_map(|_| p.acquire())
                .map(|x| x.as_str().to_string())
                .collect::<Vec<_>>();
            assert_eq!(got, vec!["A", "B", "C"]);
        }
    }

    #[test]
    fn middle_release_is_reoffered_first() {
        let mut p = abc();
        let _a = p.acquire();
        let b = p.acquire().unwrap();
        assert!(p.release(b));
        assert_eq!(names(p.available()), vec!["B", "C"]);
        assert_eq!(p.acquire().unwrap().as_str(), "B");
    }

    #[test]
    fn refuses_duplicates_and_foreign_names() {
        let mut p = abc();
        assert!(!p.release(Persona::new("A")));
        assert!(!p.release(Persona::new("X")));
        assert!(!p.release(Persona::new("Z")));
        assert_eq!(p.len(), 3);
    }
}

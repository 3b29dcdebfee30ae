//! Regeneration edge tracking

/// Transition of the regeneration flag between two readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenEdge {
    Started,
    Ended,
}

/// Turns the per-poll regeneration flag into start/end edges
#[derive(Debug, Clone, Default)]
pub struct RegenEdgeTracker {
    was_regenerating: bool,
}

impl RegenEdgeTracker {
    /// Tracker that has not seen a regeneration yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one reading, returning the edge it crossed if any
    pub fn observe(&mut self, is_regenerating: bool) -> Option<RegenEdge> {
        let edge = match (self.was_regenerating, is_regenerating) {
            (false, true) => Some(RegenEdge::Started),
            (true, false) => Some(RegenEdge::Ended),
            _ => None,
        };
        self.was_regenerating = is_regenerating;
        edge
    }

    /// Flag from the last reading
    pub fn is_regenerating(&self) -> bool {
        self.was_regenerating
    }

    /// Forget the last reading; the next `true` is a fresh start
    pub fn reset(&mut self) {
        self.was_regenerating = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_fire_once() {
        let mut tracker = RegenEdgeTracker::new();
        let edges: Vec<_> = [false, false, true, true, false]
            .into_iter()
            .map(|flag| tracker.observe(flag))
            .collect();

        assert_eq!(
            edges,
            vec![None, None, Some(RegenEdge::Started), None, Some(RegenEdge::Ended)]
        );
    }

    #[test]
    fn test_reset_forgets_flag() {
        let mut tracker = RegenEdgeTracker::new();
        tracker.observe(true);
        tracker.reset();
        assert!(!tracker.is_regenerating());
        assert_eq!(tracker.observe(true), Some(RegenEdge::Started));
    }
}

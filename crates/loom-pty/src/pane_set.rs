use loom_proto::PaneId;

use crate::pane::Pane;

/// The ordered panes of a session together with the active index.
///
/// Pane ids come from a monotonically increasing allocator starting at 0 and
/// are never reused, even after the pane holding one is removed.
pub struct PaneSet {
    panes: Vec<Pane>,
    active: usize,
    next_id: PaneId,
}

impl PaneSet {
    pub fn new() -> Self {
        Self {
            panes: Vec::new(),
            active: 0,
            next_id: 0,
        }
    }

    /// The id the next pushed pane should carry.
    ///
    /// Peeking does not consume the id, so a failed spawn leaves no gap.
    pub fn next_id(&self) -> PaneId {
        self.next_id
    }

    /// Append a pane and make it active.
    pub fn push(&mut self, pane: Pane) -> usize {
        self.next_id = self.next_id.max(pane.id() + 1);
        self.panes.push(pane);
        self.active = self.panes.len() - 1;
        self.active
    }

    /// Remove a pane by id.
    ///
    /// Removing a pane before the active one keeps the same pane active;
    /// removing the active pane or one after it clamps the index into range.
    pub fn remove(&mut self, id: PaneId) -> Option<Pane> {
        let index = self.position(id)?;
        let pane = self.panes.remove(index);

        if index < self.active {
            self.active -= 1;
        } else if self.active >= self.panes.len() {
            self.active = self.panes.len().saturating_sub(1);
        }
        Some(pane)
    }

    /// Move the active index by `delta`, wrapping at both ends.
    pub fn switch(&mut self, delta: isize) -> Option<PaneId> {
        if self.panes.is_empty() {
            return None;
        }
        let len = self.panes.len() as isize;
        self.active = (self.active as isize + delta).rem_euclid(len) as usize;
        self.active_id()
    }

    pub fn active(&self) -> Option<&Pane> {
        self.panes.get(self.active)
    }

    pub fn active_id(&self) -> Option<PaneId> {
        self.active().map(Pane::id)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Pane ids in display order.
    pub fn ids(&self) -> Vec<PaneId> {
        self.panes.iter().map(Pane::id).collect()
    }

    pub fn get_mut(&mut self, id: PaneId) -> Option<&mut Pane> {
        self.panes.iter_mut().find(|pane| pane.id() == id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pane> {
        self.panes.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.panes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    /// Remove every pane, leaving the set empty. The id allocator keeps counting.
    pub fn drain(&mut self) -> Vec<Pane> {
        self.active = 0;
        self.panes.drain(..).collect()
    }

    fn position(&self, id: PaneId) -> Option<usize> {
        self.panes.iter().position(|pane| pane.id() == id)
    }
}

impl Default for PaneSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pane::DEFAULT_OUTPUT_QUEUE;
    use crate::pty::PaneCommand;
    use loom_proto::PaneSize;

    fn spawn_into(set: &mut PaneSet) -> PaneId {
        let id = set.next_id();
        let pane = Pane::spawn(
            id,
            &PaneCommand::shell("/bin/sh"),
            PaneSize::new(80, 23),
            DEFAULT_OUTPUT_QUEUE,
        )
        .unwrap();
        set.push(pane);
        id
    }

    fn set_of(n: usize) -> PaneSet {
        let mut set = PaneSet::new();
        for _ in 0..n {
            spawn_into(&mut set);
        }
        set
    }

    #[test]
    fn test_ids_start_at_zero_and_increment() {
        let set = set_of(3);
        assert_eq!(set.ids(), vec![0, 1, 2]);
        assert_eq!(set.next_id(), 3);
    }

    #[test]
    fn test_push_activates_new_pane() {
        let mut set = set_of(2);
        assert_eq!(set.active_index(), 1);
        assert_eq!(set.active_id(), Some(1));

        let id = spawn_into(&mut set);
        assert_eq!(set.active_index(), 2);
        assert_eq!(set.active_id(), Some(id));
    }

    #[test]
    fn test_next_id_peek_does_not_consume() {
        let set = PaneSet::new();
        assert_eq!(set.next_id(), 0);
        assert_eq!(set.next_id(), 0);
    }

    #[test]
    fn test_switch_wraps_both_ways() {
        let mut set = set_of(3);
        assert_eq!(set.active_index(), 2);
        assert_eq!(set.switch(1), Some(0));
        assert_eq!(set.active_index(), 0);
        assert_eq!(set.switch(-1), Some(2));
        assert_eq!(set.active_index(), 2);
    }

    #[test]
    fn test_switch_on_empty_set() {
        let mut set = PaneSet::new();
        assert_eq!(set.switch(1), None);
        assert!(set.active().is_none());
    }

    #[test]
    fn test_remove_before_active_keeps_active_pane() {
        let mut set = set_of(3);
        assert_eq!(set.active_id(), Some(2));
        assert!(set.remove(0).is_some());
        assert_eq!(set.active_id(), Some(2));
        assert_eq!(set.active_index(), 1);
    }

    #[test]
    fn test_remove_active_last_clamps() {
        let mut set = set_of(3);
        assert!(set.remove(2).is_some());
        assert_eq!(set.active_index(), 1);
        assert_eq!(set.active_id(), Some(1));
    }

    #[test]
    fn test_remove_active_middle_selects_next() {
        let mut set = set_of(3);
        set.switch(-1);
        assert_eq!(set.active_id(), Some(1));
        assert!(set.remove(1).is_some());
        assert_eq!(set.active_id(), Some(2));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut set = set_of(1);
        assert!(set.remove(42).is_none());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut set = set_of(2);
        set.remove(1);
        let id = spawn_into(&mut set);
        assert_eq!(id, 2);
        assert_eq!(set.ids(), vec![0, 2]);
    }

    #[test]
    fn test_drain_empties_set() {
        let mut set = set_of(2);
        let panes = set.drain();
        assert_eq!(panes.len(), 2);
        assert!(set.is_empty());
        assert_eq!(set.active_index(), 0);
        assert_eq!(set.next_id(), 2);
    }

    #[test]
    fn test_get_mut() {
        let mut set = set_of(2);
        assert!(set.get_mut(1).is_some());
        assert!(set.get_mut(5).is_none());
        assert_eq!(set.iter_mut().count(), 2);
    }
}

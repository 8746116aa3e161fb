//! Generation-tagged hold lists.

use std::collections::VecDeque;

use crate::types::Generation;

/// Queues retired items until no reader can still observe them.
///
/// Items move through two stages. [`hold`](Self::hold) puts an item on the
/// pending list. [`transfer_hold_lists`](Self::transfer_hold_lists) tags every
/// pending item with the generation that was current when it was retired.
/// [`trim_hold_lists`](Self::trim_hold_lists) then hands every item whose tag
/// is older than the oldest used generation to a free function.
///
/// # Example
///
/// ```
/// use interna_common::memory::GenerationHolder;
/// use interna_common::Generation;
///
/// let mut holder = GenerationHolder::new();
/// holder.hold("old buffer");
/// holder.transfer_hold_lists(Generation::new(4));
///
/// let mut freed = Vec::new();
/// holder.trim_hold_lists(Generation::new(4), |item| freed.push(item));
/// assert!(freed.is_empty());
/// holder.trim_hold_lists(Generation::new(5), |item| freed.push(item));
/// assert_eq!(freed, ["old buffer"]);
/// ```
#[derive(Debug)]
pub struct GenerationHolder<T> {
    pending: Vec<T>,
    held: VecDeque<(Generation, T)>,
}

impl<T> GenerationHolder<T> {
    /// Creates an empty holder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            held: VecDeque::new(),
        }
    }

    /// Queues an item that was just retired.
    pub fn hold(&mut self, item: T) {
        self.pending.push(item);
    }

    /// Tags all pending items with `generation`.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `generation` is older than a tag already given out.
    pub fn transfer_hold_lists(&mut self, generation: Generation) {
        if self.pending.is_empty() {
            return;
        }
        debug_assert!(
            self.held.back().is_none_or(|(last, _)| *last <= generation),
            "hold list generations must not go backwards"
        );
        self.held
            .extend(self.pending.drain(..).map(|item| (generation, item)));
    }

    /// Frees every tagged item older than `first_used` and returns how many
    /// were freed.
    pub fn trim_hold_lists(&mut self, first_used: Generation, mut free: impl FnMut(T)) -> usize {
        let mut freed = 0;
        while self
            .held
            .front()
            .is_some_and(|(generation, _)| *generation < first_used)
        {
            if let Some((_, item)) = self.held.pop_front() {
                free(item);
                freed += 1;
            }
        }
        freed
    }

    /// Frees everything, pending and tagged, regardless of generation.
    ///
    /// Only valid when no reader can be active, e.g. on teardown or reset.
    pub fn clear(&mut self, mut free: impl FnMut(T)) {
        for (_, item) in self.held.drain(..) {
            free(item);
        }
        for item in self.pending.drain(..) {
            free(item);
        }
    }

    /// Returns the number of items not yet tagged.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns the number of tagged items waiting for a trim.
    #[must_use]
    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    /// Returns `true` if nothing is pending or held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.held.is_empty()
    }

    /// Iterates over every item still owned by the holder.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.held.iter().map(|(_, item)| item).chain(self.pending.iter())
    }
}

impl<T> Default for GenerationHolder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_items_are_not_trimmed() {
        let mut holder = GenerationHolder::new();
        holder.hold(1);
        holder.hold(2);
        let freed = holder.trim_hold_lists(Generation::new(100), |_| {});
        assert_eq!(freed, 0);
        assert_eq!(holder.pending_len(), 2);
    }

    #[test]
    fn test_trim_frees_older_generations_in_order() {
        let mut holder = GenerationHolder::new();
        holder.hold(10);
        holder.transfer_hold_lists(Generation::new(1));
        holder.hold(20);
        holder.hold(21);
        holder.transfer_hold_lists(Generation::new(2));
        holder.hold(30);
        holder.transfer_hold_lists(Generation::new(3));
        assert_eq!(holder.held_len(), 4);

        let mut freed = Vec::new();
        assert_eq!(holder.trim_hold_lists(Generation::new(1), |i| freed.push(i)), 0);
        assert_eq!(holder.trim_hold_lists(Generation::new(3), |i| freed.push(i)), 3);
        assert_eq!(freed, vec![10, 20, 21]);
        assert_eq!(holder.held_len(), 1);
    }

    #[test]
    fn test_clear_frees_everything() {
        let mut holder = GenerationHolder::new();
        holder.hold("a");
        holder.transfer_hold_lists(Generation::new(7));
        holder.hold("b");

        let mut freed = Vec::new();
        holder.clear(|item| freed.push(item));
        assert_eq!(freed, vec!["a", "b"]);
        assert!(holder.is_empty());
    }

    #[test]
    fn test_iter_covers_pending_and_held() {
        let mut holder = GenerationHolder::new();
        holder.hold(1);
        holder.transfer_hold_lists(Generation::new(0));
        holder.hold(2);
        let items: Vec<_> = holder.iter().copied().collect();
        assert_eq!(items, vec![1, 2]);
    }
}

//! Generation tracking for single-writer, many-reader structures.
//!
//! This is how interna decides when retired memory can be given back. The
//! writer bumps the generation after publishing a change; each reader takes a
//! [`GenerationGuard`] for the span of its operation. Anything the writer
//! retired while generation `g` was current stays readable until the oldest
//! live guard has moved past `g`.
//!
//! Taking a guard never blocks on the writer: it clones the current hold
//! through an [`ArcSwap`] and bumps an atomic counter. The writer only takes
//! its own, uncontended lock when it scans retired holds.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::types::Generation;

/// Low bit of the hold state: set once the writer has retired the hold for good.
const INVALIDATED: u64 = 1;

/// Each guard adds this to the hold state, keeping the low bit free.
const GUARD_UNIT: u64 = 2;

/// Guard counter for one generation.
struct GenerationHold {
    generation: Generation,
    state: AtomicU64,
}

impl GenerationHold {
    fn new(generation: Generation) -> Self {
        Self {
            generation,
            state: AtomicU64::new(0),
        }
    }

    /// Registers a guard. Fails if the writer invalidated this hold first.
    fn try_acquire(&self) -> bool {
        let prev = self.state.fetch_add(GUARD_UNIT, Ordering::AcqRel);
        if prev & INVALIDATED != 0 {
            self.state.fetch_sub(GUARD_UNIT, Ordering::AcqRel);
            return false;
        }
        true
    }

    fn release(&self) {
        let prev = self.state.fetch_sub(GUARD_UNIT, Ordering::AcqRel);
        debug_assert!(prev >= GUARD_UNIT, "guard released twice");
    }

    /// Marks the hold as retired, but only if no guard references it.
    fn try_invalidate(&self) -> bool {
        self.state
            .compare_exchange(0, INVALIDATED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn guards(&self) -> u64 {
        let state = self.state.load(Ordering::Acquire);
        if state & INVALIDATED != 0 {
            0
        } else {
            state / GUARD_UNIT
        }
    }
}

/// A reader's lease on a generation.
///
/// While a guard is alive, nothing retired at or after its generation is
/// reclaimed. Cloning a guard adds another lease on the same generation.
pub struct GenerationGuard {
    hold: Arc<GenerationHold>,
}

impl GenerationGuard {
    /// Returns the generation this guard pins.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.hold.generation
    }
}

impl Clone for GenerationGuard {
    fn clone(&self) -> Self {
        // A live guard keeps the hold from being invalidated.
        self.hold.state.fetch_add(GUARD_UNIT, Ordering::AcqRel);
        Self {
            hold: Arc::clone(&self.hold),
        }
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.hold.release();
    }
}

impl fmt::Debug for GenerationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationGuard")
            .field("generation", &self.hold.generation)
            .finish()
    }
}

/// Tracks the current generation and the guards readers hold on older ones.
///
/// `take_guard`, `current_generation` and `guard_count` are safe to call from
/// any thread. `increment_generation` belongs to the single writer.
///
/// # Example
///
/// ```
/// use interna_common::memory::GenerationHandler;
/// use interna_common::Generation;
///
/// let handler = GenerationHandler::new();
/// let guard = handler.take_guard();
/// handler.increment_generation();
///
/// // The reader still pins generation 0.
/// assert_eq!(handler.oldest_used_generation(), Generation::new(0));
/// drop(guard);
/// assert_eq!(handler.oldest_used_generation(), Generation::new(1));
/// ```
pub struct GenerationHandler {
    /// Hold for the current generation, handed to new guards.
    current: ArcSwap<GenerationHold>,
    /// Retired holds that still had guards when the writer moved on, oldest first.
    retired: Mutex<VecDeque<Arc<GenerationHold>>>,
    /// Current generation.
    generation: AtomicU64,
    /// Cached result of the last retired-hold scan.
    oldest_used: AtomicU64,
}

impl GenerationHandler {
    /// Creates a handler at [`Generation::INITIAL`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(GenerationHold::new(Generation::INITIAL)),
            retired: Mutex::new(VecDeque::new()),
            generation: AtomicU64::new(Generation::INITIAL.as_u64()),
            oldest_used: AtomicU64::new(Generation::INITIAL.as_u64()),
        }
    }

    /// Takes a guard on the current generation.
    pub fn take_guard(&self) -> GenerationGuard {
        loop {
            let hold = self.current.load_full();
            if hold.try_acquire() {
                return GenerationGuard { hold };
            }
            // The writer retired this hold between our load and acquire.
            std::hint::spin_loop();
        }
    }

    /// Returns the current generation.
    #[inline]
    #[must_use]
    pub fn current_generation(&self) -> Generation {
        Generation::new(self.generation.load(Ordering::Acquire))
    }

    /// Moves to the next generation and returns it.
    ///
    /// Call this from the writer after publishing a change that future readers
    /// should observe.
    pub fn increment_generation(&self) -> Generation {
        let next = self.current_generation().next();
        let previous = self.current.swap(Arc::new(GenerationHold::new(next)));
        self.generation.store(next.as_u64(), Ordering::Release);
        if !previous.try_invalidate() {
            self.retired.lock().push_back(previous);
        }
        self.update_oldest_used_generation();
        next
    }

    /// Rescans retired holds and returns the oldest generation still in use.
    ///
    /// Equals the current generation when no reader pins an older one.
    pub fn oldest_used_generation(&self) -> Generation {
        self.update_oldest_used_generation();
        Generation::new(self.oldest_used.load(Ordering::Acquire))
    }

    fn update_oldest_used_generation(&self) {
        let mut retired = self.retired.lock();
        while let Some(front) = retired.front() {
            if !front.try_invalidate() {
                break;
            }
            retired.pop_front();
        }
        let oldest = retired
            .front()
            .map_or_else(|| self.current_generation(), |hold| hold.generation);
        self.oldest_used.store(oldest.as_u64(), Ordering::Release);
    }

    /// Returns the number of live guards across all generations.
    #[must_use]
    pub fn guard_count(&self) -> u64 {
        let retired: u64 = self.retired.lock().iter().map(|hold| hold.guards()).sum();
        retired + self.current.load().guards()
    }

    /// Returns the number of live guards on a specific generation.
    #[must_use]
    pub fn guard_count_at(&self, generation: Generation) -> u64 {
        let current = self.current.load();
        if current.generation == generation {
            return current.guards();
        }
        self.retired
            .lock()
            .iter()
            .filter(|hold| hold.generation == generation)
            .map(|hold| hold.guards())
            .sum()
    }

    /// Returns `true` if any reader holds a guard.
    #[must_use]
    pub fn has_readers(&self) -> bool {
        self.guard_count() > 0
    }
}

impl Default for GenerationHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GenerationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationHandler")
            .field("current", &self.current_generation())
            .field("oldest_used", &self.oldest_used.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let handler = GenerationHandler::new();
        assert_eq!(handler.current_generation(), Generation::INITIAL);
        assert_eq!(handler.oldest_used_generation(), Generation::INITIAL);
        assert!(!handler.has_readers());
    }

    #[test]
    fn test_guard_pins_generation() {
        let handler = GenerationHandler::new();
        let guard = handler.take_guard();
        assert_eq!(guard.generation(), Generation::new(0));

        handler.increment_generation();
        handler.increment_generation();
        assert_eq!(handler.current_generation(), Generation::new(2));
        assert_eq!(handler.oldest_used_generation(), Generation::new(0));

        drop(guard);
        assert_eq!(handler.oldest_used_generation(), Generation::new(2));
    }

    #[test]
    fn test_oldest_is_minimum_over_guards() {
        let handler = GenerationHandler::new();
        handler.increment_generation();
        let g1 = handler.take_guard();
        handler.increment_generation();
        let g2 = handler.take_guard();
        handler.increment_generation();

        assert_eq!(g1.generation(), Generation::new(1));
        assert_eq!(g2.generation(), Generation::new(2));
        assert_eq!(handler.oldest_used_generation(), Generation::new(1));

        // Releasing the newer guard first does not move the bound.
        drop(g2);
        assert_eq!(handler.oldest_used_generation(), Generation::new(1));
        drop(g1);
        assert_eq!(handler.oldest_used_generation(), Generation::new(3));
    }

    #[test]
    fn test_guard_counts() {
        let handler = GenerationHandler::new();
        let a = handler.take_guard();
        let b = a.clone();
        assert_eq!(handler.guard_count(), 2);
        assert_eq!(handler.guard_count_at(Generation::new(0)), 2);

        handler.increment_generation();
        let c = handler.take_guard();
        assert_eq!(handler.guard_count(), 3);
        assert_eq!(handler.guard_count_at(Generation::new(1)), 1);

        drop(a);
        drop(b);
        drop(c);
        assert!(!handler.has_readers());
    }

    #[test]
    fn test_unused_generations_are_not_retained() {
        let handler = GenerationHandler::new();
        for _ in 0..100 {
            handler.increment_generation();
        }
        assert!(handler.retired.lock().is_empty());
        assert_eq!(handler.oldest_used_generation(), Generation::new(100));
    }

    #[test]
    #[cfg(not(miri))]
    fn test_concurrent_guards() {
        let handler = Arc::new(GenerationHandler::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let handler = Arc::clone(&handler);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    let guard = handler.take_guard();
                    assert!(guard.generation() <= handler.current_generation());
                }
            }));
        }
        for _ in 0..1000 {
            handler.increment_generation();
            let oldest = handler.oldest_used_generation();
            assert!(oldest <= handler.current_generation());
        }
        for handle in handles {
            handle.join().expect("Thread panicked");
        }
        assert_eq!(handler.guard_count(), 0);
        assert_eq!(
            handler.oldest_used_generation(),
            handler.current_generation()
        );
    }
}

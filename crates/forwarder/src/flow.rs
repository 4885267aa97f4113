//! Bounded token pool gating how many messages may be in flight between
//! fetch and upload completion.
//!
//! The controller is owned and mutated only by the pipeline task, so it is a
//! plain struct with no interior locking. Backpressure blocking happens in
//! the pipeline itself: when no tokens are available it parks on the upload
//! outcome channel (bounded by the poll-sleep interval) instead of spinning
//! on the count.

/// Token pool with count bounded in `[0, capacity]`.
#[derive(Debug)]
pub struct FlowController {
    capacity: usize,
    available: usize,
}

impl FlowController {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.available
    }

    /// Tokens reserved but not yet released; equals the number of dispatched
    /// messages still awaiting an upload outcome.
    pub fn outstanding(&self) -> usize {
        self.capacity - self.available
    }

    /// Reserve up to `n` tokens. Grants fewer (possibly zero) when capacity
    /// is short; never blocks.
    pub fn try_reserve(&mut self, n: usize) -> usize {
        let granted = n.min(self.available);
        self.available -= granted;
        granted
    }

    /// Return `n` tokens. The count is clamped so it never exceeds the
    /// original capacity.
    pub fn release(&mut self, n: usize) {
        debug_assert!(n <= self.outstanding(), "released more tokens than reserved");
        self.available = (self.available + n).min(self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_are_bounded_by_availability() {
        let mut flow = FlowController::new(10);
        assert_eq!(flow.try_reserve(4), 4);
        assert_eq!(flow.try_reserve(10), 6);
        assert_eq!(flow.try_reserve(1), 0);
        assert_eq!(flow.available(), 0);
        assert_eq!(flow.outstanding(), 10);
    }

    #[test]
    fn release_restores_capacity() {
        let mut flow = FlowController::new(10);
        flow.try_reserve(10);
        flow.release(3);
        assert_eq!(flow.available(), 3);
        flow.release(7);
        assert_eq!(flow.available(), 10);
        assert_eq!(flow.outstanding(), 0);
    }

    #[test]
    fn release_never_exceeds_capacity() {
        let mut flow = FlowController::new(5);
        flow.try_reserve(2);
        flow.release(2);
        flow.release(0);
        assert_eq!(flow.available(), 5);
    }

    #[test]
    fn outstanding_never_exceeds_capacity_across_sequences() {
        let mut flow = FlowController::new(8);
        for _ in 0..100 {
            let granted = flow.try_reserve(3);
            assert!(flow.outstanding() <= flow.capacity());
            flow.release(granted);
            assert!(flow.available() <= flow.capacity());
        }
        assert_eq!(flow.available(), 8);
    }

    // Capacity 100, batch 50: one fetch cycle leaves 50; once all 50
    // outcomes return, a new cycle may reserve another 50.
    #[test]
    fn fetch_cycle_token_accounting() {
        let mut flow = FlowController::new(100);
        assert_eq!(flow.try_reserve(50), 50);
        assert_eq!(flow.available(), 50);

        for _ in 0..50 {
            flow.release(1);
        }
        assert_eq!(flow.available(), 100);
        assert_eq!(flow.try_reserve(50), 50);
    }
}

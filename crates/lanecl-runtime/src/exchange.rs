use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Slots through which the lanes of one launch combine a value every round.
///
/// Each lane publishes its local value, waits for every other lane, then folds all slots in lane
/// order. Every lane therefore observes the same result, whatever the thread scheduling.
///
/// A lane that panics while holding an [`ExchangeGuard`] aborts the exchange: lanes waiting in
/// [`all_reduce`](Self::all_reduce), or reaching it later, panic instead of waiting forever.
#[derive(Debug)]
pub struct LaneExchange<T> {
    slots: Vec<spin::Mutex<Option<T>>>,
    published: Rendezvous,
    consumed: Rendezvous,
}

impl<T: Copy> LaneExchange<T> {
    pub fn new(lanes: usize) -> Self {
        Self {
            slots: (0..lanes).map(|_| spin::Mutex::new(None)).collect(),
            published: Rendezvous::new(lanes),
            consumed: Rendezvous::new(lanes),
        }
    }

    pub fn lanes(&self) -> usize {
        self.slots.len()
    }

    /// Publishes `value` for `lane_id` and returns the fold of every lane's value.
    ///
    /// Must be called by every lane, the same number of times.
    ///
    /// # Panics
    /// If the exchange was aborted by a panicking lane.
    pub fn all_reduce<F: Fn(T, T) -> T>(&self, lane_id: usize, value: T, combine: F) -> T {
        *self.slots[lane_id].lock() = Some(value);
        self.published.wait();

        let mut result = None;
        for slot in self.slots.iter() {
            let Some(value) = *slot.lock() else {
                unreachable!("Every lane publishes before the barrier is released");
            };
            result = Some(match result {
                None => value,
                Some(acc) => combine(acc, value),
            });
        }

        self.consumed.wait();
        result.unwrap_or(value)
    }

    /// Releases every lane blocked on the exchange. Later rounds panic.
    pub fn abort(&self) {
        self.published.abort();
        self.consumed.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.published.is_aborted()
    }

    /// Aborts the exchange if the current lane unwinds before the guard is dropped.
    pub fn guard(&self) -> ExchangeGuard<'_, T> {
        ExchangeGuard { exchange: self }
    }
}

/// Held by a lane for the duration of its run, see [`LaneExchange::guard`].
#[must_use = "The exchange is only aborted while the guard is alive"]
pub struct ExchangeGuard<'a, T: Copy> {
    exchange: &'a LaneExchange<T>,
}

impl<T: Copy> Drop for ExchangeGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::warn!("A lane panicked, aborting its exchange");
            self.exchange.abort();
        }
    }
}

/// Reusable barrier that can be aborted.
#[derive(Debug)]
struct Rendezvous {
    lanes: usize,
    state: Mutex<RendezvousState>,
    changed: Condvar,
}

#[derive(Debug, Default)]
struct RendezvousState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

impl Rendezvous {
    fn new(lanes: usize) -> Self {
        Self {
            lanes,
            state: Mutex::new(RendezvousState::default()),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RendezvousState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self) {
        let mut state = self.lock();
        assert!(!state.aborted, "Lane exchange aborted by a panicking lane");

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.lanes {
            state.arrived = 0;
            state.generation += 1;
            self.changed.notify_all();
            return;
        }

        while state.generation == generation && !state.aborted {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        assert!(
            state.generation != generation,
            "Lane exchange aborted by a panicking lane"
        );
    }

    fn abort(&self) {
        self.lock().aborted = true;
        self.changed.notify_all();
    }

    fn is_aborted(&self) -> bool {
        self.lock().aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_lane_sees_the_same_fold() {
        let exchange = LaneExchange::<(u32, usize)>::new(4);
        let results = spin::Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for lane in 0..4 {
                let exchange = &exchange;
                let results = &results;
                scope.spawn(move || {
                    for round in 0..3u32 {
                        let local = ((lane as u32 + round) % 4, lane);
                        let best = exchange.all_reduce(lane, local, |a, b| {
                            if b.0 > a.0 { b } else { a }
                        });
                        results.lock().push((round, best));
                    }
                });
            }
        });

        let results = results.into_inner();
        for round in 0..3 {
            let seen: Vec<_> = results
                .iter()
                .filter(|(r, _)| *r == round)
                .map(|(_, best)| *best)
                .collect();
            assert_eq!(seen.len(), 4);
            assert!(seen.iter().all(|best| *best == (3, (3 - round) as usize % 4)));
        }
    }

    #[test]
    fn a_panicking_lane_releases_the_others() {
        let exchange = LaneExchange::<u32>::new(3);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            std::thread::scope(|scope| {
                for lane in 0..3 {
                    let exchange = &exchange;
                    scope.spawn(move || {
                        let _guard = exchange.guard();
                        if lane == 2 {
                            panic!("lane fault");
                        }
                        exchange.all_reduce(lane, lane as u32, u32::max)
                    });
                }
            })
        }));

        assert!(outcome.is_err());
        assert!(exchange.is_aborted());
    }
}

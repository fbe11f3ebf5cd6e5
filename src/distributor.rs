//! Stage 2's distributor: hands out bins to hasher threads largest-first,
//! so the thread pool finishes close to together instead of one thread
//! grinding through the single biggest bin alone while its siblings sit
//! idle — the same principle the bin writer applies to flush order and
//! the memory planner applies to queue sizing.

use std::sync::{Condvar, Mutex};

use crate::bin_stat::BinStatTable;

struct State {
    order: Vec<u32>, // remaining bin ids, largest stat first
    next: usize,
    in_flight: u32,
}

/// Shared largest-bins-first work queue. Every hasher thread calls
/// [`Distributor::claim`] in a loop until it returns `None`.
pub struct Distributor {
    state: Mutex<State>,
    done: Condvar,
}

impl Distributor {
    pub fn new(stats: &BinStatTable) -> Self {
        let mut order: Vec<u32> = stats.stats.iter().map(|s| s.bin).collect();
        order.sort_by_key(|&bin| std::cmp::Reverse(stats.get(bin).bytes_written));
        Self {
            state: Mutex::new(State {
                order,
                next: 0,
                in_flight: 0,
            }),
            done: Condvar::new(),
        }
    }

    /// Claims the next largest unassigned bin, or `None` once every bin
    /// has been claimed (note: claimed, not necessarily finished).
    pub fn claim(&self) -> Option<u32> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let bin = state.order.get(state.next).copied();
        if bin.is_some() {
            state.next += 1;
            state.in_flight += 1;
        }
        bin
    }

    /// Marks a claimed bin as finished. Wakes anyone waiting in
    /// [`Self::wait_until_all_finished`].
    pub fn finish(&self, _bin: u32) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight -= 1;
        if state.in_flight == 0 && state.next >= state.order.len() {
            self.done.notify_all();
        }
    }

    pub fn wait_until_all_finished(&self) {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let _unused = self
            .done
            .wait_while(guard, |s| s.in_flight > 0 || s.next < s.order.len())
            .unwrap_or_else(|e| e.into_inner());
    }

    pub fn total_bins(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bin_stat::BinStat;

    #[test]
    fn claims_largest_bin_first() {
        let mut table = BinStatTable::new(3);
        table.set(BinStat::new(0, 10, 0, 0));
        table.set(BinStat::new(1, 1000, 0, 0));
        table.set(BinStat::new(2, 100, 0, 0));
        let distributor = Distributor::new(&table);
        assert_eq!(distributor.claim(), Some(1));
        assert_eq!(distributor.claim(), Some(2));
        assert_eq!(distributor.claim(), Some(0));
        assert_eq!(distributor.claim(), None);
    }

    #[test]
    fn finish_tracks_in_flight_count() {
        let mut table = BinStatTable::new(1);
        table.set(BinStat::new(0, 5, 0, 0));
        let distributor = Distributor::new(&table);
        let bin = distributor.claim().unwrap();
        distributor.finish(bin);
        distributor.wait_until_all_finished(); // must not deadlock
    }
}

//! Reader / loader / editor coordination for the read-only cache
//!
//! All counters live in one `GateState` behind a single mutex, with one
//! condition variable broadcast on every release. Transitions:
//!
//! ```text
//! read_begin   wait !editors            readers++
//! read_end     readers--                broadcast
//! load_begin   readers--   wait !editors && nobody else loads key
//!                                       loaders++, slot[tid] = key
//! load_end     loaders--, readers++, slot[tid] = none      (atomic)
//! load_fail    loaders--, readers++, slot[tid] = none, broadcast
//! edit_begin   loaders--, editors++
//!              wait readers == 0 && loaders == 0
//!                                       readers++, editors--
//! edit_end     readers--, slot[tid] = none, broadcast
//! ```
//!
//! An editor keeps its loading slot until `edit_end`, so the key it inserts
//! stays claimed until the entry is resident.
//!
//! A disabled gate (write modes, single-threaded by contract) is a no-op.

use std::sync::{Condvar, Mutex, MutexGuard};
use crate::index::EntryKey;

#[derive(Debug)]
struct GateState {
    readers: usize,
    loaders: usize,
    /// Threads that want to edit the LRU
    editors: usize,
    /// Key being loaded by each thread id
    loading: Vec<Option<EntryKey>>,
}

impl GateState {
    fn loaded_by_other(&self, tid: usize, key: EntryKey) -> bool {
        self.loading
            .iter()
            .enumerate()
            .any(|(other, slot)| other != tid && *slot == Some(key))
    }
}

#[derive(Debug)]
pub(crate) struct Gate {
    enabled: bool,
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Gate {
    pub fn new(nth: usize, enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(GateState {
                readers: 0,
                loaders: 0,
                editors: 0,
                loading: vec![None; nth],
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a, F>(&self, guard: MutexGuard<'a, GateState>, mut blocked: F) -> MutexGuard<'a, GateState>
    where
        F: FnMut(&GateState) -> bool,
    {
        self.cond
            .wait_while(guard, |state| blocked(state))
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Take a shared view of the LRU
    pub fn read_begin(&self) {
        if !self.enabled {
            return;
        }
        let guard = self.lock();
        let mut state = self.wait(guard, |s| s.editors > 0);
        state.readers += 1;
    }

    /// Release a shared view
    pub fn read_end(&self) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        state.readers -= 1;
        drop(state);
        self.cond.notify_all();
    }

    /// Upgrade a shared view to "loading `key`"
    pub fn load_begin(&self, tid: usize, key: EntryKey) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        state.readers -= 1;
        self.cond.notify_all();
        let mut state = self.wait(state, |s| s.editors > 0 || s.loaded_by_other(tid, key));
        state.loaders += 1;
        state.loading[tid] = Some(key);
    }

    /// Loading turned out unnecessary: back to a shared view
    pub fn load_end(&self, tid: usize) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        state.loaders -= 1;
        state.readers += 1;
        state.loading[tid] = None;
        drop(state);
        self.cond.notify_all();
    }

    /// Loading failed: back to a shared view, wake waiters on the same key
    pub fn load_fail(&self, tid: usize) {
        self.load_end(tid);
    }

    /// Upgrade a loader to the exclusive editor of the LRU
    pub fn edit_begin(&self, tid: usize) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        state.loaders -= 1;
        state.editors += 1;
        let mut state = self.wait(state, |s| s.readers > 0 || s.loaders > 0);
        state.readers += 1;
        state.editors -= 1;
    }

    /// Release the editor view and the loading slot
    pub fn edit_end(&self, tid: usize) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        state.readers -= 1;
        state.loading[tid] = None;
        drop(state);
        self.cond.notify_all();
    }

    #[cfg(test)]
    pub fn is_loading(&self, tid: usize) -> bool {
        self.lock().loading[tid].is_some()
    }

    #[cfg(test)]
    pub fn counters(&self) -> (usize, usize, usize) {
        let state = self.lock();
        (state.readers, state.loaders, state.editors)
    }
}

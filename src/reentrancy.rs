//! Debug-only guard against callbacks re-entering a container.
//!
//! Container operations call user code (`equal`, `hash`) while their storage
//! is mid-probe or mid-move. A callback that reaches back into the same
//! container at that point would observe a half-edited structure. In debug
//! builds the guard panics on such nesting and names both operations; in
//! release builds it is a zero-sized no-op.

use core::cell::Cell;
use core::marker::PhantomData;

#[cfg(all(test, debug_assertions))]
thread_local! {
    /// Guards alive on this thread.
    pub(crate) static LIVE_GUARDS: Cell<usize> = const { Cell::new(0) };
}

#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    active: Cell<Option<&'static str>>,
    // Containers are single-threaded.
    _nosend: PhantomData<*mut ()>,
}

impl DebugReentrancy {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            active: Cell::new(None),
            _nosend: PhantomData,
        }
    }

    /// Mark `op` as running until the returned guard drops.
    #[inline]
    pub fn enter(&self, op: &'static str) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            if let Some(outer) = self.active.get() {
                panic!("container re-entered: `{op}` called while `{outer}` is running");
            }
            self.active.set(Some(op));
            #[cfg(test)]
            LIVE_GUARDS.with(|n| n.set(n.get() + 1));
            ReentrancyGuard { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = op;
            ReentrancyGuard { _z: PhantomData }
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.owner.active.set(None);
            #[cfg(test)]
            LIVE_GUARDS.with(|n| n.set(n.get() - 1));
        }
    }
}

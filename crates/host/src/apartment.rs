//! Single-threaded apartment bookkeeping.
//!
//! Every hosted object, its site and the host wrapper live on one thread.
//! The thread enters the apartment once (the COM binding does so right after
//! `OleInitialize`) and hosts refuse to be constructed anywhere else.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static STA_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Marks the current thread as a single-threaded apartment while alive.
#[derive(Debug)]
pub struct StaGuard {
    // Not Send: the guard must be dropped on the thread that created it.
    _not_send: PhantomData<*const ()>,
}

pub fn enter_sta() -> StaGuard {
    STA_DEPTH.with(|depth| depth.set(depth.get() + 1));
    tracing::trace!("entered single-threaded apartment");
    StaGuard {
        _not_send: PhantomData,
    }
}

pub fn is_sta() -> bool {
    STA_DEPTH.with(|depth| depth.get() > 0)
}

impl Drop for StaGuard {
    fn drop(&mut self) {
        STA_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_scopes_apartment_membership() {
        assert!(!is_sta());
        {
            let _outer = enter_sta();
            assert!(is_sta());
            {
                let _inner = enter_sta();
                assert!(is_sta());
            }
            assert!(is_sta());
        }
        assert!(!is_sta());
    }

    #[test]
    fn other_threads_are_not_in_the_apartment() {
        let _guard = enter_sta();
        let elsewhere = std::thread::spawn(is_sta).join().expect("join");
        assert!(!elsewhere);
    }
}

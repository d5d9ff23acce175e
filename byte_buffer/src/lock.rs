use crate::utils::WAIT_SLICE;
use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// Wake-up primitive for blocking reads: writers bump a sequence number and notify, and
/// waiters re-evaluate their condition every time the number changes.
///
/// Waiters read the sequence number *before* evaluating their condition, and writers bump it
/// only *after* they're done with the data, so a change that lands between the check and the
/// sleep still shows up as a new number. A waiter never sleeps longer than `WAIT_SLICE` in
/// one go.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    seq: Mutex<u64>,
    cond: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Signal::default()
    }

    pub(crate) fn notify(&self) {
        let mut seq = self.seq.lock();
        *seq = seq.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Block until `check` yields a value, or until `deadline` passes.
    pub(crate) fn wait_until<T, F>(&self, deadline: Option<Instant>, mut check: F) -> Option<T>
    where
        F: FnMut() -> Option<T>,
    {
        let mut wakes: usize = 0;

        loop {
            let seen = *self.seq.lock();
            if let Some(val) = check() {
                return Some(val);
            }

            let now = Instant::now();
            let mut until = now + WAIT_SLICE;

            if let Some(deadline) = deadline {
                if now >= deadline {
                    return None;
                }

                if deadline < until {
                    until = deadline;
                }
            }

            let mut seq = self.seq.lock();
            while *seq == seen {
                if self.cond.wait_until(&mut seq, until).timed_out() {
                    break;
                }
            }

            wakes += 1;
            tracing::trace!(wakes, "blocking read woke up");
        }
    }
}

// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct CancelState {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

/// A cancel handle is shared between a session and its worker threads. It's each worker's
/// responsibility to check it and exit once it's cancelled.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            state: Arc::new(CancelState {
                cancelled: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Returns true once the handle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }

    /// Blocks until the handle is cancelled.
    pub fn wait(&self) {
        let mut cancelled = self.state.cancelled.lock();
        while !*cancelled {
            self.state.condvar.wait(&mut cancelled);
        }
    }

    /// Blocks until the handle is cancelled or the timeout passes. Returns true if it was
    /// cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.state.cancelled.lock();
        if !*cancelled {
            self.state.condvar.wait_for(&mut cancelled, timeout);
        }
        *cancelled
    }

    /// Cancels everything waiting on this handle.
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        if !*cancelled {
            *cancelled = true;
            self.state.condvar.notify_all();
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        CancelHandle::new()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test_cancel_handle_cancelled() {
        let cancel_handle = CancelHandle::new();
        assert!(!cancel_handle.is_cancelled());

        let join = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || cancel_handle.wait())
        };

        cancel_handle.cancel();
        assert!(join.join().is_ok());
        assert!(cancel_handle.is_cancelled());
    }

    #[test]
    fn test_cancel_handle_timeout() {
        let cancel_handle = CancelHandle::new();
        assert!(!cancel_handle.wait_timeout(Duration::from_millis(5)));

        cancel_handle.cancel();
        assert!(cancel_handle.wait_timeout(Duration::from_secs(10)));
        // Cancelling twice is harmless.
        cancel_handle.cancel();
        assert!(cancel_handle.is_cancelled());
    }
}

// Copyright (c) 2021-2024 Espresso Systems (espressosys.com)
// This file is part of the HotShot repository.

// You should have received a copy of the MIT License
// along with the HotShot repository. If not, see <https://mit-license.org/>.

//! The deferred-dispatch boundary: holds inbound protocol RPCs at the
//! server until the owning membership service has been bound, then
//! releases them.
//!
//! The server may start accepting connections before the membership
//! service that processes them exists (bootstrap ordering). Rather than a
//! per-call busy-wait, every held call awaits a one-shot latch that is
//! signalled exactly once, by [`DeferredDispatcher::unblock`].

use tokio::sync::Semaphore;

/// A one-shot latch that holds inbound protocol calls until the membership
/// service is bound.
///
/// Implemented as a zero-permit [`Semaphore`]: [`hold`](Self::hold) awaits a
/// permit that will never be issued, so it only returns once the semaphore
/// is closed. [`unblock`](Self::unblock) closes the semaphore, which both
/// wakes every task currently waiting in `hold` and makes every future call
/// to `hold` return immediately — there is no window in which a call
/// arriving concurrently with `unblock` is missed.
pub struct DeferredDispatcher {
    gate: Semaphore,
}

impl Default for DeferredDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredDispatcher {
    /// Construct a dispatcher with no calls released yet.
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
        }
    }

    /// Suspend the calling task at the boundary until [`unblock`](Self::unblock)
    /// has been called. Returns immediately if the dispatcher is already
    /// unblocked.
    pub async fn hold(&self) {
        // The semaphore never hands out a permit; `acquire` only resolves
        // when the semaphore is closed, at which point it yields `Err` and
        // we fall through.
        match self.gate.acquire().await {
            Ok(permit) => {
                // Unreachable: no permits are ever added.
                permit.forget();
            }
            Err(_closed) => {}
        }
    }

    /// Release every previously held call and let all future calls pass
    /// through without delay. Idempotent: calling this more than once has
    /// no additional effect.
    pub fn unblock(&self) {
        self.gate.close();
    }

    /// Whether [`unblock`](Self::unblock) has been called.
    pub fn is_unblocked(&self) -> bool {
        self.gate.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn held_call_completes_only_after_unblock() {
        let dispatcher = Arc::new(DeferredDispatcher::new());
        let waiter = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher.hold().await;
            })
        };

        // Give the waiter a chance to block on the gate.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        dispatcher.unblock();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should complete promptly after unblock")
            .unwrap();
    }

    #[tokio::test]
    async fn call_after_unblock_does_not_suspend() {
        let dispatcher = DeferredDispatcher::new();
        dispatcher.unblock();
        timeout(Duration::from_millis(50), dispatcher.hold())
            .await
            .expect("hold() must not suspend once unblocked");
    }

    #[tokio::test]
    async fn unblock_is_idempotent() {
        let dispatcher = DeferredDispatcher::new();
        dispatcher.unblock();
        dispatcher.unblock();
        assert!(dispatcher.is_unblocked());
        timeout(Duration::from_millis(50), dispatcher.hold())
            .await
            .expect("hold() must not suspend after repeated unblock");
    }
}

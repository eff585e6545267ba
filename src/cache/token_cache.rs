use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::errors::BrokerResult;

type Outcome<T> = Option<BrokerResult<T>>;

/// Per-provider token cache with single-flight refresh.
///
/// At most one caller (the owner) runs the upstream refresh at a time. Callers
/// arriving while it runs subscribe to its outcome and receive the same token
/// or the same error. A successful refresh replaces the cached value; a failed
/// or abandoned one leaves it as it was.
#[derive(Debug)]
pub struct TokenCell<T> {
    slot: Mutex<Slot<T>>,
}

#[derive(Debug)]
struct Slot<T> {
    cached: Option<T>,
    in_flight: Option<watch::Receiver<Outcome<T>>>,
}

enum Role<T> {
    Owner(watch::Sender<Outcome<T>>),
    Waiter(watch::Receiver<Outcome<T>>),
}

/// Clears the in-flight marker if the owner's future is dropped mid-refresh.
struct FlightGuard<'a, T> {
    cell: &'a TokenCell<T>,
    armed: bool,
}

impl<T> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            debug!("token refresh abandoned before completion");
            self.cell.lock().in_flight = None;
        }
    }
}

impl<T> Default for TokenCell<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot {
                cached: None,
                in_flight: None,
            }),
        }
    }
}

impl<T> TokenCell<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> TokenCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cached value, fresh or not.
    pub fn peek(&self) -> Option<T> {
        self.lock().cached.clone()
    }

    /// Returns the cached value when `is_fresh` accepts it, otherwise joins or
    /// starts a refresh.
    pub async fn get_or_refresh<P, F, Fut>(&self, is_fresh: P, refresh: F) -> BrokerResult<T>
    where
        P: Fn(&T) -> bool,
        F: Fn() -> Fut,
        Fut: Future<Output = BrokerResult<T>>,
    {
        loop {
            let role = {
                let mut slot = self.lock();
                if let Some(cached) = slot.cached.as_ref().filter(|cached| is_fresh(cached)) {
                    return Ok(cached.clone());
                }
                match &slot.in_flight {
                    Some(receiver) => Role::Waiter(receiver.clone()),
                    None => {
                        let (sender, receiver) = watch::channel(None);
                        slot.in_flight = Some(receiver);
                        Role::Owner(sender)
                    }
                }
            };

            match role {
                Role::Owner(sender) => {
                    let mut guard = FlightGuard {
                        cell: self,
                        armed: true,
                    };
                    let outcome = refresh().await;
                    {
                        let mut slot = self.lock();
                        if let Ok(value) = &outcome {
                            slot.cached = Some(value.clone());
                        }
                        slot.in_flight = None;
                    }
                    guard.armed = false;
                    sender.send_replace(Some(outcome.clone()));
                    return outcome;
                }
                Role::Waiter(mut receiver) => {
                    // Err only means the owner is gone; the value check below decides.
                    let _ = receiver.changed().await;
                    let outcome = receiver.borrow().clone();
                    if let Some(outcome) = outcome {
                        return outcome;
                    }
                    debug!("token refresh owner went away, re-evaluating cache");
                }
            }
        }
    }
}

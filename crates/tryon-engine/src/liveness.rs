//! Guards around in-flight work.
//!
//! Network calls cannot be cancelled once issued. Instead every dispatch gets
//! a [`Ticket`]; when the work finishes, its result is applied only if the
//! ticket is still the newest one and its owner has not been torn down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct GenerationTickets {
    latest: Arc<AtomicU64>,
    torn_down: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
pub struct Ticket {
    id: u64,
    latest: Arc<AtomicU64>,
    torn_down: Arc<AtomicBool>,
}

impl GenerationTickets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a ticket and makes every earlier one stale.
    pub fn issue(&self) -> Ticket {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket {
            id,
            latest: Arc::clone(&self.latest),
            torn_down: Arc::clone(&self.torn_down),
        }
    }

    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    pub fn tear_down(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }
}

impl Ticket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        !self.torn_down.load(Ordering::SeqCst) && self.latest.load(Ordering::SeqCst) == self.id
    }
}

/// Holds the value on display. Writes through a stale ticket are dropped.
#[derive(Debug, Default)]
pub struct ResultSlot<T> {
    tickets: GenerationTickets,
    value: Option<T>,
}

impl<T> ResultSlot<T> {
    pub fn new() -> Self {
        Self {
            tickets: GenerationTickets::new(),
            value: None,
        }
    }

    pub fn begin(&self) -> Ticket {
        self.tickets.issue()
    }

    /// Returns whether the value was stored.
    pub fn apply(&mut self, ticket: &Ticket, value: T) -> bool {
        if !ticket.is_current() {
            return false;
        }
        self.value = Some(value);
        true
    }

    pub fn current(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    /// Clears the value; anything still running is now stale.
    pub fn reset(&mut self) {
        self.tickets.invalidate();
        self.value = None;
    }

    pub fn tear_down(&mut self) {
        self.tickets.tear_down();
        self.value = None;
    }
}

/// At most one submission of an action at a time.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self) -> Option<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(InFlightGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

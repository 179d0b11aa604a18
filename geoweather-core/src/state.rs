//! Loading / ready / failed presentation state.
//!
//! Each resolve takes a [`RequestTicket`] when it starts. A settled result is
//! applied only if its ticket is newer than the last one applied, so a slow
//! earlier request can never overwrite a faster later one.

use std::sync::Mutex;
use tokio::sync::watch;

use crate::{
    error::{ErrorKind, WeatherError},
    model::WeatherSnapshot,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PresentationState {
    #[default]
    Loading,
    Ready(WeatherSnapshot),
    Failed(ErrorKind),
}

impl PresentationState {
    pub fn snapshot(&self) -> Option<&WeatherSnapshot> {
        match self {
            PresentationState::Ready(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            PresentationState::Failed(kind) => Some(kind.user_message()),
            _ => None,
        }
    }
}

/// Sequence number handed out when a resolve starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTicket(u64);

#[derive(Debug, Default)]
struct Sequencing {
    issued: u64,
    applied: u64,
    closed: bool,
}

#[derive(Debug)]
pub struct PresentationMachine {
    seq: Mutex<Sequencing>,
    tx: watch::Sender<PresentationState>,
}

impl Default for PresentationMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationMachine {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PresentationState::Loading);
        Self {
            seq: Mutex::new(Sequencing::default()),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PresentationState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> PresentationState {
        self.tx.borrow().clone()
    }

    /// Issue a ticket for a resolve that is about to start. The visible state
    /// does not change.
    pub fn begin(&self) -> RequestTicket {
        let mut seq = self.lock();
        seq.issued += 1;
        RequestTicket(seq.issued)
    }

    /// Whether a ticket newer than the applied state is still outstanding.
    pub fn is_refreshing(&self) -> bool {
        let seq = self.lock();
        !seq.closed && seq.issued > seq.applied
    }

    /// Apply a settled resolve. Returns `false` when the result was discarded
    /// because a newer one already landed or the machine is closed.
    pub fn complete(&self, ticket: RequestTicket, result: Result<WeatherSnapshot, WeatherError>) -> bool {
        let next = match result {
            Ok(snapshot) => PresentationState::Ready(snapshot),
            Err(e) => {
                tracing::warn!(seq = ticket.0, error = %e, "weather resolve failed");
                PresentationState::Failed(e.kind())
            }
        };
        self.apply(ticket, next)
    }

    /// The location subscription failed. Supersedes every in-flight resolve.
    pub fn location_failed(&self, error: WeatherError) -> bool {
        let ticket = self.begin();
        tracing::warn!(seq = ticket.0, error = %error, "location subscription failed");
        self.apply(ticket, PresentationState::Failed(error.kind()))
    }

    /// Stop accepting results. Late completions are dropped.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn apply(&self, ticket: RequestTicket, next: PresentationState) -> bool {
        let mut seq = self.lock();
        if seq.closed {
            tracing::debug!(seq = ticket.0, "discarding result after teardown");
            return false;
        }
        if ticket.0 <= seq.applied {
            tracing::debug!(seq = ticket.0, applied = seq.applied, "discarding superseded result");
            return false;
        }
        seq.applied = ticket.0;

        tracing::info!(seq = ticket.0, state = state_name(&next), "presentation state changed");
        // Sent under the lock so observers see states in ticket order.
        self.tx.send_replace(next);
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sequencing> {
        self.seq.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn state_name(state: &PresentationState) -> &'static str {
    match state {
        PresentationState::Loading => "loading",
        PresentationState::Ready(_) => "ready",
        PresentationState::Failed(_) => "failed",
    }
}

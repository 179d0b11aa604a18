//! Live weather for a moving position: watcher → engine → presentation state.

use std::sync::Arc;
use tokio::sync::watch;

use crate::{
    engine::AcquisitionEngine,
    state::{PresentationMachine, PresentationState},
    watcher::{LocationWatcher, PositionSource, WatchHandle},
};

#[derive(Debug)]
pub struct WeatherSession {
    handle: WatchHandle,
    machine: Arc<PresentationMachine>,
}

impl WeatherSession {
    /// Subscribe to `source` and resolve weather for every position it reports.
    ///
    /// Resolves are not serialized; each one runs on its own task and only the
    /// newest settled one is shown. Must be called from within a tokio runtime.
    pub fn start<S: PositionSource>(engine: Arc<AcquisitionEngine>, source: S) -> Self {
        let machine = Arc::new(PresentationMachine::new());

        let update_machine = machine.clone();
        let error_machine = machine.clone();

        let handle = LocationWatcher::start(
            source,
            move |coordinate| {
                let ticket = update_machine.begin();
                let engine = engine.clone();
                let machine = update_machine.clone();
                tokio::spawn(async move {
                    let result = engine.resolve_weather(coordinate).await;
                    machine.complete(ticket, result);
                });
            },
            move |error| {
                error_machine.location_failed(error);
            },
        );

        Self { handle, machine }
    }

    pub fn subscribe(&self) -> watch::Receiver<PresentationState> {
        self.machine.subscribe()
    }

    pub fn current(&self) -> PresentationState {
        self.machine.current()
    }

    pub fn is_refreshing(&self) -> bool {
        self.machine.is_refreshing()
    }

    /// Whether the location subscription can still deliver positions.
    pub fn is_watching(&self) -> bool {
        self.handle.is_active()
    }

    /// Resolves once the location subscription has ended and no resolve is
    /// still waiting to be shown. Stays pending while positions keep arriving.
    pub async fn finished(&self) {
        self.handle.ended().await;

        // Subscribed before checking so a completion in between still wakes us.
        let mut rx = self.machine.subscribe();
        while self.machine.is_refreshing() && !self.machine.is_closed() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stop watching and ignore any resolve still in flight. Idempotent.
    pub fn stop(&mut self) {
        self.handle.stop();
        self.machine.close();
    }
}

impl Drop for WeatherSession {
    fn drop(&mut self) {
        self.stop();
    }
}

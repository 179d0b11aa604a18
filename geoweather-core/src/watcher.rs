//! Continuous position subscription.
//!
//! A [`PositionSource`] stands in for the host platform's location service. The
//! [`LocationWatcher`] drains it on a background task and forwards every fix to
//! the caller, with no debouncing or deduplication. The returned [`WatchHandle`]
//! owns the subscription: stopping or dropping it guarantees no further callbacks.

use async_trait::async_trait;
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicU64, Ordering},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{error::WeatherError, model::Coordinate};

/// One callback from the platform location service.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Fix(Coordinate),
    /// The user refused location access.
    Denied(String),
    /// The platform could not produce a position.
    Unavailable(String),
}

#[async_trait]
pub trait PositionSource: Send + 'static {
    /// Next event, or `None` once the source has nothing more to deliver.
    async fn next_event(&mut self) -> Option<PositionEvent>;
}

/// Receiving half of an in-process position feed.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<PositionEvent>,
}

/// Sending half of an in-process position feed.
#[derive(Debug, Clone)]
pub struct PositionSender {
    tx: mpsc::Sender<PositionEvent>,
}

impl PositionSender {
    /// Deliver an event. Returns `false` once the subscription is gone.
    pub async fn send(&self, event: PositionEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub async fn fix(&self, latitude: f64, longitude: f64) -> bool {
        self.send(PositionEvent::Fix(Coordinate::new(latitude, longitude))).await
    }
}

/// Create a connected sender/source pair with room for `buffer` undelivered events.
pub fn channel(buffer: usize) -> (PositionSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (PositionSender { tx }, ChannelSource { rx })
}

#[async_trait]
impl PositionSource for ChannelSource {
    async fn next_event(&mut self) -> Option<PositionEvent> {
        self.rx.recv().await
    }
}

/// Position feed read line by line from any async reader.
///
/// Accepted lines: `<lat>,<lon>`, `denied`, `unavailable`. Blank lines and lines
/// starting with `#` are ignored; anything else, including lines that are not
/// valid UTF-8, is logged and skipped. Only a failing reader ends the feed with
/// [`PositionEvent::Unavailable`].
#[derive(Debug)]
pub struct LineSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin + Send + 'static> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: Vec::new() }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> PositionSource for LineSource<R> {
    async fn next_event(&mut self) -> Option<PositionEvent> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    return Some(PositionEvent::Unavailable(format!("position input failed: {e}")));
                }
            }

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim_end_matches(['\n', '\r']),
                Err(e) => {
                    let lossy = String::from_utf8_lossy(&self.buf);
                    tracing::warn!(line = %lossy.trim_end(), "skipping position input: {e}");
                    continue;
                }
            };

            match parse_position_line(line) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => continue,
                Err(reason) => tracing::warn!(line = %line, "skipping position input: {reason}"),
            }
        }
    }
}

fn parse_position_line(line: &str) -> Result<Option<PositionEvent>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    match line.to_lowercase().as_str() {
        "denied" => return Ok(Some(PositionEvent::Denied("location permission denied".into()))),
        "unavailable" => {
            return Ok(Some(PositionEvent::Unavailable("location service unavailable".into())));
        }
        _ => {}
    }

    let (lat, lon) = line
        .split_once(',')
        .ok_or_else(|| "expected `<lat>,<lon>`".to_string())?;

    let latitude: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?;
    let longitude: f64 = lon.trim().parse().map_err(|e| format!("bad longitude: {e}"))?;

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err("coordinate out of range".to_string());
    }

    Ok(Some(PositionEvent::Fix(Coordinate::new(latitude, longitude))))
}

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(1);

pub struct LocationWatcher;

impl LocationWatcher {
    /// Subscribe to `source`.
    ///
    /// `on_update` runs for every fix in delivery order. `on_error` runs at most
    /// once, on the first denial or unavailability, after which delivery ends.
    /// Callbacks run on the watcher task; they must not block and must not
    /// stop the handle themselves.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S, U, E>(mut source: S, mut on_update: U, on_error: E) -> WatchHandle
    where
        S: PositionSource,
        U: FnMut(Coordinate) + Send + 'static,
        E: FnOnce(WeatherError) + Send + 'static,
    {
        let id = NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed);
        let gate = Arc::new(Mutex::new(true));
        let cancel = CancellationToken::new();
        let ended = CancellationToken::new();

        let task_gate = gate.clone();
        let task_cancel = cancel.clone();
        let task_ended = ended.clone();
        let mut on_error = Some(on_error);

        let task = tokio::spawn(async move {
            tracing::debug!(watch_id = id, "location watch started");
            loop {
                let event = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    event = source.next_event() => event,
                };

                let Some(event) = event else {
                    tracing::debug!(watch_id = id, "position source closed");
                    break;
                };

                // Held across the callback so `stop` cannot return mid-delivery.
                let mut open = lock(&task_gate);
                if !*open {
                    break;
                }

                match event {
                    PositionEvent::Fix(coordinate) => {
                        tracing::debug!(watch_id = id, %coordinate, "position update");
                        on_update(coordinate);
                    }
                    PositionEvent::Denied(reason) | PositionEvent::Unavailable(reason) => {
                        tracing::warn!(watch_id = id, reason = %reason, "location unavailable");
                        *open = false;
                        if let Some(on_error) = on_error.take() {
                            on_error(WeatherError::PermissionDenied(reason));
                        }
                        break;
                    }
                }
            }
            *lock(&task_gate) = false;
            task_ended.cancel();
            tracing::debug!(watch_id = id, "location watch ended");
        });

        WatchHandle {
            id,
            gate,
            cancel,
            ended,
            task: Some(task),
        }
    }

    /// Release `handle`'s subscription. Same as [`WatchHandle::stop`].
    pub fn stop(handle: &mut WatchHandle) {
        handle.stop();
    }
}

fn lock(gate: &Mutex<bool>) -> MutexGuard<'_, bool> {
    gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owner of a live subscription. Dropping it stops the subscription.
#[derive(Debug)]
pub struct WatchHandle {
    id: u64,
    gate: Arc<Mutex<bool>>,
    cancel: CancellationToken,
    ended: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Whether callbacks can still fire.
    pub fn is_active(&self) -> bool {
        *lock(&self.gate)
    }

    /// Resolves once delivery is over: the source closed, an error was
    /// reported, or the handle was stopped.
    pub async fn ended(&self) {
        self.ended.cancelled().await;
    }

    /// Stop delivery and release the source. Idempotent.
    ///
    /// Once this returns no callback will run for this subscription, even if
    /// the source has events queued.
    pub fn stop(&mut self) {
        *lock(&self.gate) = false;
        self.cancel.cancel();
        self.ended.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(watch_id = self.id, "location watch stopped");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Per-opcode request/response matching.
//!
//! The device answers with the opcode of the request and nothing else, so at
//! most one request per opcode can be in flight. Registering a second request
//! for a busy opcode evicts the first one without calling its completion.
//!
//! All timers (request timeouts and the ready-event settle delay) live in one
//! [`DelayQueue`]. A slot and its timer key are always removed together, so
//! an expiry can never hit a slot that was already answered.

use std::collections::HashMap;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::{Expired, Key};
use tracing::{debug, trace};

use ubeacon_core::error::{Error, Result};
use ubeacon_core::types::Response;

/// Callback invoked with the outcome of a request, at most once.
pub type Completion = Box<dyn FnOnce(Result<Response>) + Send>;

/// Something the timer queue is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEntry {
    /// Response window of the request pending on this opcode.
    Request(u8),
    /// Deferred publication of a ready event.
    ReadySettle(bool),
}

/// A request waiting for its response.
pub struct PendingRequest {
    pub opcode: u8,
    /// Frame as written to the wire.
    pub frame: Bytes,
    pub created: Instant,
    completion: Completion,
    timer: Key,
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("opcode", &self.opcode)
            .field("frame", &self.frame)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

/// Outcome of a fired timer, as seen by the IO task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    /// A request timed out; its completion has been called.
    RequestTimedOut(u8),
    /// The settle delay elapsed; publish the ready event now.
    Ready(bool),
}

/// Pending-request table plus the timers that guard it.
pub struct Correlator {
    slots: HashMap<u8, PendingRequest>,
    timers: DelayQueue<TimerEntry>,
    timeout: Duration,
}

impl Correlator {
    pub fn new(timeout: Duration) -> Self {
        Correlator {
            slots: HashMap::new(),
            timers: DelayQueue::new(),
            timeout,
        }
    }

    /// Register a request on `opcode` and arm its timeout.
    ///
    /// Returns `true` if an earlier request on the same opcode was evicted.
    /// The evicted completion is dropped, never called.
    pub fn register(&mut self, opcode: u8, frame: Bytes, completion: Completion) -> bool {
        let superseded = self.discard(opcode).is_some();
        let timer = self.timers.insert(TimerEntry::Request(opcode), self.timeout);
        self.slots.insert(
            opcode,
            PendingRequest {
                opcode,
                frame,
                created: Instant::now(),
                completion,
                timer,
            },
        );
        superseded
    }

    /// Remove the slot for `opcode` with its timer, without completing it.
    fn discard(&mut self, opcode: u8) -> Option<PendingRequest> {
        let pending = self.slots.remove(&opcode)?;
        self.timers.remove(&pending.timer);
        Some(pending)
    }

    /// Complete the request pending on `opcode`.
    ///
    /// Returns `false` if nothing was pending.
    pub fn resolve(&mut self, opcode: u8, result: Result<Response>) -> bool {
        match self.discard(opcode) {
            Some(pending) => {
                trace!(
                    opcode = format_args!("0x{opcode:02x}"),
                    elapsed_ms = pending.created.elapsed().as_millis() as u64,
                    "request resolved"
                );
                (pending.completion)(result);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, opcode: u8) -> bool {
        self.slots.contains_key(&opcode)
    }

    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    /// Frame of the request pending on `opcode`.
    pub fn pending(&self, opcode: u8) -> Option<&PendingRequest> {
        self.slots.get(&opcode)
    }

    /// Arm the settle delay for a ready event.
    pub fn schedule_ready(&mut self, ready: bool, delay: Duration) {
        self.timers.insert(TimerEntry::ReadySettle(ready), delay);
    }

    /// `true` while any timer is armed.
    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Poll for the next fired timer and act on it.
    ///
    /// Returns `Poll::Ready(None)` when no timer is armed.
    pub fn poll_fired(&mut self, cx: &mut Context<'_>) -> Poll<Option<Fired>> {
        match self.timers.poll_expired(cx) {
            Poll::Ready(Some(expired)) => Poll::Ready(Some(self.on_expired(expired))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Wait for the next fired timer.
    pub async fn next_fired(&mut self) -> Option<Fired> {
        std::future::poll_fn(|cx| self.poll_fired(cx)).await
    }

    fn on_expired(&mut self, expired: Expired<TimerEntry>) -> Fired {
        match expired.get_ref() {
            TimerEntry::Request(opcode) => {
                let opcode = *opcode;
                // The queue already dropped the key; only take the slot.
                if self
                    .slots
                    .get(&opcode)
                    .is_some_and(|p| p.timer == expired.key())
                {
                    if let Some(pending) = self.slots.remove(&opcode) {
                        debug!(
                            opcode = format_args!("0x{opcode:02x}"),
                            "request timed out"
                        );
                        (pending.completion)(Err(Error::ResponseTimeout { opcode }));
                    }
                }
                Fired::RequestTimedOut(opcode)
            }
            TimerEntry::ReadySettle(ready) => Fired::Ready(*ready),
        }
    }

    /// Complete every pending request with an error produced by `err`.
    pub fn fail_all(&mut self, err: impl Fn() -> Error) {
        for (_, pending) in self.slots.drain() {
            (pending.completion)(Err(err()));
        }
        self.timers.clear();
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.slots.keys().collect::<Vec<_>>())
            .field("timers", &self.timers.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    type Outcomes = Arc<Mutex<Vec<Result<Response>>>>;

    fn recorder(outcomes: &Outcomes) -> Completion {
        let outcomes = Arc::clone(outcomes);
        Box::new(move |r| outcomes.lock().unwrap().push(r))
    }

    fn frame() -> Bytes {
        Bytes::from_static(b"g:h\r\n")
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_completes_once_and_clears_slot() {
        let outcomes = Outcomes::default();
        let mut c = Correlator::new(Duration::from_secs(5));
        assert!(!c.register(b'h', frame(), recorder(&outcomes)));
        assert!(c.is_pending(b'h'));

        assert!(c.resolve(b'h', Ok(Response::U8(1))));
        assert!(!c.is_pending(b'h'));
        assert!(!c.has_timers());
        assert!(!c.resolve(b'h', Ok(Response::U8(2))));

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].as_ref().unwrap(), &Response::U8(1));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_exactly_once() {
        let outcomes = Outcomes::default();
        let mut c = Correlator::new(Duration::from_millis(5000));
        c.register(b'0', frame(), recorder(&outcomes));

        assert_eq!(c.next_fired().await, Some(Fired::RequestTimedOut(b'0')));
        assert!(!c.is_pending(b'0'));
        assert_eq!(c.next_fired().await, None);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            Err(Error::ResponseTimeout { opcode: b'0' })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_measured_from_registration() {
        let outcomes = Outcomes::default();
        let mut c = Correlator::new(Duration::from_millis(5000));
        let start = Instant::now();
        c.register(b'0', frame(), recorder(&outcomes));
        c.next_fired().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(5000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(5010), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_drops_first_completion_silently() {
        let mut c = Correlator::new(Duration::from_secs(5));
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        c.register(
            b'h',
            frame(),
            Box::new(move |r| {
                let _ = tx1.send(r);
            }),
        );
        let superseded = c.register(
            b'h',
            frame(),
            Box::new(move |r| {
                let _ = tx2.send(r);
            }),
        );
        assert!(superseded);
        assert_eq!(c.pending_count(), 1);

        // The evicted sender is gone without a value.
        assert!(rx1.await.is_err());

        c.resolve(b'h', Ok(Response::U8(0)));
        assert_eq!(rx2.await.unwrap().unwrap(), Response::U8(0));
    }

    #[tokio::test(start_paused = true)]
    async fn overwritten_timer_does_not_fire() {
        let outcomes = Outcomes::default();
        let mut c = Correlator::new(Duration::from_millis(100));
        c.register(b'h', frame(), recorder(&outcomes));
        tokio::time::sleep(Duration::from_millis(60)).await;
        c.register(b'h', frame(), recorder(&outcomes));

        let start = Instant::now();
        assert_eq!(c.next_fired().await, Some(Fired::RequestTimedOut(b'h')));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(110), "{elapsed:?}");
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slots_are_independent() {
        let outcomes = Outcomes::default();
        let mut c = Correlator::new(Duration::from_secs(5));
        c.register(b'0', frame(), recorder(&outcomes));
        c.register(b'1', frame(), recorder(&outcomes));
        assert_eq!(c.pending_count(), 2);
        c.resolve(b'1', Ok(Response::Text("2.2.0".into())));
        assert!(c.is_pending(b'0'));
        assert!(!c.is_pending(b'1'));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_settle_timer() {
        let mut c = Correlator::new(Duration::from_secs(5));
        let start = Instant::now();
        c.schedule_ready(true, Duration::from_millis(200));
        assert_eq!(c.next_fired().await, Some(Fired::Ready(true)));
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn fail_all_drains_everything() {
        let outcomes = Outcomes::default();
        let mut c = Correlator::new(Duration::from_secs(5));
        c.register(b'0', frame(), recorder(&outcomes));
        c.register(b'1', frame(), recorder(&outcomes));
        c.schedule_ready(true, Duration::from_millis(200));

        c.fail_all(|| Error::NotConnected);
        assert_eq!(c.pending_count(), 0);
        assert!(!c.has_timers());
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|r| matches!(r, Err(Error::NotConnected))));
    }
}

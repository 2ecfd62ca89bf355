//! Scripted mock transport for deterministic protocol tests.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. Because the IO task takes ownership of its
//! transport, every mock comes with a clonable [`MockHandle`] that keeps
//! working after the mock has been moved: add expectations, push
//! unsolicited device lines, and read back what the host wrote.
//!
//! # Example
//!
//! ```
//! use ubeacon_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! let handle = mock.handle();
//! // When the host asks for the protocol version, answer "0.2.1".
//! handle.expect(b"g:0\r\n", b"r:00.2.1\r\n");
//! // The device announces it is ready without being asked.
//! handle.inject(b"r:!01\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ubeacon_core::error::{Error, Result};
use ubeacon_core::transport::Transport;

use crate::inbound::Inbound;

/// A pre-loaded request/response pair.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    /// Bytes queued for the host once `request` is seen. Empty means silence.
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    expectations: VecDeque<Expectation>,
    sent_log: Vec<Vec<u8>>,
    connected: bool,
    fail_sends: bool,
    input_clears: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockState>,
    inbound: Inbound,
}

/// A mock [`Transport`] driven by ordered expectations.
///
/// Each `send()` is recorded and matched against the next expectation; the
/// expectation's response becomes readable through `receive()`. A send that
/// matches nothing, or arrives after the script is exhausted, fails with
/// [`Error::Protocol`].
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

/// Remote control for a [`MockTransport`] that may live inside an IO task.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            shared: Arc::new(Shared {
                state: Mutex::new(MockState {
                    expectations: VecDeque::new(),
                    sent_log: Vec::new(),
                    connected: true,
                    fail_sends: false,
                    input_clears: 0,
                }),
                inbound: Inbound::default(),
            }),
        }
    }

    /// A handle sharing this mock's state.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.handle().expect(request, response);
    }

    /// All data sent through this transport, one element per `send()`.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.handle().sent_data()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut guard = match self.shared.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Add an expected request/response pair.
    ///
    /// An empty `response` accepts the request without answering it.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.with_state(|s| {
            s.expectations.push_back(Expectation {
                request: request.to_vec(),
                response: response.to_vec(),
            })
        });
    }

    /// Accept `request` and never answer it.
    pub fn expect_silent(&self, request: &[u8]) {
        self.expect(request, &[]);
    }

    /// Queue bytes the device sends on its own (events, late responses).
    pub fn inject(&self, data: &[u8]) {
        self.shared.inbound.push(data);
    }

    /// All data sent so far, one element per `send()`.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.with_state(|s| s.sent_log.clone())
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.with_state(|s| s.expectations.len())
    }

    /// Bytes queued for the host but not yet read.
    pub fn pending_input(&self) -> usize {
        self.shared.inbound.len()
    }

    /// How many times the host asked to clear its input buffer.
    pub fn input_clears(&self) -> usize {
        self.with_state(|s| s.input_clears)
    }

    /// Set the connected state; a disconnected mock fails with [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.with_state(|s| s.connected = connected);
    }

    /// Make every subsequent `send()` fail with [`Error::ConnectionLost`].
    pub fn fail_sends(&self, fail: bool) {
        self.with_state(|s| s.fail_sends = fail);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let handle = self.handle();
        let response = handle.with_state(|s| {
            if !s.connected {
                return Err(Error::NotConnected);
            }
            if s.fail_sends {
                return Err(Error::ConnectionLost);
            }
            s.sent_log.push(data.to_vec());

            let expectation = s.expectations.pop_front().ok_or_else(|| {
                Error::Protocol("no more expectations in mock transport".into())
            })?;
            if data != expectation.request.as_slice() {
                return Err(Error::Protocol(format!(
                    "unexpected send data: expected {:?}, got {:?}",
                    String::from_utf8_lossy(&expectation.request),
                    String::from_utf8_lossy(data)
                )));
            }
            Ok(expectation.response)
        })?;

        if !response.is_empty() {
            self.shared.inbound.push(&response);
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.shared.inbound.read(buf, timeout).await
    }

    async fn clear_input(&mut self) -> Result<()> {
        self.handle().with_state(|s| s.input_clears += 1);
        self.shared.inbound.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.handle().set_connected(false);
        self.shared.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle().with_state(|s| s.connected)
    }
}

//! Device-to-host byte queue shared by the test transports.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use ubeacon_core::error::{Error, Result};

/// Bytes waiting to be read by the host, with a wakeup for blocked readers.
#[derive(Debug, Default)]
pub(crate) struct Inbound {
    queue: Mutex<VecDeque<u8>>,
    notify: Notify,
}

impl Inbound {
    pub(crate) fn push(&self, data: &[u8]) {
        if let Ok(mut q) = self.queue.lock() {
            q.extend(data);
        }
        self.notify.notify_one();
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut q) = self.queue.lock() {
            q.clear();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn take_into(&self, buf: &mut [u8]) -> usize {
        let Ok(mut q) = self.queue.lock() else {
            return 0;
        };
        let n = q.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(q.drain(..n)) {
            *slot = byte;
        }
        n
    }

    /// Copy queued bytes into `buf`, waiting up to `timeout` for some to arrive.
    pub(crate) async fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let n = self.take_into(buf);
        if n > 0 {
            return Ok(n);
        }
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
        match self.take_into(buf) {
            0 => Err(Error::Timeout),
            n => Ok(n),
        }
    }
}

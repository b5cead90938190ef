//! Trait abstraction for the bus socket to enable testing

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// One raw frame as it came off the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFrame {
    /// Raw identifier; extended identifiers keep only their low bits downstream
    pub id: u32,
    /// Declared data length (0-8)
    pub len: u8,
    /// Frame data; only the first `len` bytes are meaningful
    pub data: [u8; 8],
}

impl BusFrame {
    pub fn new(id: u32, data: &[u8]) -> Self {
        let len = data.len().min(8);
        let mut buf = [0u8; 8];
        buf[..len].copy_from_slice(&data[..len]);
        Self {
            id,
            len: len as u8,
            data: buf,
        }
    }
}

/// Source of bus frames with a bounded per-iteration wait
#[async_trait]
pub trait FrameSource: Send {
    /// Wait up to `timeout` for one frame
    ///
    /// `Ok(None)` means the wait timed out with nothing to read; an `Err`
    /// is a wait or socket failure and stops the acquisition loop.
    async fn recv(&mut self, timeout: Duration) -> Result<Option<BusFrame>>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::RideLoggerError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted frame source for testing
    ///
    /// Each step yields one frame, a timeout or an error, in order. An
    /// exhausted script keeps timing out. Clones share the script.
    #[derive(Clone)]
    pub struct ScriptedFrameSource {
        steps: Arc<Mutex<VecDeque<Result<Option<BusFrame>>>>>,
    }

    impl ScriptedFrameSource {
        pub fn new() -> Self {
            Self {
                steps: Arc::new(Mutex::new(VecDeque::new())),
            }
        }

        pub fn push_frame(&self, frame: BusFrame) {
            self.steps.lock().unwrap().push_back(Ok(Some(frame)));
        }

        pub fn push_timeout(&self) {
            self.steps.lock().unwrap().push_back(Ok(None));
        }

        pub fn push_error(&self) {
            self.steps
                .lock()
                .unwrap()
                .push_back(Err(RideLoggerError::Bus("mock wait error".to_string())));
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedFrameSource {
        async fn recv(&mut self, _timeout: Duration) -> Result<Option<BusFrame>> {
            self.steps.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }
}

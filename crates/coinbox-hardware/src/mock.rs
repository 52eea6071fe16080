//! Mock serial channel for testing and for running without hardware.
//!
//! [`MockSerial`] is the listener-side half; [`MockSerialHandle`] plays the
//! device. Bytes injected through the handle show up on the next
//! `read_raw`, and every message the listener sends is recorded on the
//! handle. Failures can be armed to exercise the listener's error paths.

use crate::channel::{ConnectionState, SerialChannel, frame_message};
use crate::{HardwareError, Result};
use coinbox_core::DeviceId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
struct MockControl {
    fail_connect: AtomicBool,
    fail_next_read: AtomicBool,
    fail_writes: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl MockControl {
    fn record(&self, line: String) {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
    }
}

#[derive(Debug)]
pub struct MockSerial {
    device_id: DeviceId,
    incoming_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    control: Arc<MockControl>,
    state: Option<ConnectionState>,
}

impl MockSerial {
    pub fn new(device_id: DeviceId) -> (Self, MockSerialHandle) {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let control = Arc::new(MockControl::default());

        let channel = Self {
            device_id: device_id.clone(),
            incoming_rx,
            control: Arc::clone(&control),
            state: None,
        };

        let handle = MockSerialHandle {
            incoming_tx,
            control,
            device_id,
        };

        (channel, handle)
    }

    fn mark_failed(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.is_open = false;
        }
    }
}

impl SerialChannel for MockSerial {
    fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    async fn connect(&mut self, path: &str, baud_rate: u32) -> Result<()> {
        if self.control.fail_connect.load(Ordering::SeqCst) {
            return Err(HardwareError::open_failed(path, "mock connect failure"));
        }

        self.state = Some(ConnectionState::open(
            path,
            baud_rate,
            self.device_id.clone(),
        ));
        Ok(())
    }

    async fn read_raw(&mut self) -> Result<Vec<u8>> {
        if !self.is_connected() {
            return Ok(Vec::new());
        }

        if self.control.fail_next_read.swap(false, Ordering::SeqCst) {
            self.mark_failed();
            return Err(HardwareError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock read failure",
            )));
        }

        let mut buffer = Vec::new();
        while let Ok(chunk) = self.incoming_rx.try_recv() {
            buffer.extend_from_slice(&chunk);
        }

        if !buffer.is_empty() {
            debug!(device_id = %self.device_id, bytes = buffer.len(), "Read from mock coin acceptor");
        }
        Ok(buffer)
    }

    async fn send(&mut self, message: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(HardwareError::not_connected(self.device_id.as_str()));
        }

        let line = frame_message(message);
        if self.control.fail_writes.load(Ordering::SeqCst) {
            return Err(HardwareError::ShortWrite {
                written: 0,
                expected: line.len(),
            });
        }

        self.control.record(line.trim_end().to_string());
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.is_open = false;
        }
    }

    fn is_connected(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_open)
    }

    fn state(&self) -> Option<&ConnectionState> {
        self.state.as_ref()
    }
}

/// Device side of a [`MockSerial`].
#[derive(Debug, Clone)]
pub struct MockSerialHandle {
    incoming_tx: mpsc::UnboundedSender<Vec<u8>>,
    control: Arc<MockControl>,
    device_id: DeviceId,
}

impl MockSerialHandle {
    /// Queue raw bytes exactly as given.
    pub fn inject(&self, bytes: impl Into<Vec<u8>>) {
        // The channel may already be gone at shutdown; nothing to deliver to.
        let _ = self.incoming_tx.send(bytes.into());
    }

    /// Queue one newline-terminated line.
    pub fn inject_line(&self, line: &str) {
        self.inject(frame_message(line).into_bytes());
    }

    /// Messages sent by the listener so far, without terminators.
    pub fn sent(&self) -> Vec<String> {
        self.control
            .sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Remove and return the messages sent so far.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(
            &mut *self
                .control
                .sent
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    /// Make every following `connect` fail until cleared.
    pub fn fail_connect(&self, fail: bool) {
        self.control.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make the next `read_raw` fail with an I/O error and close the link.
    pub fn fail_next_read(&self) {
        self.control.fail_next_read.store(true, Ordering::SeqCst);
    }

    /// Make every following `send` fail until cleared.
    pub fn fail_writes(&self, fail: bool) {
        self.control.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock() -> (MockSerial, MockSerialHandle) {
        MockSerial::new(DeviceId::new("ESP32_COIN_001").unwrap())
    }

    #[tokio::test]
    async fn test_connect_records_state() {
        let (mut channel, _handle) = mock();
        assert!(channel.state().is_none());

        channel.connect("/dev/ttyUSB0", 9600).await.unwrap();

        let state = channel.state().unwrap();
        assert!(state.is_open);
        assert_eq!(state.baud_rate, 9600);
        assert!(channel.is_connected());
    }

    #[tokio::test]
    async fn test_read_drains_everything_injected() {
        let (mut channel, handle) = mock();
        channel.connect("/dev/mock", 115_200).await.unwrap();

        handle.inject_line("HEARTBEAT");
        handle.inject(b"COIN:5".to_vec());

        assert_eq!(channel.read_raw().await.unwrap(), b"HEARTBEAT\nCOIN:5");
        assert!(channel.read_raw().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_before_connect_is_empty() {
        let (mut channel, handle) = mock();
        handle.inject_line("HEARTBEAT");

        assert!(channel.read_raw().await.unwrap().is_empty());

        // Bytes stay queued until the link opens
        channel.connect("/dev/mock", 115_200).await.unwrap();
        assert_eq!(channel.read_raw().await.unwrap(), b"HEARTBEAT\n");
    }

    #[tokio::test]
    async fn test_send_records_trimmed_message() {
        let (mut channel, handle) = mock();
        channel.connect("/dev/mock", 115_200).await.unwrap();

        channel.send(" ACK:HEARTBEAT \n").await.unwrap();

        assert_eq!(handle.take_sent(), vec!["ACK:HEARTBEAT".to_string()]);
        assert!(handle.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_when_disconnected_fails() {
        let (mut channel, handle) = mock();
        assert!(channel.send("ACK:HEARTBEAT").await.is_err());
        assert!(handle.sent().is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let (mut channel, handle) = mock();
        handle.fail_connect(true);

        assert!(channel.connect("/dev/mock", 115_200).await.is_err());
        assert!(!channel.is_connected());

        handle.fail_connect(false);
        assert!(channel.connect("/dev/mock", 115_200).await.is_ok());
    }

    #[tokio::test]
    async fn test_read_failure_closes_link() {
        let (mut channel, handle) = mock();
        channel.connect("/dev/mock", 115_200).await.unwrap();
        handle.fail_next_read();

        assert!(channel.read_raw().await.is_err());
        assert!(!channel.is_connected());
        assert!(!channel.state().unwrap().is_open);

        // Never reopened implicitly
        handle.inject_line("HEARTBEAT");
        assert!(channel.read_raw().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure() {
        let (mut channel, handle) = mock();
        channel.connect("/dev/mock", 115_200).await.unwrap();
        handle.fail_writes(true);

        let err = channel.send("ACK:HEARTBEAT").await.unwrap_err();
        assert!(matches!(err, HardwareError::ShortWrite { written: 0, .. }));
    }

    #[tokio::test]
    async fn test_disconnect_idempotent() {
        let (mut channel, _handle) = mock();
        channel.connect("/dev/mock", 115_200).await.unwrap();

        channel.disconnect().await;
        channel.disconnect().await;

        assert!(!channel.is_connected());
    }
}

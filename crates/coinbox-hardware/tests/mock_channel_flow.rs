//! End-to-end flow over the mock channel: device bytes in, parsed events
//! out, replies recorded, health tracked in the shared store.

use coinbox_core::{DeviceId, KioskConfig, MemoryStore};
use coinbox_hardware::{AnyChannel, HealthMonitor, MockSerial, SerialChannel};
use coinbox_protocol::{DeviceReply, HardwareEvent, LineBuffer, format_message};
use rust_decimal::Decimal;
use std::sync::Arc;

fn setup() -> (
    AnyChannel,
    coinbox_hardware::MockSerialHandle,
    HealthMonitor<MemoryStore>,
) {
    let config = KioskConfig::new("ESP32_COIN_001");
    let device_id = config.validate().unwrap();
    let (mock, handle) = MockSerial::new(device_id.clone());
    let health = HealthMonitor::from_config(device_id, Arc::new(MemoryStore::new()), &config);
    (AnyChannel::Mock(mock), handle, health)
}

#[tokio::test]
async fn test_split_reads_reassemble_and_heartbeat_is_acked() {
    let (mut channel, handle, mut health) = setup();
    channel.connect("/dev/ttyUSB0", 115_200).await.unwrap();

    let mut lines = LineBuffer::new();
    let mut events = Vec::new();

    handle.inject(b"HEARTBEAT\nCOIN:2".to_vec());
    lines.feed(&channel.read_raw().await.unwrap());
    events.extend(lines.drain_events());

    handle.inject(b"0.00\nSTATUS:READY\n".to_vec());
    lines.feed(&channel.read_raw().await.unwrap());
    events.extend(lines.drain_events());

    assert_eq!(
        events,
        vec![
            HardwareEvent::Heartbeat,
            HardwareEvent::Coin {
                amount: Decimal::from(20)
            },
            HardwareEvent::Status {
                text: "READY".to_string()
            },
        ]
    );

    for event in &events {
        health.increment_message_count();
        match event {
            HardwareEvent::Heartbeat => {
                health.update_heartbeat().await.unwrap();
                channel
                    .send(&format_message(&DeviceReply::AckHeartbeat))
                    .await
                    .unwrap();
            }
            HardwareEvent::Status { text } => health.update_status(text).await.unwrap(),
            HardwareEvent::Coin { .. } | HardwareEvent::Error { .. } => {}
        }
    }

    assert!(health.is_healthy().await);
    assert_eq!(health.status().await.as_deref(), Some("READY"));
    assert_eq!(health.message_count(), 3);
    assert_eq!(handle.sent(), vec!["ACK:HEARTBEAT".to_string()]);
}

#[tokio::test]
async fn test_io_failure_requires_explicit_reconnect() {
    let (mut channel, handle, _health) = setup();
    channel.connect("/dev/ttyUSB0", 115_200).await.unwrap();

    handle.fail_next_read();
    assert!(channel.read_raw().await.is_err());
    assert!(!channel.is_connected());

    handle.inject_line("HEARTBEAT");
    assert!(channel.read_raw().await.unwrap().is_empty());

    channel.connect("/dev/ttyUSB0", 115_200).await.unwrap();
    assert_eq!(channel.read_raw().await.unwrap(), b"HEARTBEAT\n");
}

#[tokio::test]
async fn test_connection_state_tracks_device() {
    let (mut channel, _handle, _health) = setup();
    channel.connect("/dev/ttyACM0", 9600).await.unwrap();

    let state = channel.state().unwrap();
    assert_eq!(state.device_path, "/dev/ttyACM0");
    assert_eq!(state.baud_rate, 9600);
    assert_eq!(state.device_id, DeviceId::new("ESP32_COIN_001").unwrap());
}

//! coinbox-listener - coin acceptor listener for the print kiosk
//!
//! Connects to the coin acceptor, credits coins until SIGINT/SIGTERM and
//! then reports how many messages were processed.
//!
//! Device health and banked coins are kept in the ledger database, so the
//! payment page process sees them as soon as they are written.
//!
//! Without `--session-id` coins are banked per device for the payment page
//! to claim. With it, coins are credited straight to that session (opened
//! as a guest session for `--required-amount`) and the final payment status
//! is printed to stdout as JSON.
//!
//! `--simulate` replaces the serial port with an in-process device that
//! sends heartbeats and forwards lines typed on stdin (`COIN:5`,
//! `STATUS:READY`, ...).

use anyhow::{Context, Result};
use clap::Parser;
use coinbox_core::{Denominations, KioskConfig, SessionId};
use coinbox_hardware::{AnyChannel, HealthMonitor, MockSerial, MockSerialHandle, SerialConnection};
use coinbox_listener::{
    ActiveSession, CoinAcceptorService, CreditPathway, ListenerConfig, ListenerLoop,
};
use coinbox_payment::{PaymentCoordinator, PendingCoinBox};
use coinbox_storage::{CreditLedger, Database, DatabaseConfig, SqliteStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Coin acceptor listener
#[derive(Parser, Debug)]
#[command(name = "coinbox-listener")]
#[command(version, about, long_about = None)]
struct Args {
    /// Coin acceptor identifier
    #[arg(long, env = "COINBOX_DEVICE_ID")]
    device_id: String,

    /// Serial device of the coin acceptor
    #[arg(long, env = "COINBOX_SERIAL_PORT", default_value = "/dev/ttyUSB0")]
    serial_port: String,

    #[arg(long, env = "COINBOX_BAUD_RATE", default_value_t = 115_200)]
    baud_rate: u32,

    /// Seconds without a heartbeat before the device counts as unhealthy
    #[arg(long, env = "COINBOX_HEARTBEAT_TIMEOUT", default_value_t = 30)]
    heartbeat_timeout: u64,

    /// Accepted coin values, comma separated
    #[arg(long, env = "COINBOX_DENOMINATIONS", default_value = "1,5,10,20")]
    denominations: Denominations,

    #[arg(long, env = "COINBOX_POLL_INTERVAL_MS", default_value_t = 100)]
    poll_interval_ms: u64,

    /// Database shared with the payment page: ledger, device health and
    /// banked coins
    #[arg(long, env = "COINBOX_DATABASE", default_value = "coinbox.db")]
    database: String,

    /// Credit coins directly to this payment session
    #[arg(long, requires = "required_amount")]
    session_id: Option<SessionId>,

    /// Amount the session has to pay
    #[arg(long)]
    required_amount: Option<Decimal>,

    /// Log level (trace, debug, info, warn, error) or a full filter
    #[arg(long, env = "COINBOX_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Run against a simulated device instead of the serial port
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = KioskConfig::new(&args.device_id)
        .serial_port(&args.serial_port)
        .baud_rate(args.baud_rate)
        .heartbeat_timeout(Duration::from_secs(args.heartbeat_timeout))
        .accepted_denominations(args.denominations.clone())
        .poll_interval(Duration::from_millis(args.poll_interval_ms));
    let device_id = config.validate().context("Invalid configuration")?;

    let db = Database::new(DatabaseConfig::new(&args.database))
        .await
        .context("Failed to open database")?;
    let store = Arc::new(SqliteStore::new(&db));
    let health = HealthMonitor::from_config(device_id.clone(), store.clone(), &config);

    let (pathway, session) = match (&args.session_id, args.required_amount) {
        (Some(session_id), Some(required)) => {
            let ledger = Arc::new(CreditLedger::new(&db));
            let coordinator = Arc::new(PaymentCoordinator::new(
                &db,
                ledger,
                config.accepted_denominations.clone(),
            ));
            coordinator
                .start_session(session_id.clone(), None, required)
                .await
                .context("Failed to start payment session")?;

            let active = ActiveSession::new();
            active.bind(session_id.clone());
            let pathway = CreditPathway::SessionScoped {
                coordinator: coordinator.clone(),
                session: active,
            };
            (pathway, Some((coordinator, session_id.clone())))
        }
        _ => {
            let pending = PendingCoinBox::from_config(device_id.clone(), store.clone(), &config);
            (CreditPathway::DeviceScoped(pending), None)
        }
    };

    let shutdown = CancellationToken::new();

    let channel = if args.simulate {
        let (mock, handle) = MockSerial::new(device_id.clone());
        tokio::spawn(simulate_device(handle, config.heartbeat_timeout, shutdown.clone()));
        AnyChannel::Mock(mock)
    } else {
        AnyChannel::Serial(SerialConnection::new(device_id.clone()))
    };

    let mut service = CoinAcceptorService::new(channel, health, pathway);
    service
        .connect(&config.serial_port, config.baud_rate)
        .await
        .with_context(|| format!("Failed to connect to {}", config.serial_port))?;

    let listener = ListenerLoop::new(
        service,
        ListenerConfig::new(&config.serial_port, config.baud_rate, config.poll_interval),
        shutdown.clone(),
    );

    tokio::spawn(cancel_on_signal(shutdown));
    let processed = listener.run().await;
    info!(processed, "Total messages processed");

    if let Some((coordinator, session_id)) = session {
        match coordinator.status(&session_id).await {
            Ok(status) => {
                info!(
                    session_id = %session_id,
                    paid = %status.amount_paid,
                    required = %status.amount_required,
                    complete = status.is_complete,
                    "Final payment status"
                );
                println!("{}", serde_json::to_string(&status)?);
            }
            Err(e) => warn!(session_id = %session_id, error = %e, "Payment status unavailable"),
        }
    }

    db.close().await;
    Ok(())
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for SIGINT only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "SIGINT handler unavailable");
                    return;
                }
            }
        }
    }

    #[cfg(not(unix))]
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "SIGINT handler unavailable");
        return;
    }

    info!("Shutting down listener");
    shutdown.cancel();
}

/// Heartbeats on a timer plus whatever lines arrive on stdin.
async fn simulate_device(handle: MockSerialHandle, heartbeat_timeout: Duration, shutdown: CancellationToken) {
    let mut heartbeat = tokio::time::interval((heartbeat_timeout / 3).max(Duration::from_secs(1)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = heartbeat.tick() => handle.inject_line("HEARTBEAT"),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle.inject_line(&line),
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Stopped reading simulated input");
                    stdin_open = false;
                }
            },
        }
    }
}

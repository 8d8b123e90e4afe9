// src/main.rs
use anyhow::{bail, Context};
use chrono::Utc;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use venue_session::config::AppConfig;
use venue_session::connectors::paper::{PaperSettings, PaperVenue};
use venue_session::storage::{load_snapshot, save_snapshot};
use venue_session::types::SessionNotice;
use venue_session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Logging: stdout plus a daily file
    let file_appender = tracing_appender::rolling::daily("logs", "venue_session.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(file_writer))
        .with_ansi(false)
        .init();

    // 2. Load Configuration
    let config = AppConfig::new().context("Failed to load configuration")?;

    println!("========================================");
    println!("       VENUE SESSION - v0.1.1");
    println!("========================================");
    println!("Venue:       {}:{}", config.connection.host, config.connection.port);
    println!("Instruments: {}", config.instruments.len());
    println!("Mode:        📝 PAPER VENUE");
    println!("========================================");

    // 3. Venue + session
    let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
    let venue = Arc::new(PaperVenue::new(event_tx, PaperSettings::default()));
    let session = Session::new(venue, event_rx, config.session());
    let mut notices = session
        .take_notices()
        .context("Notice stream already taken")?;

    for instrument in &config.instruments {
        session
            .add_instrument(&instrument.symbol, &instrument.portfolio)
            .await?;
    }
    let snapshot = load_snapshot(&config.state_file).await?;
    session.restore(&snapshot);

    // 4. Connect
    if !session
        .connect(Some(config.connection.clone()), config.connect_timeout())
        .await?
    {
        session.terminate().await;
        bail!("Venue did not confirm the connection in time");
    }

    for instrument in session.instruments() {
        let bars = instrument.get_minute_bars(5, Utc::now()).await?;
        let last = bars.values().last().copied().unwrap_or(Decimal::ZERO);
        info!(
            "{}: {} bars, last close {}, balance {}",
            instrument.symbol(),
            bars.len(),
            last,
            instrument.get_balance()
        );
    }

    // 5. Run until Ctrl+C
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            notice = notices.recv() => match notice {
                Some(SessionNotice::Disconnected { reason, expected: false }) => {
                    warn!("Venue dropped the session ({}), reconnecting", reason);
                    match session.connect(None, config.connect_timeout()).await {
                        Ok(true) => info!("Reconnected"),
                        Ok(false) => error!("Reconnect timed out"),
                        Err(e) => error!("Reconnect failed: {}", e),
                    }
                }
                Some(SessionNotice::OrderFailed { correlation_id, reason, .. }) => {
                    warn!("Order {} rejected: {}", correlation_id, reason);
                }
                Some(other) => info!("{:?}", other),
                None => break,
            },
        }
    }

    // 6. Shutdown
    if let Err(e) = save_snapshot(&config.state_file, &session.snapshot()).await {
        error!("Failed to save session state: {}", e);
    }
    if !session.disconnect(config.disconnect_timeout()).await? {
        warn!("Venue did not confirm the disconnect");
    }
    session.terminate().await;

    Ok(())
}

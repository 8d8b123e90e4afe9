// src/core/session.rs
use crate::config::SessionConfig;
use crate::connectors::messages::VenueEvent;
use crate::connectors::traits::VenueClient;
use crate::core::dispatcher::EventDispatcher;
use crate::core::instrument::{InstrumentHandle, InstrumentState};
use crate::core::order_id::CorrelationIds;
use crate::core::registry::InstrumentRegistry;
use crate::error::{Result, SessionError};
use crate::types::{ConnectionParams, ConnectionState, PositionState, SessionNotice};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Connection state shared between the session and its event pump.
pub(crate) struct Link {
    state: watch::Sender<ConnectionState>,
    legal_disconnect: AtomicBool,
    connected_at: Mutex<Option<DateTime<Utc>>>,
    unexpected_disconnects: AtomicU64,
    /// Set once `connect` has replayed everything over the current connection.
    live: AtomicBool,
    /// Subscriptions already issued over the current connection.
    sent: Mutex<Subscriptions>,
}

impl Link {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            legal_disconnect: AtomicBool::new(false),
            connected_at: Mutex::new(None),
            unexpected_disconnects: AtomicU64::new(0),
            live: AtomicBool::new(false),
            sent: Mutex::new(Subscriptions::default()),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Moves to `to` only while the link is in one of `from`.
    fn transition(&self, from: &[ConnectionState], to: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn request_disconnect(&self) {
        self.legal_disconnect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_connected(&self) {
        self.legal_disconnect.store(false, Ordering::SeqCst);
        self.reset_connection();
        *self.connected_at.lock() = Some(Utc::now());
        self.state.send_replace(ConnectionState::Connected);
    }

    /// Returns whether the disconnect had been asked for.
    pub(crate) fn mark_disconnected(&self) -> bool {
        let expected = self.legal_disconnect.swap(false, Ordering::SeqCst);
        if !expected {
            self.unexpected_disconnects.fetch_add(1, Ordering::Relaxed);
        }
        self.reset_connection();
        self.state.send_replace(ConnectionState::Disconnected);
        expected
    }

    /// Trades stamped before the current connection came up are replays.
    pub(crate) fn is_stale(&self, timestamp: DateTime<Utc>) -> bool {
        matches!(*self.connected_at.lock(), Some(since) if timestamp < since)
    }

    pub(crate) fn unexpected_disconnects(&self) -> u64 {
        self.unexpected_disconnects.load(Ordering::Relaxed)
    }

    fn reset_connection(&self) {
        self.live.store(false, Ordering::SeqCst);
        *self.sent.lock() = Subscriptions::default();
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst) && self.state() == ConnectionState::Connected
    }

    fn set_live(&self) {
        if self.state() == ConnectionState::Connected {
            self.live.store(true, Ordering::SeqCst);
        }
    }

    fn portfolio_sent(&self, portfolio: &str) -> bool {
        self.sent.lock().portfolios.contains(portfolio)
    }

    fn symbol_sent(&self, symbol: &str) -> bool {
        self.sent.lock().symbols.contains(symbol)
    }

    fn record_portfolio(&self, portfolio: &str) {
        self.sent.lock().portfolios.insert(portfolio.to_string());
    }

    fn record_symbol(&self, symbol: &str) {
        self.sent.lock().symbols.insert(symbol.to_string());
    }
}

#[derive(Default)]
struct Subscriptions {
    portfolios: BTreeSet<String>,
    symbols: BTreeSet<String>,
}

/// One venue connection plus the instruments streamed over it.
///
/// Venue events are consumed by a dedicated pump task; the async methods here
/// are the caller side and may be awaited from any task.
pub struct Session {
    client: Arc<dyn VenueClient>,
    config: SessionConfig,
    params: Mutex<Option<ConnectionParams>>,
    subscriptions: Mutex<Subscriptions>,
    registry: Arc<InstrumentRegistry>,
    link: Arc<Link>,
    ids: Arc<CorrelationIds>,
    shutdown: watch::Sender<bool>,
    pump: Mutex<Option<JoinHandle<()>>>,
    notices: Mutex<Option<mpsc::Receiver<SessionNotice>>>,
}

impl Session {
    /// Spawns the event pump on the current tokio runtime.
    pub fn new(
        client: Arc<dyn VenueClient>,
        events: mpsc::Receiver<VenueEvent>,
        config: SessionConfig,
    ) -> Self {
        let registry = Arc::new(InstrumentRegistry::new());
        let link = Arc::new(Link::new());
        let (notice_tx, notice_rx) = mpsc::channel(config.notice_buffer.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let dispatcher = EventDispatcher::new(registry.clone(), link.clone(), notice_tx);
        let pump = tokio::spawn(run_pump(dispatcher, events, shutdown_rx));

        Self {
            client,
            ids: Arc::new(CorrelationIds::starting_at(config.first_correlation_id)),
            config,
            params: Mutex::new(None),
            subscriptions: Mutex::new(Subscriptions::default()),
            registry,
            link,
            shutdown,
            pump: Mutex::new(Some(pump)),
            notices: Mutex::new(Some(notice_rx)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of times the venue dropped the link without being asked to.
    pub fn unexpected_disconnects(&self) -> u64 {
        self.link.unexpected_disconnects()
    }

    /// Hands out the notice stream. Only the first caller gets it.
    pub fn take_notices(&self) -> Option<mpsc::Receiver<SessionNotice>> {
        self.notices.lock().take()
    }

    pub fn instrument(&self, symbol: &str) -> Option<InstrumentHandle> {
        self.registry.get(symbol)
    }

    pub fn instruments(&self) -> Vec<InstrumentHandle> {
        self.registry.all()
    }

    fn is_terminated(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn subscriptions(&self) -> (Vec<String>, Vec<String>) {
        let subs = self.subscriptions.lock();
        (
            subs.portfolios.iter().cloned().collect(),
            subs.symbols.iter().cloned().collect(),
        )
    }

    /// Waits for the link to reach `target`. False if the pump is shutting down.
    async fn wait_for_state(&self, target: ConnectionState) -> bool {
        let mut state = self.link.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            reached = state.wait_for(|s| *s == target) => reached.is_ok(),
            _ = shutdown.wait_for(|stop| *stop) => false,
        }
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Connects and brings every registered instrument live.
    ///
    /// `params` replaces the stored parameters when given; `None` reuses the
    /// last ones. Returns `Ok(false)` when `timeout` elapses first. The venue
    /// may still complete the connection afterwards; the next `connect` then
    /// picks up the replay where the timed-out one stopped.
    pub async fn connect(&self, params: Option<ConnectionParams>, timeout: Duration) -> Result<bool> {
        if let Some(params) = params {
            *self.params.lock() = Some(params);
        }
        if self.link.is_live() {
            return Ok(true);
        }
        if self.is_terminated() {
            return Err(SessionError::Terminated);
        }
        let params = self
            .params
            .lock()
            .clone()
            .ok_or(SessionError::MissingConnectionParams)?;

        if self.is_connected() {
            info!("Link already up, resuming subscription replay");
        } else {
            for instrument in self.registry.all() {
                instrument.clear_quote();
            }
            self.link.transition(
                &[ConnectionState::Disconnected, ConnectionState::Disconnecting],
                ConnectionState::Connecting,
            );
            info!("Connecting to {}:{} as {}", params.host, params.port, params.login);
        }

        match tokio::time::timeout(timeout, self.establish(&params)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Connect timed out after {:?}", timeout);
                Ok(false)
            }
        }
    }

    async fn establish(&self, params: &ConnectionParams) -> Result<bool> {
        if !self.is_connected() {
            if let Err(e) = self.client.connect(params).await {
                self.link
                    .transition(&[ConnectionState::Connecting], ConnectionState::Disconnected);
                return Err(e.into());
            }
            if !self.wait_for_state(ConnectionState::Connected).await {
                warn!("Connect interrupted by shutdown");
                return Ok(false);
            }
        }

        // Read after `Connected`, so an instrument added while connecting is
        // either in this list or subscribed by `add_instrument` itself.
        let (portfolios, symbols) = self.subscriptions();
        for portfolio in &portfolios {
            self.subscribe_portfolio(portfolio).await?;
        }
        for symbol in &symbols {
            self.subscribe_quotes(symbol).await?;
        }

        let instruments = self.registry.all();
        let quotes = join_all(instruments.iter().map(|i| i.wait_for_quote()));
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            _ = quotes => {}
            _ = shutdown.wait_for(|stop| *stop) => {
                warn!("Connect interrupted by shutdown while waiting for quotes");
                return Ok(false);
            }
        }

        self.link.set_live();
        info!(
            "Session live: {} portfolios, {} instruments quoted",
            portfolios.len(),
            instruments.len()
        );
        Ok(true)
    }

    /// Subscribes a portfolio unless it already was over this connection.
    async fn subscribe_portfolio(&self, portfolio: &str) -> Result<()> {
        if self.link.portfolio_sent(portfolio) {
            return Ok(());
        }
        self.client.subscribe_portfolio(portfolio).await?;
        self.link.record_portfolio(portfolio);
        Ok(())
    }

    async fn subscribe_quotes(&self, symbol: &str) -> Result<()> {
        if self.link.symbol_sent(symbol) {
            return Ok(());
        }
        self.client.subscribe_quotes(symbol).await?;
        self.link.record_symbol(symbol);
        Ok(())
    }

    /// Cancels all subscriptions and closes the link.
    ///
    /// Quote windows are cleared on success; balances and positions are kept.
    pub async fn disconnect(&self, timeout: Duration) -> Result<bool> {
        self.link.request_disconnect();
        if self.state() == ConnectionState::Disconnected {
            return Ok(true);
        }
        self.link.transition(
            &[ConnectionState::Connected, ConnectionState::Connecting],
            ConnectionState::Disconnecting,
        );
        info!("Disconnecting");

        match tokio::time::timeout(timeout, self.teardown()).await {
            Ok(Ok(true)) => {
                for instrument in self.registry.all() {
                    instrument.clear_quote();
                }
                Ok(true)
            }
            Ok(Ok(false)) => {
                warn!("Disconnect interrupted by shutdown");
                Ok(false)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("Disconnect timed out after {:?}", timeout);
                Ok(false)
            }
        }
    }

    async fn teardown(&self) -> Result<bool> {
        let (portfolios, symbols) = self.subscriptions();
        for portfolio in &portfolios {
            if let Err(e) = self.client.cancel_portfolio(portfolio).await {
                warn!("Failed to cancel portfolio {}: {}", portfolio, e);
            }
        }
        for symbol in &symbols {
            if let Err(e) = self.client.cancel_quotes(symbol).await {
                warn!("Failed to cancel quotes for {}: {}", symbol, e);
            }
        }

        if let Err(e) = self.client.disconnect().await {
            self.link
                .transition(&[ConnectionState::Disconnecting], ConnectionState::Connected);
            return Err(e.into());
        }
        Ok(self.wait_for_state(ConnectionState::Disconnected).await)
    }

    // ------------------------------------------------------------------
    // Instruments
    // ------------------------------------------------------------------

    /// Starts tracking `symbol`, subscribing right away when already connected.
    ///
    /// A symbol that is already tracked keeps its original portfolio and the
    /// existing handle is returned.
    pub async fn add_instrument(&self, symbol: &str, portfolio: &str) -> Result<InstrumentHandle> {
        let handle = {
            let mut subs = self.subscriptions.lock();
            let (handle, created) = self.registry.get_or_insert_with(symbol, || {
                InstrumentState::new(
                    symbol,
                    portfolio,
                    self.client.clone(),
                    self.ids.clone(),
                    self.config.quote_poll,
                )
            });
            if !created {
                if handle.portfolio() != portfolio {
                    warn!(
                        "{} already tracked under {}, ignoring portfolio {}",
                        symbol,
                        handle.portfolio(),
                        portfolio
                    );
                }
                return Ok(handle);
            }
            subs.symbols.insert(symbol.to_string());
            subs.portfolios.insert(portfolio.to_string());
            handle
        };
        info!("Tracking {} in portfolio {}", symbol, portfolio);

        if self.is_connected() {
            self.subscribe_portfolio(portfolio).await?;
            self.subscribe_quotes(symbol).await?;
        }
        Ok(handle)
    }

    /// Balance and net position of every tracked instrument.
    pub fn snapshot(&self) -> HashMap<String, PositionState> {
        self.registry
            .all()
            .into_iter()
            .map(|i| (i.symbol().to_string(), i.get_state()))
            .collect()
    }

    /// Seeds tracked instruments from a snapshot. Unknown symbols are skipped.
    pub fn restore(&self, snapshot: &HashMap<String, PositionState>) {
        for (symbol, state) in snapshot {
            match self.registry.get(symbol) {
                Some(instrument) => {
                    instrument.set_state(*state);
                    debug!("Restored {}: {:?}", symbol, state);
                }
                None => warn!("Snapshot entry for untracked symbol {} skipped", symbol),
            }
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Stops the event pump and waits for it to exit. Later calls return at once.
    ///
    /// Pending `connect`/`disconnect` calls give up and pending bar fetches fail
    /// with [`SessionError::Terminated`]. The pump never runs caller code, so
    /// this cannot be entered from inside it.
    pub async fn terminate(&self) {
        let pump = self.pump.lock().take();
        let Some(pump) = pump else {
            debug!("Session already terminated");
            return;
        };

        self.shutdown.send_replace(true);
        for instrument in self.registry.all() {
            instrument.abort_bar_fetch(SessionError::Terminated);
        }
        if let Err(e) = pump.await {
            error!("Event pump ended abnormally: {}", e);
        }
        info!("Session terminated");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn run_pump(
    dispatcher: EventDispatcher,
    mut events: mpsc::Receiver<VenueEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Event pump running");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            event = events.recv() => match event {
                Some(event) => dispatcher.dispatch(event),
                None => {
                    warn!("Venue event stream closed");
                    break;
                }
            },
        }
    }
    info!("Event pump stopped");
}

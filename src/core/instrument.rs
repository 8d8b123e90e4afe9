// src/core/instrument.rs
use crate::connectors::traits::VenueClient;
use crate::core::order_id::CorrelationIds;
use crate::error::{Result, SessionError};
use crate::types::{
    BarInterval, OrderIntent, OrderType, OrderValidity, PositionState, QuoteRow, Side, QUOTE_DEPTH,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Close prices keyed by bar open time.
pub type Bars = BTreeMap<DateTime<Utc>, Decimal>;

pub type InstrumentHandle = Arc<InstrumentState>;

struct QuoteWindow {
    rows: Vec<QuoteRow>,
    count: usize,
}

impl QuoteWindow {
    fn empty() -> Self {
        Self {
            rows: vec![QuoteRow::default(); QUOTE_DEPTH],
            count: 0,
        }
    }
}

struct BarFetch {
    target: usize,
    until: DateTime<Utc>,
    bars: Bars,
    received: usize,
    done: oneshot::Sender<Result<Bars>>,
}

/// Live view of one symbol: quote window, trade balance and bar requests.
///
/// Writes come only from the session's event pump. Every lock is held for a
/// handful of field updates and never across an `.await`, so the pump cannot be
/// stalled by a caller sitting in [`get_minute_bars`](Self::get_minute_bars) or
/// [`wait_for_quote`](Self::wait_for_quote).
pub struct InstrumentState {
    symbol: String,
    portfolio: String,
    client: Arc<dyn VenueClient>,
    ids: Arc<CorrelationIds>,
    quote_poll: Duration,
    quotes: RwLock<QuoteWindow>,
    position: Mutex<PositionState>,
    flat: watch::Sender<bool>,
    bar_fetch: Mutex<Option<BarFetch>>,
}

impl InstrumentState {
    pub fn new(
        symbol: impl Into<String>,
        portfolio: impl Into<String>,
        client: Arc<dyn VenueClient>,
        ids: Arc<CorrelationIds>,
        quote_poll: Duration,
    ) -> Self {
        let (flat, _) = watch::channel(true);
        Self {
            symbol: symbol.into(),
            portfolio: portfolio.into(),
            client,
            ids,
            quote_poll,
            quotes: RwLock::new(QuoteWindow::empty()),
            position: Mutex::new(PositionState::default()),
            flat,
            bar_fetch: Mutex::new(None),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn portfolio(&self) -> &str {
        &self.portfolio
    }

    // ------------------------------------------------------------------
    // Quote window
    // ------------------------------------------------------------------

    /// Stores one row of the book. The row count always follows `total_rows`,
    /// even when the row itself lies past the window and is dropped.
    pub fn update_quote(&self, row: usize, total_rows: usize, quote: QuoteRow) {
        let mut window = self.quotes.write();
        window.count = total_rows.min(QUOTE_DEPTH);
        match window.rows.get_mut(row) {
            Some(slot) => *slot = quote,
            None => debug!(symbol = %self.symbol, row, "quote row beyond window depth dropped"),
        }
    }

    pub fn clear_quote(&self) {
        *self.quotes.write() = QuoteWindow::empty();
    }

    /// Number of rows the venue last reported as valid.
    pub fn quote_rows(&self) -> usize {
        self.quotes.read().count
    }

    pub fn quote(&self, row: usize) -> Option<QuoteRow> {
        self.quotes.read().rows.get(row).copied()
    }

    /// Top of book, once both sides are priced.
    pub fn best_quote(&self) -> Option<QuoteRow> {
        let top = self.quotes.read().rows[0];
        top.is_valid().then_some(top)
    }

    /// Polls until row 0 carries a non-zero bid and ask.
    pub async fn wait_for_quote(&self) -> QuoteRow {
        loop {
            if let Some(top) = self.best_quote() {
                return top;
            }
            tokio::time::sleep(self.quote_poll).await;
        }
    }

    // ------------------------------------------------------------------
    // Trades and position
    // ------------------------------------------------------------------

    /// Books a fill. A negative `amount` is a sale.
    pub fn add_trade(&self, price: Decimal, amount: Decimal) {
        let mut position = self.position.lock();
        position.balance += price * amount;
        position.net_position += amount;
        self.flat.send_replace(position.net_position.is_zero());
        debug!(
            "Trade for {}, amount {}, price {}",
            self.symbol, amount, price
        );
    }

    /// Overrides balance and net position, e.g. from a persisted snapshot.
    pub fn set_state(&self, state: PositionState) {
        let mut position = self.position.lock();
        *position = state;
        self.flat.send_replace(position.net_position.is_zero());
    }

    pub fn get_state(&self) -> PositionState {
        *self.position.lock()
    }

    pub fn get_balance(&self) -> Decimal {
        self.position.lock().balance
    }

    pub fn net_position(&self) -> Decimal {
        self.position.lock().net_position
    }

    pub fn is_flat(&self) -> bool {
        *self.flat.borrow()
    }

    /// Resolves once the net position is exactly zero.
    pub async fn wait_flat(&self) {
        let mut rx = self.flat.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|flat| *flat).await;
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Sends a good-till-cancelled limit order and returns its correlation id.
    ///
    /// Acknowledgement arrives later as a session notice.
    pub async fn place_limit_order(&self, price: Decimal, amount: Decimal, side: Side) -> Result<u64> {
        let order = OrderIntent {
            portfolio: self.portfolio.clone(),
            symbol: self.symbol.clone(),
            side,
            order_type: OrderType::Limit,
            validity: OrderValidity::Gtc,
            price,
            amount,
            stop_price: Decimal::ZERO,
            correlation_id: self.ids.next(),
        };
        info!(
            "Placing limit {:?} {} {} @ {} (cookie {})",
            side, amount, self.symbol, price, order.correlation_id
        );
        self.client.place_order(&order).await?;
        Ok(order.correlation_id)
    }

    // ------------------------------------------------------------------
    // Bars
    // ------------------------------------------------------------------

    /// Requests `count` one-minute bars ending at `until` and waits for all of them.
    ///
    /// Only one fetch may be in flight per instrument. A fetch whose caller
    /// stopped waiting still holds the slot until its bars have all arrived
    /// or the link drops, so its bars never land in a later fetch.
    pub async fn get_minute_bars(&self, count: usize, until: DateTime<Utc>) -> Result<Bars> {
        if count == 0 {
            return Ok(Bars::new());
        }

        let done = {
            let mut slot = self.bar_fetch.lock();
            if slot.is_some() {
                return Err(SessionError::BarFetchInProgress {
                    symbol: self.symbol.clone(),
                });
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(BarFetch {
                target: count,
                until,
                bars: Bars::new(),
                received: 0,
                done: tx,
            });
            rx
        };

        if let Err(e) = self
            .client
            .request_bars(&self.symbol, BarInterval::OneMinute, until, count)
            .await
        {
            self.bar_fetch.lock().take();
            return Err(e.into());
        }

        done.await.map_err(|_| SessionError::Terminated)?
    }

    pub fn bar_fetch_pending(&self) -> bool {
        self.bar_fetch.lock().is_some()
    }

    /// Feeds one bar into the in-flight fetch, completing it on the last one.
    pub fn add_bar(&self, timestamp: DateTime<Utc>, close: Decimal, total_rows: usize) {
        let mut slot = self.bar_fetch.lock();
        let Some(fetch) = slot.as_mut() else {
            debug!(symbol = %self.symbol, %timestamp, "bar without a pending fetch dropped");
            return;
        };

        fetch.bars.insert(timestamp, close);
        fetch.received += 1;

        // The venue may hold fewer bars than were asked for.
        let expected = if total_rows > 0 {
            fetch.target.min(total_rows)
        } else {
            fetch.target
        };
        if fetch.received < expected {
            return;
        }

        if let Some(fetch) = slot.take() {
            debug!(
                "Bar fetch for {} until {} complete: {} bars",
                self.symbol,
                fetch.until,
                fetch.bars.len()
            );
            // Receiver gone means the caller stopped waiting.
            let _ = fetch.done.send(Ok(fetch.bars));
        }
    }

    /// Fails any in-flight fetch with `error` and frees the slot.
    pub fn abort_bar_fetch(&self, error: SessionError) {
        if let Some(fetch) = self.bar_fetch.lock().take() {
            warn!(symbol = %self.symbol, "pending bar fetch aborted: {}", error);
            let _ = fetch.done.send(Err(error));
        }
    }
}

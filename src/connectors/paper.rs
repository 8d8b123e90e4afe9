// src/connectors/paper.rs
use crate::connectors::messages::VenueEvent;
use crate::connectors::traits::VenueClient;
use crate::types::{BarInterval, ConnectionParams, OrderIntent, OrderType, QuoteRow, Side};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration as StdDuration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A request the paper venue received, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueCall {
    Connect(ConnectionParams),
    Disconnect,
    SubscribePortfolio(String),
    CancelPortfolio(String),
    SubscribeQuotes(String),
    CancelQuotes(String),
    PlaceOrder(OrderIntent),
    RequestBars {
        symbol: String,
        interval: BarInterval,
        until: DateTime<Utc>,
        count: usize,
    },
}

#[derive(Debug, Clone)]
pub struct PaperSettings {
    /// Answer connect/disconnect/subscribe/bar requests with the matching events.
    pub auto_respond: bool,
    /// Fill every limit order in full at its limit price.
    pub fill_orders: bool,
    /// Top-of-book row published on quote subscription.
    pub quote: QuoteRow,
    /// Close of the oldest synthetic bar; each later bar closes one unit higher.
    pub bar_base: Decimal,
    /// Round trip of a quote subscription. The call is recorded once it completes.
    pub subscribe_latency: StdDuration,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            auto_respond: true,
            fill_orders: true,
            quote: QuoteRow {
                bid: Decimal::new(10000, 2),
                bid_size: Decimal::from(10),
                ask: Decimal::new(10010, 2),
                ask_size: Decimal::from(10),
            },
            bar_base: Decimal::from(100),
            subscribe_latency: StdDuration::ZERO,
        }
    }
}

/// In-process venue used for paper trading and tests.
///
/// Records every call and, depending on [`PaperSettings`], pushes back the
/// events a live venue would.
pub struct PaperVenue {
    events: mpsc::Sender<VenueEvent>,
    settings: PaperSettings,
    calls: Mutex<Vec<VenueCall>>,
    order_seq: AtomicU64,
}

impl PaperVenue {
    pub fn new(events: mpsc::Sender<VenueEvent>, settings: PaperSettings) -> Self {
        Self {
            events,
            settings,
            calls: Mutex::new(Vec::new()),
            order_seq: AtomicU64::new(1),
        }
    }

    /// A venue that records calls but never answers on its own.
    pub fn silent(events: mpsc::Sender<VenueEvent>) -> Self {
        Self::new(
            events,
            PaperSettings {
                auto_respond: false,
                fill_orders: false,
                ..PaperSettings::default()
            },
        )
    }

    /// Pushes an arbitrary event into the session's stream.
    pub async fn emit(&self, event: VenueEvent) -> Result<()> {
        debug!(kind = event.kind(), "paper venue emitting event");
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("Event channel closed"))
    }

    pub fn calls(&self) -> Vec<VenueCall> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, call: &VenueCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: VenueCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    async fn connect(&self, params: &ConnectionParams) -> Result<()> {
        info!("Paper venue: connect to {}:{} as {}", params.host, params.port, params.login);
        self.record(VenueCall::Connect(params.clone()));
        if self.settings.auto_respond {
            self.emit(VenueEvent::Connected).await?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(VenueCall::Disconnect);
        if self.settings.auto_respond {
            self.emit(VenueEvent::Disconnected {
                reason: "Client request".to_string(),
            })
            .await?;
        }
        Ok(())
    }

    async fn subscribe_portfolio(&self, portfolio: &str) -> Result<()> {
        self.record(VenueCall::SubscribePortfolio(portfolio.to_string()));
        Ok(())
    }

    async fn cancel_portfolio(&self, portfolio: &str) -> Result<()> {
        self.record(VenueCall::CancelPortfolio(portfolio.to_string()));
        Ok(())
    }

    async fn subscribe_quotes(&self, symbol: &str) -> Result<()> {
        if !self.settings.subscribe_latency.is_zero() {
            tokio::time::sleep(self.settings.subscribe_latency).await;
        }
        self.record(VenueCall::SubscribeQuotes(symbol.to_string()));
        if self.settings.auto_respond {
            let q = self.settings.quote;
            self.emit(VenueEvent::UpdateBidAsk {
                symbol: symbol.to_string(),
                row: 0,
                total_rows: 1,
                bid: q.bid,
                bid_size: q.bid_size,
                ask: q.ask,
                ask_size: q.ask_size,
            })
            .await?;
        }
        Ok(())
    }

    async fn cancel_quotes(&self, symbol: &str) -> Result<()> {
        self.record(VenueCall::CancelQuotes(symbol.to_string()));
        Ok(())
    }

    async fn place_order(&self, order: &OrderIntent) -> Result<()> {
        info!(
            "Paper order #{}: {:?} {} {} @ {}",
            order.correlation_id, order.side, order.amount, order.symbol, order.price
        );
        self.record(VenueCall::PlaceOrder(order.clone()));

        if !self.settings.fill_orders || order.order_type != OrderType::Limit {
            return Ok(());
        }

        let order_id = format!("paper-{}", self.order_seq.fetch_add(1, Ordering::Relaxed));
        self.emit(VenueEvent::OrderSucceeded {
            correlation_id: order.correlation_id,
            order_id: order_id.clone(),
        })
        .await?;

        let amount = match order.side {
            Side::Buy => order.amount,
            Side::Sell => -order.amount,
        };
        self.emit(VenueEvent::AddTrade {
            portfolio: order.portfolio.clone(),
            symbol: order.symbol.clone(),
            order_id: order_id.clone(),
            price: order.price,
            amount,
            timestamp: Utc::now(),
            trade_no: order_id,
        })
        .await
    }

    async fn request_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
        until: DateTime<Utc>,
        count: usize,
    ) -> Result<()> {
        self.record(VenueCall::RequestBars {
            symbol: symbol.to_string(),
            interval,
            until,
            count,
        });
        if !self.settings.auto_respond {
            return Ok(());
        }

        for row in 0..count {
            let age = (count - 1 - row) as i64;
            let close = self.settings.bar_base + Decimal::from(row);
            self.emit(VenueEvent::AddBar {
                row,
                total_rows: count,
                symbol: symbol.to_string(),
                interval,
                timestamp: until - Duration::minutes(age),
                open: close,
                high: close,
                low: close,
                close,
                volume: Decimal::ONE,
                open_interest: Decimal::ZERO,
            })
            .await?;
        }
        Ok(())
    }
}

// src/connectors/messages.rs
use crate::types::{BarInterval, OrderType, OrderValidity, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Everything the venue can push at us.
///
/// Only a handful of variants drive session state; the rest are accepted so the
/// dispatcher can ignore them explicitly instead of choking on them.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueEvent {
    Connected,
    Disconnected {
        reason: String,
    },
    UpdateBidAsk {
        symbol: String,
        row: usize,
        total_rows: usize,
        bid: Decimal,
        bid_size: Decimal,
        ask: Decimal,
        ask_size: Decimal,
    },
    AddTrade {
        portfolio: String,
        symbol: String,
        order_id: String,
        price: Decimal,
        amount: Decimal,
        timestamp: DateTime<Utc>,
        trade_no: String,
    },
    AddBar {
        row: usize,
        total_rows: usize,
        symbol: String,
        interval: BarInterval,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        open_interest: Decimal,
    },
    OrderSucceeded {
        correlation_id: u64,
        order_id: String,
    },
    OrderFailed {
        correlation_id: u64,
        order_id: String,
        reason: String,
    },

    // --- Accepted but not acted upon ---
    SetPortfolio {
        portfolio: String,
        cash: Decimal,
        leverage: Decimal,
        commission: Decimal,
        saldo: Decimal,
    },
    AddPortfolio {
        row: usize,
        total_rows: usize,
        name: String,
        exchange: String,
        status: String,
    },
    AddSymbol {
        row: usize,
        total_rows: usize,
        symbol: String,
        short_name: String,
        lot_size: Decimal,
        step: Decimal,
    },
    UpdatePosition {
        portfolio: String,
        symbol: String,
        avg_price: Decimal,
        amount: Decimal,
        planned: Decimal,
    },
    AddTick {
        symbol: String,
        timestamp: DateTime<Utc>,
        price: Decimal,
        volume: Decimal,
        trade_no: String,
        side: Side,
    },
    AddTickHistory {
        row: usize,
        total_rows: usize,
        symbol: String,
        timestamp: DateTime<Utc>,
        price: Decimal,
        volume: Decimal,
    },
    SetMyTrade {
        portfolio: String,
        symbol: String,
        timestamp: DateTime<Utc>,
        price: Decimal,
        volume: Decimal,
        side: Side,
        order_no: String,
    },
    SetMyOrder {
        portfolio: String,
        symbol: String,
        side: Side,
        order_type: OrderType,
        validity: OrderValidity,
        price: Decimal,
        amount: Decimal,
        order_id: String,
        correlation_id: u64,
    },
    UpdateOrder {
        portfolio: String,
        symbol: String,
        state: String,
        price: Decimal,
        amount: Decimal,
        filled: Decimal,
        order_id: String,
        correlation_id: u64,
    },
    SetMyClosePos {
        portfolio: String,
        symbol: String,
        amount: Decimal,
        price_buy: Decimal,
        price_sell: Decimal,
    },
    UpdateQuote {
        symbol: String,
        timestamp: DateTime<Utc>,
        last: Decimal,
        volume: Decimal,
        bid: Decimal,
        ask: Decimal,
    },
    OrderMoveSucceeded {
        order_id: String,
    },
    OrderMoveFailed {
        order_id: String,
    },
    OrderCancelSucceeded {
        order_id: String,
    },
    OrderCancelFailed {
        order_id: String,
    },
    SubscriptionCheckResult {
        result: bool,
    },
}

impl VenueEvent {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            VenueEvent::Connected => "connected",
            VenueEvent::Disconnected { .. } => "disconnected",
            VenueEvent::UpdateBidAsk { .. } => "update_bid_ask",
            VenueEvent::AddTrade { .. } => "add_trade",
            VenueEvent::AddBar { .. } => "add_bar",
            VenueEvent::OrderSucceeded { .. } => "order_succeeded",
            VenueEvent::OrderFailed { .. } => "order_failed",
            VenueEvent::SetPortfolio { .. } => "set_portfolio",
            VenueEvent::AddPortfolio { .. } => "add_portfolio",
            VenueEvent::AddSymbol { .. } => "add_symbol",
            VenueEvent::UpdatePosition { .. } => "update_position",
            VenueEvent::AddTick { .. } => "add_tick",
            VenueEvent::AddTickHistory { .. } => "add_tick_history",
            VenueEvent::SetMyTrade { .. } => "set_my_trade",
            VenueEvent::SetMyOrder { .. } => "set_my_order",
            VenueEvent::UpdateOrder { .. } => "update_order",
            VenueEvent::SetMyClosePos { .. } => "set_my_close_pos",
            VenueEvent::UpdateQuote { .. } => "update_quote",
            VenueEvent::OrderMoveSucceeded { .. } => "order_move_succeeded",
            VenueEvent::OrderMoveFailed { .. } => "order_move_failed",
            VenueEvent::OrderCancelSucceeded { .. } => "order_cancel_succeeded",
            VenueEvent::OrderCancelFailed { .. } => "order_cancel_failed",
            VenueEvent::SubscriptionCheckResult { .. } => "subscription_check_result",
        }
    }
}

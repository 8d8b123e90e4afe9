// src/types.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of rows kept in an instrument's quote window.
pub const QUOTE_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderValidity {
    Day,
    Gtc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarInterval {
    Tick,
    OneMinute,
    FiveMinutes,
    TenMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    OneDay,
}

/// Connection parameters handed to the venue on `connect`.
///
/// The session keeps its own copy, so callers may reuse or drop theirs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
}

/// One row of the best bid/ask window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRow {
    pub bid: Decimal,
    pub bid_size: Decimal,
    pub ask: Decimal,
    pub ask_size: Decimal,
}

impl QuoteRow {
    /// Both sides carry a non-zero price.
    pub fn is_valid(&self) -> bool {
        !self.bid.is_zero() && !self.ask.is_zero()
    }
}

/// Accumulated trade balance and net position of an instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    pub balance: Decimal,
    pub net_position: Decimal,
}

/// An order as submitted to the venue. Not retained after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub portfolio: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub validity: OrderValidity,
    pub price: Decimal,
    pub amount: Decimal,
    pub stop_price: Decimal,
    pub correlation_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Conditions surfaced to the application by the event pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Connected,
    /// `expected` is false when the venue dropped us without a prior `disconnect()`.
    Disconnected { reason: String, expected: bool },
    OrderSucceeded { correlation_id: u64, order_id: String },
    OrderFailed {
        correlation_id: u64,
        order_id: String,
        reason: String,
    },
}

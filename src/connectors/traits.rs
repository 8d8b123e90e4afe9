use crate::types::{BarInterval, ConnectionParams, OrderIntent};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Handle to the broker connection.
///
/// Every call only *issues* a request. Confirmations arrive later as
/// [`VenueEvent`](crate::connectors::messages::VenueEvent)s on the channel the
/// implementation was built with. An `Err` means the request never left.
#[async_trait]
pub trait VenueClient: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn subscribe_portfolio(&self, portfolio: &str) -> Result<()>;

    async fn cancel_portfolio(&self, portfolio: &str) -> Result<()>;

    async fn subscribe_quotes(&self, symbol: &str) -> Result<()>;

    async fn cancel_quotes(&self, symbol: &str) -> Result<()>;

    async fn place_order(&self, order: &OrderIntent) -> Result<()>;

    // `count` bars of `interval` ending at `until`
    async fn request_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
        until: DateTime<Utc>,
        count: usize,
    ) -> Result<()>;
}

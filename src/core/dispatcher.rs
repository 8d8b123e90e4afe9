// src/core/dispatcher.rs
use crate::connectors::messages::VenueEvent;
use crate::core::registry::InstrumentRegistry;
use crate::core::session::Link;
use crate::error::SessionError;
use crate::types::{QuoteRow, SessionNotice};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Routes venue events to the session link or to the addressed instrument.
///
/// Runs on the event pump only. Nothing in here waits on a caller.
pub struct EventDispatcher {
    registry: Arc<InstrumentRegistry>,
    link: Arc<Link>,
    notices: mpsc::Sender<SessionNotice>,
}

impl EventDispatcher {
    pub(crate) fn new(
        registry: Arc<InstrumentRegistry>,
        link: Arc<Link>,
        notices: mpsc::Sender<SessionNotice>,
    ) -> Self {
        Self {
            registry,
            link,
            notices,
        }
    }

    pub fn dispatch(&self, event: VenueEvent) {
        match event {
            VenueEvent::Connected => self.on_connected(),
            VenueEvent::Disconnected { reason } => self.on_disconnected(reason),
            VenueEvent::UpdateBidAsk {
                symbol,
                row,
                total_rows,
                bid,
                bid_size,
                ask,
                ask_size,
            } => {
                if let Some(instrument) = self.registry.get(&symbol) {
                    instrument.update_quote(
                        row,
                        total_rows,
                        QuoteRow {
                            bid,
                            bid_size,
                            ask,
                            ask_size,
                        },
                    );
                }
            }
            VenueEvent::AddTrade {
                symbol,
                price,
                amount,
                timestamp,
                trade_no,
                ..
            } => {
                if self.link.is_stale(timestamp) {
                    debug!(%symbol, %trade_no, %timestamp, "trade predates current connection, skipped");
                    return;
                }
                if let Some(instrument) = self.registry.get(&symbol) {
                    instrument.add_trade(price, amount);
                }
            }
            VenueEvent::AddBar {
                symbol,
                total_rows,
                timestamp,
                close,
                ..
            } => {
                if let Some(instrument) = self.registry.get(&symbol) {
                    instrument.add_bar(timestamp, close, total_rows);
                }
            }
            VenueEvent::OrderSucceeded {
                correlation_id,
                order_id,
            } => {
                debug!("Order {} accepted as {}", correlation_id, order_id);
                self.notify(SessionNotice::OrderSucceeded {
                    correlation_id,
                    order_id,
                });
            }
            VenueEvent::OrderFailed {
                correlation_id,
                order_id,
                reason,
            } => {
                warn!("Order {} ({}) failed: {}", correlation_id, order_id, reason);
                self.notify(SessionNotice::OrderFailed {
                    correlation_id,
                    order_id,
                    reason,
                });
            }
            other => debug!(kind = other.kind(), "venue event ignored"),
        }
    }

    fn on_connected(&self) {
        self.link.mark_connected();
        info!("Connected");
        self.notify(SessionNotice::Connected);
    }

    fn on_disconnected(&self, reason: String) {
        let expected = self.link.mark_disconnected();
        if expected {
            info!("Disconnected: {}", reason);
        } else {
            warn!("Unexpected disconnect: {}", reason);
        }
        // Bar requests die with the connection.
        for instrument in self.registry.all() {
            instrument.abort_bar_fetch(SessionError::BarFetchAborted {
                symbol: instrument.symbol().to_string(),
            });
        }
        self.notify(SessionNotice::Disconnected { reason, expected });
    }

    fn notify(&self, notice: SessionNotice) {
        match self.notices.try_send(notice) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(notice)) => {
                warn!("Notice channel full, dropping {:?}", notice);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::paper::PaperVenue;
    use crate::core::instrument::{InstrumentHandle, InstrumentState};
    use crate::core::order_id::CorrelationIds;
    use crate::types::ConnectionState;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Harness {
        dispatcher: EventDispatcher,
        link: Arc<Link>,
        abc: InstrumentHandle,
        notices: mpsc::Receiver<SessionNotice>,
        _events: mpsc::Receiver<VenueEvent>,
    }

    fn harness() -> Harness {
        let (tx, events) = mpsc::channel(16);
        let venue = Arc::new(PaperVenue::silent(tx));
        let registry = Arc::new(InstrumentRegistry::new());
        let (abc, _) = registry.get_or_insert_with("ABC", || {
            InstrumentState::new(
                "ABC",
                "P1",
                venue.clone(),
                Arc::new(CorrelationIds::new()),
                Duration::from_millis(5),
            )
        });
        let link = Arc::new(Link::new());
        let (notice_tx, notices) = mpsc::channel(16);
        Harness {
            dispatcher: EventDispatcher::new(registry, link.clone(), notice_tx),
            link,
            abc,
            notices,
            _events: events,
        }
    }

    fn trade(symbol: &str, price: Decimal, amount: Decimal, age: ChronoDuration) -> VenueEvent {
        VenueEvent::AddTrade {
            portfolio: "P1".to_string(),
            symbol: symbol.to_string(),
            order_id: "1".to_string(),
            price,
            amount,
            timestamp: Utc::now() - age,
            trade_no: "t1".to_string(),
        }
    }

    #[test]
    fn test_connection_events_drive_state() {
        let mut h = harness();
        h.dispatcher.dispatch(VenueEvent::Connected);
        assert_eq!(h.link.state(), ConnectionState::Connected);
        assert_eq!(h.notices.try_recv().unwrap(), SessionNotice::Connected);

        h.link.request_disconnect();
        h.dispatcher.dispatch(VenueEvent::Disconnected {
            reason: "bye".to_string(),
        });
        assert_eq!(h.link.state(), ConnectionState::Disconnected);
        assert_eq!(
            h.notices.try_recv().unwrap(),
            SessionNotice::Disconnected {
                reason: "bye".to_string(),
                expected: true,
            }
        );
        assert_eq!(h.link.unexpected_disconnects(), 0);
    }

    #[test]
    fn test_unexpected_disconnect_is_flagged() {
        let mut h = harness();
        h.dispatcher.dispatch(VenueEvent::Connected);
        let _ = h.notices.try_recv();

        h.dispatcher.dispatch(VenueEvent::Disconnected {
            reason: "socket reset".to_string(),
        });
        assert_eq!(
            h.notices.try_recv().unwrap(),
            SessionNotice::Disconnected {
                reason: "socket reset".to_string(),
                expected: false,
            }
        );
        assert_eq!(h.link.unexpected_disconnects(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_bar_fetch() {
        let h = harness();
        h.dispatcher.dispatch(VenueEvent::Connected);

        let fetch = {
            let abc = h.abc.clone();
            tokio::spawn(async move { abc.get_minute_bars(5, Utc::now()).await })
        };
        while !h.abc.bar_fetch_pending() {
            tokio::task::yield_now().await;
        }

        h.dispatcher.dispatch(VenueEvent::Disconnected {
            reason: "socket reset".to_string(),
        });
        let err = fetch.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::BarFetchAborted { ref symbol } if symbol == "ABC"));
        assert!(!h.abc.bar_fetch_pending());
    }

    #[test]
    fn test_trades_before_connection_time_are_discarded() {
        let h = harness();
        h.dispatcher.dispatch(VenueEvent::Connected);

        h.dispatcher
            .dispatch(trade("ABC", dec!(100), dec!(5), ChronoDuration::hours(1)));
        assert_eq!(h.abc.get_balance(), Decimal::ZERO);

        h.dispatcher
            .dispatch(trade("ABC", dec!(100), dec!(5), ChronoDuration::seconds(-1)));
        assert_eq!(h.abc.get_balance(), dec!(500));
        assert_eq!(h.abc.net_position(), dec!(5));
    }

    #[test]
    fn test_events_for_unknown_symbols_are_dropped() {
        let h = harness();
        h.dispatcher
            .dispatch(trade("XYZ", dec!(1), dec!(1), ChronoDuration::zero()));
        h.dispatcher.dispatch(VenueEvent::UpdateBidAsk {
            symbol: "XYZ".to_string(),
            row: 0,
            total_rows: 1,
            bid: dec!(1),
            bid_size: dec!(1),
            ask: dec!(2),
            ask_size: dec!(1),
        });
        assert_eq!(h.abc.quote_rows(), 0);
        assert_eq!(h.abc.get_balance(), Decimal::ZERO);
    }

    #[test]
    fn test_quotes_are_routed_by_symbol() {
        let h = harness();
        h.dispatcher.dispatch(VenueEvent::UpdateBidAsk {
            symbol: "ABC".to_string(),
            row: 0,
            total_rows: 3,
            bid: dec!(9.9),
            bid_size: dec!(4),
            ask: dec!(10.1),
            ask_size: dec!(6),
        });
        assert_eq!(h.abc.quote_rows(), 3);
        assert_eq!(h.abc.best_quote().unwrap().bid_size, dec!(4));
    }

    #[test]
    fn test_order_failures_are_surfaced() {
        let mut h = harness();
        h.dispatcher.dispatch(VenueEvent::OrderFailed {
            correlation_id: 7,
            order_id: "".to_string(),
            reason: "insufficient margin".to_string(),
        });
        assert_eq!(
            h.notices.try_recv().unwrap(),
            SessionNotice::OrderFailed {
                correlation_id: 7,
                order_id: "".to_string(),
                reason: "insufficient margin".to_string(),
            }
        );
    }

    #[test]
    fn test_long_tail_events_are_ignored() {
        let mut h = harness();
        h.dispatcher.dispatch(VenueEvent::SubscriptionCheckResult { result: true });
        h.dispatcher.dispatch(VenueEvent::OrderCancelFailed {
            order_id: "42".to_string(),
        });
        h.dispatcher.dispatch(VenueEvent::UpdatePosition {
            portfolio: "P1".to_string(),
            symbol: "ABC".to_string(),
            avg_price: dec!(1),
            amount: dec!(1),
            planned: Decimal::ZERO,
        });
        assert!(h.notices.try_recv().is_err());
        assert_eq!(h.abc.net_position(), Decimal::ZERO);
        assert_eq!(h.link.state(), ConnectionState::Disconnected);
    }
}

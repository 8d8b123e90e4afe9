//! Venue session core: one broker connection, its event pump, and the live
//! per-instrument view (quotes, trade balance, bar fetches) built from it.

pub mod config;
pub mod connectors;
pub mod core;
pub mod error;
pub mod storage;
pub mod types;

pub use crate::connectors::messages::VenueEvent;
pub use crate::connectors::traits::VenueClient;
pub use crate::core::instrument::{Bars, InstrumentHandle, InstrumentState};
pub use crate::core::session::Session;
pub use crate::error::{Result, SessionError};

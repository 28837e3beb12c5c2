//! Core data types shared across the ingestion and detection pipeline.

pub mod alert;
pub mod bar;
pub mod instrument;

pub use alert::{
    Alert, AlertKind, AlertPayload, BasisDirection, BasisPayload, CrossExchangePayload,
    VolatilityPayload,
};
pub use bar::{Bar, Ticker};
pub use instrument::{Instrument, InstrumentKind, MarketMeta, VenueId, STABLECOINS};

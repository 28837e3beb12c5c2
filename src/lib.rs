//! Market Anomaly Radar
//!
//! A five-layer pipeline — exchange adapters, symbol catalog, market state
//! store, stream supervisor, detectors — that streams candle and ticker
//! data across several exchanges and emits alerts on volatility spikes,
//! spot/futures basis gaps, and cross-exchange perpetual spreads.

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod detectors;
pub mod error;
pub mod model;
pub mod notifier;
pub mod store;
pub mod supervisor;

//! Protocole de synchronisation côté écran

pub mod backoff;
pub mod client;
pub mod gate;
#[cfg(feature = "client")]
pub mod http;

pub use backoff::{Backoff, BackoffPolicy, RetryDelay};
pub use client::{DisplaySink, LocalSource, PollOutcome, StateSource, SyncClient, SyncOptions};
pub use gate::{PollGate, PollPermit};
#[cfg(feature = "client")]
pub use http::HttpSource;

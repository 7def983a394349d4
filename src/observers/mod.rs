//! # Runtime observers.
//!
//! ```text
//! Registry / Dispatch / SourceActor ── publish(Event) ──► Bus
//!                                                          │
//!                                     observer listener ◄──┘
//!                                              │
//!                                         ObserverSet::emit
//!                                     ┌────────┼────────┐
//!                                     ▼        ▼        ▼
//!                                 LogWriter  Metrics  Custom
//! ```

mod observe;
mod observer_set;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use observe::Observe;
pub use observer_set::ObserverSet;

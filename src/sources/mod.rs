//! # Event sources feeding a broker.
//!
//! - [`Source`] is the trait; [`SourceRef`] the shared handle.
//! - [`SourceFn`] runs a closure per connection attempt.
//! - [`StreamSource`] adapts a `futures::Stream` (RPC streams, queue consumers).
//! - [`JsonLinesSource`] replays newline-delimited JSON records from a file.
//! - [`IntervalSource`] emits on a timer.
//!
//! Each source is driven by a reconnecting runner started with
//! [`Broker::spawn_source`](crate::Broker::spawn_source) or
//! [`Broker::run_until_shutdown`](crate::Broker::run_until_shutdown).

mod actor;
mod interval;
mod json_lines;
mod source;
mod source_fn;
mod stream;

pub(crate) use actor::SourceActor;
pub use interval::IntervalSource;
pub use json_lines::JsonLinesSource;
pub use source::{Source, SourceRef};
pub use source_fn::SourceFn;
pub use stream::StreamSource;

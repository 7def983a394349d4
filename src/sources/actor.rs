//! # SourceActor: reconnecting runner for one source.
//!
//! ```text
//! loop {
//!   ├─► publish SourceStarting{attempt}
//!   ├─► source.run(publisher, child_token)
//!   │     ├─ Ok(())          → SourceCompleted → exit
//!   │     ├─ Err(Canceled)   → exit
//!   │     ├─ Err(Fatal)      → SourceDead      → exit
//!   │     └─ Err(Fail)       → SourceFailed
//!   │                            └─► ReconnectScheduled{delay} → sleep (cancellable)
//! }
//! ```
//!
//! ## Rules
//! - Runs are sequential; the attempt counter never resets.
//! - The backoff streak resets after a run that stayed up at least `backoff.max`.
//! - Cancellation is honored before each run and during the reconnect sleep.

use std::sync::Arc;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::Publisher;
use crate::error::SourceError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::sources::Source;

pub(crate) struct SourceActor<K, V> {
    pub source: Arc<dyn Source<K, V>>,
    pub publisher: Publisher<K, V>,
    pub backoff: BackoffPolicy,
    pub bus: Bus,
}

impl<K, V> SourceActor<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    pub(crate) async fn run(self, token: CancellationToken) {
        let name = self.source.name().to_owned();
        let mut attempt: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            if token.is_cancelled() {
                break;
            }
            attempt = attempt.saturating_add(1);
            debug!(source = %name, attempt, "source starting");
            self.bus.publish(
                Event::new(EventKind::SourceStarting)
                    .with_source(name.as_str())
                    .with_attempt(attempt),
            );

            let started = Instant::now();
            let res = self
                .source
                .run(self.publisher.clone(), token.child_token())
                .await;

            match res {
                Ok(()) => {
                    info!(source = %name, attempt, "source completed");
                    self.bus.publish(
                        Event::new(EventKind::SourceCompleted)
                            .with_source(name.as_str())
                            .with_attempt(attempt),
                    );
                    break;
                }
                Err(SourceError::Canceled) => {
                    debug!(source = %name, "source cancelled");
                    break;
                }
                Err(SourceError::Fatal { reason }) => {
                    error!(source = %name, attempt, %reason, "source stopped permanently");
                    self.bus.publish(
                        Event::new(EventKind::SourceDead)
                            .with_source(name.as_str())
                            .with_attempt(attempt)
                            .with_reason(reason),
                    );
                    break;
                }
                Err(SourceError::Fail { reason }) => {
                    if token.is_cancelled() {
                        break;
                    }
                    if started.elapsed() >= self.backoff.max {
                        failures = 0;
                    }
                    let delay = self.backoff.next(failures);
                    failures = failures.saturating_add(1);

                    warn!(source = %name, attempt, %reason, ?delay, "source failed, reconnecting");
                    self.bus.publish(
                        Event::new(EventKind::SourceFailed)
                            .with_source(name.as_str())
                            .with_attempt(attempt)
                            .with_reason(reason.as_str()),
                    );
                    self.bus.publish(
                        Event::new(EventKind::ReconnectScheduled)
                            .with_source(name.as_str())
                            .with_attempt(attempt)
                            .with_delay(delay)
                            .with_reason(reason),
                    );

                    let sleep = time::sleep(delay);
                    tokio::pin!(sleep);
                    tokio::select! {
                        _ = &mut sleep => {}
                        _ = token.cancelled() => break,
                    }
                }
            }
        }
    }
}

//! # Example: Notification Gateway
//!
//! A deposit feed fans out to per-user client connections.
//!
//! - `deposits` source emits a deposit for a random user every 150ms, fails once
//!   mid-way to show the reconnect, then finishes after 40 events;
//! - three clients connect for different users, read for a while and disconnect;
//! - the `LogWriter` observer prints the runtime events through `tracing`.
//!
//! Run with: `RUST_LOG=info cargo run --example notification_gateway`

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use keyfan::{BackoffPolicy, Broker, BrokerConfig, Publisher, SourceError, SourceFn, SourceRef};

const USERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Deposit {
    user_id: String,
    asset: String,
    amount: u64,
}

fn deposit_feed() -> SourceRef<String, Deposit> {
    let emitted = Arc::new(AtomicU32::new(0));
    SourceFn::arc("deposits", move |publisher: Publisher<String, Deposit>, ctx: CancellationToken| {
        let emitted = Arc::clone(&emitted);
        async move {
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return Err(SourceError::Canceled),
                    _ = tokio::time::sleep(Duration::from_millis(150)) => {}
                }
                let n = emitted.fetch_add(1, Ordering::SeqCst);
                if n == 15 {
                    return Err(SourceError::fail("upstream stream reset"));
                }
                if n >= 40 {
                    return Ok(());
                }

                let deposit = {
                    let mut rng = rand::rng();
                    Deposit {
                        user_id: USERS[rng.random_range(0..USERS.len())].to_string(),
                        asset: "BTC".to_string(),
                        amount: rng.random_range(1..1_000),
                    }
                };
                publisher
                    .publish_wait(deposit.user_id.clone(), deposit)
                    .await
                    .map_err(|_| SourceError::Canceled)?;
            }
        }
    })
}

fn connect_client(broker: &Arc<Broker<String, Deposit>>, user: &'static str, stay: Duration) {
    let stream = broker.subscribe(user.to_string()).into_events();
    tokio::spawn(async move {
        println!("[{user}] connected");
        let mut stream = Box::pin(stream.take_until(tokio::time::sleep(stay)));
        while let Some(dep) = stream.next().await {
            println!("[{user}] deposit {} {} ({})", dep.amount, dep.asset, dep.user_id);
        }
        println!("[{user}] disconnected");
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = BrokerConfig {
        queue_capacity: 64,
        reconnect: BackoffPolicy::constant(Duration::from_millis(500)),
        grace: Duration::from_secs(2),
        ..BrokerConfig::default()
    };
    let broker = Broker::<String, Deposit>::builder(cfg).with_logging().build();

    connect_client(&broker, "alice", Duration::from_secs(4));
    connect_client(&broker, "bob", Duration::from_secs(2));
    connect_client(&broker, "alice", Duration::from_secs(6));

    broker.run_until_shutdown(vec![deposit_feed()]).await?;

    let stats = broker.stats();
    println!(
        "published={} delivered={} no_subscriber={}",
        stats.published, stats.delivered, stats.dropped_no_subscriber
    );
    Ok(())
}

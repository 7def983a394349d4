//! # Example: Backpressure policies
//!
//! A single subscriber never reads while six events are published into a queue
//! of capacity 3. Each policy leaves a different backlog behind.
//!
//! `Wait` is shown last: dispatch stalls until the reader drains one item.
//!
//! Run with: `cargo run --example backpressure`

use std::time::Duration;

use keyfan::{Broker, BrokerConfig, OverflowPolicy};

async fn fill(policy: OverflowPolicy) -> anyhow::Result<()> {
    let broker = Broker::<&'static str, u32>::new(BrokerConfig {
        queue_capacity: 3,
        overflow: policy,
        ..BrokerConfig::default()
    });
    broker.start()?;
    let _idle = broker.subscribe("client");

    for v in 1..=6 {
        broker.publish("client", v)?;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = broker.stats();
    println!(
        "{:<12} buffered={:?} delivered={} evicted={} dropped_newest={} rejected={}",
        policy.as_label(),
        broker.buffered(&"client"),
        stats.delivered,
        stats.evicted,
        stats.dropped_newest,
        stats.rejected,
    );
    broker.close().await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    for policy in [
        OverflowPolicy::DropOldest,
        OverflowPolicy::DropNewest,
        OverflowPolicy::RejectWrite,
    ] {
        fill(policy).await?;
    }

    let broker = Broker::<&'static str, u32>::new(BrokerConfig {
        queue_capacity: 3,
        overflow: OverflowPolicy::Wait,
        ..BrokerConfig::default()
    });
    broker.start()?;
    let mut reader = broker.subscribe("client");
    for v in 1..=6 {
        broker.publish("client", v)?;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("wait         buffered={:?} (dispatch parked)", broker.buffered(&"client"));

    while let Ok(Some(v)) = tokio::time::timeout(Duration::from_millis(50), reader.recv()).await {
        println!("wait         read {v}, buffered={:?}", broker.buffered(&"client"));
    }
    broker.close().await?;
    Ok(())
}

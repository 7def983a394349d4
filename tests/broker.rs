use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use futures::StreamExt;
use keyfan::{
    BackoffPolicy, Broker, BrokerConfig, BrokerError, DeliveryMode, Event, EventKind, Observe,
    OverflowPolicy, Publisher, SourceError, SourceFn, StreamSource, TryRecvError,
};
use tokio_util::sync::CancellationToken;

fn config(queue_capacity: usize, overflow: OverflowPolicy) -> BrokerConfig {
    BrokerConfig {
        queue_capacity,
        overflow,
        ..BrokerConfig::default()
    }
}

/// Polls `cond` until it holds, failing the test after a few seconds.
async fn until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never became true");
}

fn k(s: &str) -> String {
    s.to_string()
}

#[tokio::test]
async fn drop_oldest_keeps_the_latest_three() {
    let broker = Broker::<String, u32>::new(config(3, OverflowPolicy::DropOldest));
    broker.start().unwrap();
    let _sub = broker.subscribe(k("u1"));

    for v in 1..=4 {
        broker.publish(k("u1"), v).unwrap();
    }
    until(|| broker.stats().delivered == 4).await;

    assert_eq!(broker.buffered(&k("u1")), vec![2, 3, 4]);
    assert_eq!(broker.stats().evicted, 1);
}

#[tokio::test]
async fn drop_newest_keeps_the_first_three() {
    let broker = Broker::<String, u32>::new(config(3, OverflowPolicy::DropNewest));
    broker.start().unwrap();
    let _sub = broker.subscribe(k("u1"));

    for v in 1..=4 {
        broker.publish(k("u1"), v).unwrap();
    }
    until(|| broker.stats().dropped_newest == 1).await;

    assert_eq!(broker.buffered(&k("u1")), vec![1, 2, 3]);
    assert_eq!(broker.stats().delivered, 3);
}

#[tokio::test]
async fn events_reach_only_their_key() {
    let broker = Broker::<String, String>::new(BrokerConfig::default());
    broker.start().unwrap();
    let mut u1 = broker.subscribe(k("u1"));

    broker.publish(k("u1"), k("a")).unwrap();
    broker.publish(k("u2"), k("b")).unwrap();
    broker.publish(k("u1"), k("c")).unwrap();

    assert_eq!(u1.recv().await.as_deref(), Some("a"));
    assert_eq!(u1.recv().await.as_deref(), Some("c"));
    until(|| broker.stats().dropped_no_subscriber == 1).await;
    assert_eq!(u1.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn entry_lives_until_the_last_handle_is_released() {
    let broker = Broker::<String, String>::new(BrokerConfig::default());
    broker.start().unwrap();

    let first = broker.subscribe(k("u1"));
    let mut second = broker.subscribe(k("u1"));
    assert_eq!(broker.subscriber_count(&k("u1")), 2);

    first.release();
    assert_eq!(broker.subscriber_count(&k("u1")), 1);

    broker.publish(k("u1"), k("x")).unwrap();
    assert_eq!(second.recv().await.as_deref(), Some("x"));

    drop(second);
    assert_eq!(broker.entry_count(), 0);
    assert!(broker.keys().is_empty());

    broker.publish(k("u1"), k("late")).unwrap();
    until(|| broker.stats().dropped_no_subscriber == 1).await;
    assert!(broker.buffered(&k("u1")).is_empty());
}

#[tokio::test]
async fn every_active_handle_receives_every_event() {
    let broker = Broker::<String, u32>::new(BrokerConfig::default());
    broker.start().unwrap();
    let mut a = broker.subscribe(k("room"));
    let mut b = broker.subscribe(k("room"));

    for v in 0..5 {
        broker.publish(k("room"), v).unwrap();
    }
    let got_a: Vec<u32> = a.events().take(5).collect().await;
    let got_b: Vec<u32> = b.events().take(5).collect().await;
    assert_eq!(got_a, vec![0, 1, 2, 3, 4]);
    assert_eq!(got_a, got_b);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_subscribers_share_one_entry() {
    let broker = Broker::<String, u32>::new(BrokerConfig::default());
    broker.start().unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.subscribe(k("hot")) })
        })
        .collect();
    let mut subs = Vec::new();
    for t in tasks {
        subs.push(t.await.unwrap());
    }

    assert_eq!(broker.entry_count(), 1);
    assert_eq!(broker.subscriber_count(&k("hot")), 16);

    broker.publish(k("hot"), 99).unwrap();
    for sub in &mut subs {
        assert_eq!(sub.recv().await, Some(99));
    }

    subs.clear();
    assert_eq!(broker.entry_count(), 0);
}

#[tokio::test]
async fn order_is_preserved_per_key() {
    let broker = Broker::<String, u32>::new(BrokerConfig {
        queue_capacity: 0,
        ingress_capacity: 0,
        ..BrokerConfig::default()
    });
    broker.start().unwrap();
    let sub = broker.subscribe(k("k"));

    let publisher = broker.publisher();
    let producer = tokio::spawn(async move {
        for v in 0..1_000 {
            publisher.publish_wait(k("k"), v).await.unwrap();
            publisher.publish_wait(k("other"), v).await.unwrap();
        }
    });

    let got: Vec<u32> = sub.into_events().take(1_000).collect().await;
    producer.await.unwrap();
    assert_eq!(got, (0..1_000).collect::<Vec<_>>());
}

#[tokio::test]
async fn publishing_without_subscribers_never_blocks_or_buffers() {
    let broker = Broker::<String, u32>::new(BrokerConfig {
        ingress_capacity: 4,
        queue_capacity: 1,
        overflow: OverflowPolicy::Wait,
        ..BrokerConfig::default()
    });
    broker.start().unwrap();
    let publisher = broker.publisher();

    tokio::time::timeout(Duration::from_secs(5), async {
        for v in 0..10_000 {
            publisher.publish_wait(k("ghost"), v).await.unwrap();
        }
    })
    .await
    .expect("dispatch stalled on a key nobody listens to");

    until(|| broker.stats().dropped_no_subscriber == 10_000).await;
    assert_eq!(broker.entry_count(), 0);
    assert_eq!(broker.stats().delivered, 0);
}

#[tokio::test]
async fn rejected_writes_are_distinguishable_from_dropped_ones() {
    async fn run(policy: OverflowPolicy) -> (keyfan::StatsSnapshot, Vec<EventKind>) {
        let broker = Broker::<String, u32>::new(config(1, policy));
        let mut monitor = broker.monitor();
        broker.start().unwrap();
        let _sub = broker.subscribe(k("k"));
        broker.publish(k("k"), 1).unwrap();
        broker.publish(k("k"), 2).unwrap();
        until(|| {
            let s = broker.stats();
            s.rejected + s.dropped_newest == 1
        })
        .await;

        let mut kinds = Vec::new();
        while let Ok(ev) = monitor.try_recv() {
            kinds.push(ev.kind);
        }
        (broker.stats(), kinds)
    }

    let (rejected, rejected_kinds) = run(OverflowPolicy::RejectWrite).await;
    assert_eq!((rejected.rejected, rejected.dropped_newest), (1, 0));
    assert!(rejected_kinds.contains(&EventKind::WriteRejected));
    assert!(!rejected_kinds.contains(&EventKind::QueueOverflow));

    let (dropped, dropped_kinds) = run(OverflowPolicy::DropNewest).await;
    assert_eq!((dropped.rejected, dropped.dropped_newest), (0, 1));
    assert!(dropped_kinds.contains(&EventKind::QueueOverflow));
    assert!(!dropped_kinds.contains(&EventKind::WriteRejected));
}

#[tokio::test]
async fn wait_policy_holds_dispatch_until_the_reader_catches_up() {
    let broker = Broker::<String, u32>::new(config(1, OverflowPolicy::Wait));
    broker.start().unwrap();
    let mut slow = broker.subscribe(k("slow"));
    let mut fast = broker.subscribe(k("fast"));

    broker.publish(k("slow"), 1).unwrap();
    broker.publish(k("slow"), 2).unwrap();
    broker.publish(k("fast"), 3).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fast.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(broker.buffered(&k("slow")), vec![1]);

    assert_eq!(slow.recv().await, Some(1));
    assert_eq!(fast.recv().await, Some(3));
    assert_eq!(slow.recv().await, Some(2));
}

#[tokio::test]
async fn broker_cannot_start_twice_or_restart() {
    let broker = Broker::<String, u32>::new(BrokerConfig::default());
    broker.start().unwrap();
    assert_matches!(broker.start(), Err(BrokerError::AlreadyStarted));

    broker.stop().await.unwrap();
    assert_matches!(broker.start(), Err(BrokerError::AlreadyStarted));
}

#[tokio::test]
async fn broadcast_mode_reaches_all_clients() {
    let broker = Broker::<String, String>::new(BrokerConfig {
        mode: DeliveryMode::Broadcast,
        ..BrokerConfig::default()
    });
    broker.start().unwrap();
    let mut alice = broker.subscribe(k("alice"));
    let mut bob = broker.subscribe(k("bob"));

    broker.publish(k("system"), k("maintenance at 02:00")).unwrap();

    assert_eq!(alice.recv().await.as_deref(), Some("maintenance at 02:00"));
    assert_eq!(bob.recv().await.as_deref(), Some("maintenance at 02:00"));
}

#[tokio::test(start_paused = true)]
async fn stream_source_reconnects_after_a_dropped_connection() {
    let broker = Broker::<String, u32>::new(BrokerConfig {
        reconnect: BackoffPolicy::constant(Duration::from_secs(5)),
        ..BrokerConfig::default()
    });
    broker.start().unwrap();
    let mut monitor = broker.monitor();
    let mut sub = broker.subscribe(k("u1"));

    let connects = Arc::new(AtomicU32::new(0));
    let source = StreamSource::new("deposits", {
        let connects = Arc::clone(&connects);
        move || {
            let n = connects.fetch_add(1, Ordering::SeqCst);
            let items: Vec<Result<(String, u32), SourceError>> = if n == 0 {
                vec![Ok((k("u1"), 1)), Err(SourceError::fail("connection reset"))]
            } else {
                vec![Ok((k("u1"), 2))]
            };
            futures::stream::iter(items)
        }
    })
    .into_arc();

    broker.spawn_source(source).await.unwrap();
    assert_eq!(connects.load(Ordering::SeqCst), 2);
    assert_eq!(sub.recv().await, Some(1));
    assert_eq!(sub.recv().await, Some(2));

    let mut scheduled = None;
    while let Ok(ev) = monitor.try_recv() {
        if ev.kind == EventKind::ReconnectScheduled {
            scheduled = ev.delay_ms;
        }
    }
    assert_eq!(scheduled, Some(5_000));
}

#[tokio::test]
async fn stop_cancels_running_sources() {
    let broker = Broker::<String, u32>::new(BrokerConfig::default());
    broker.start().unwrap();

    let source = SourceFn::arc(
        "forever",
        |_p: Publisher<String, u32>, ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err::<(), _>(SourceError::Canceled)
        },
    );
    let handle = broker.spawn_source(source);
    broker.stop().await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("source outlived the broker")
        .unwrap();
}

#[derive(Default)]
struct Recorder(std::sync::Mutex<Vec<EventKind>>);

#[async_trait]
impl Observe for Recorder {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().unwrap().push(ev.kind);
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test]
async fn observers_see_subscription_lifecycle() {
    let recorder = Arc::new(Recorder::default());
    let observers: Vec<Arc<dyn Observe>> = vec![recorder.clone()];
    let broker = Broker::<String, u32>::builder(BrokerConfig::default())
        .with_observers(observers)
        .build();
    broker.start().unwrap();

    drop(broker.subscribe(k("u1")));

    until(|| recorder.0.lock().unwrap().contains(&EventKind::EntryRemoved)).await;
    let seen = recorder.0.lock().unwrap().clone();
    let created = seen.iter().position(|k| *k == EventKind::EntryCreated).unwrap();
    let removed = seen.iter().position(|k| *k == EventKind::EntryRemoved).unwrap();
    assert!(created < removed);
}

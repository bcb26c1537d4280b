mod common;

use application::DevicePoller;
use common::{Harness, device_id, modbus};
use infrastructure::config::MetricsConfig;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_poller_reads_every_interval_until_cancelled() {
    let h = Harness::with_limits(
        vec![modbus("ups-1").with_polling_interval(10), modbus("pdu-1")],
        MetricsConfig::default(),
        Duration::from_millis(1000),
        8,
    );
    // First tick hits a broker outage
    h.client.fail_publish.store(true, Ordering::Relaxed);

    let cancel_token = CancellationToken::new();
    let poller = DevicePoller::new(h.broker.clone(), h.registry.clone(), cancel_token.clone());
    let handles = poller.start();
    assert_eq!(handles.len(), 1, "Only devices with an interval are polled");

    sleep(Duration::from_secs(1)).await;
    assert!(h.client.commands().is_empty());
    h.client.fail_publish.store(false, Ordering::Relaxed);

    sleep(Duration::from_millis(9_500)).await;
    let commands = h.client.commands();
    assert_eq!(commands.len(), 1, "A failed poll does not stop the loop");
    assert_eq!(commands[0].command, "read");
    assert_eq!(commands[0].device_id, device_id("ups-1"));

    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.client.commands().len(), 2);
    // Unanswered polls time out and leave nothing behind
    assert_eq!(h.events.of_type("CommandTimedOut").len(), 1);

    cancel_token.cancel();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.client.commands().len(), 2);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(h.broker.pending_count(), 0);
}

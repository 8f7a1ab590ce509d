use std::time::Duration;

use klinesync_core::{Clock, SystemClock};

#[tokio::test(start_paused = true)]
async fn system_clock_sleeps_on_tokio_time() {
    let before = tokio::time::Instant::now();
    SystemClock.sleep(Duration::from_secs(30)).await;
    assert!(before.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn zero_sleeps_return_immediately() {
    let before = tokio::time::Instant::now();
    SystemClock.sleep(Duration::ZERO).await;
    assert_eq!(before.elapsed(), Duration::ZERO);
}

#[test]
fn wall_clock_is_after_2020() {
    assert!(SystemClock.now_ms() > 1_577_836_800_000);
}

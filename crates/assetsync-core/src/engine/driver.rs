use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use super::SyncEngine;

/// Tick `engine` every `period` until no intent, transfer or decompression is
/// outstanding. Returns immediately if the engine is already settled.
pub async fn run_until_settled(engine: &mut SyncEngine, period: Duration) {
    run_until_settled_with(engine, period, |_| {}).await;
}

/// Like [`run_until_settled`], calling `after_tick` once after every tick
/// (including the last one), e.g. to drain the event receiver.
pub async fn run_until_settled_with<F>(engine: &mut SyncEngine, period: Duration, mut after_tick: F)
where
    F: FnMut(&SyncEngine),
{
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        engine.tick();
        after_tick(engine);
        if engine.is_settled() {
            tracing::debug!(state = %engine.state(), "engine settled");
            break;
        }
    }
}

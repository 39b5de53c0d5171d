use crate::config::Config;
use acton_reactive::prelude::*;
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Process-wide count of accepted connections.
///
/// Clones share the same underlying counter. The value only ever grows.
#[derive(Debug, Clone, Default)]
pub struct ConnectionCounter(Arc<AtomicU64>);

impl ConnectionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one accepted connection and returns the new total.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Logs the connection count every `period` until `cancel` fires.
///
/// The first report happens one full period after the call. Returns how many
/// reports were written. `period` must be non-zero.
pub async fn report_stats(
    counter: ConnectionCounter,
    period: Duration,
    cancel: CancellationToken,
) -> u64 {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reports = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("Stats: {} connections", counter.get());
                reports += 1;
            }
            _ = cancel.cancelled() => {
                debug!("Stats reporter received stop signal");
                break;
            }
        }
    }

    reports
}

// --- StatsReporterActor ---

#[acton_actor]
pub struct StatsReporterState;

impl StatsReporterState {
    pub async fn create(
        runtime: &mut ActorRuntime,
        config: &Config,
        counter: ConnectionCounter,
    ) -> anyhow::Result<ActorHandle> {
        if config.stats_interval_secs == 0 {
            anyhow::bail!("stats interval must be at least one second");
        }

        let actor_config = ActorConfig::new(Ern::with_root("stats-reporter")?, None, None)?
            .with_restart_policy(RestartPolicy::Permanent);

        let mut builder = runtime.new_actor_with_config::<Self>(actor_config);

        let cancel = CancellationToken::new();
        let cancel_for_loop = cancel.clone();
        let cancel_for_stop = cancel.clone();

        let period = Duration::from_secs(config.stats_interval_secs);
        let counter_for_loop = counter.clone();

        builder.after_start(move |_actor| {
            let counter = counter_for_loop.clone();
            let cancel = cancel_for_loop.clone();

            tokio::spawn(async move {
                tracing::info!("Stats reporter started, interval {:?}", period);
                report_stats(counter, period, cancel).await;
            });

            Reply::ready()
        });

        builder.before_stop(move |_| {
            cancel_for_stop.cancel();
            Reply::ready()
        });

        builder.after_stop(move |_actor| {
            tracing::info!(
                "Stats reporter stopped. Total connections: {}",
                counter.get()
            );
            Reply::ready()
        });

        Ok(builder.start().await)
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::api::TornApi;
use crate::notify::Notifier;
use crate::store::{FLUSH_INTERVAL, StateStore};
use crate::types::IconSnapshot;

/// Round-robin cursor over an id list that may be refreshed between
/// ticks. An out-of-range cursor (ids were removed) wraps to the start;
/// in-range progress is preserved.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn next(&mut self, ids: &[u64]) -> Option<u64> {
        if ids.is_empty() {
            return None;
        }
        if self.cursor >= ids.len() {
            self.cursor = 0;
        }
        let id = ids[self.cursor];
        self.cursor = (self.cursor + 1) % ids.len();
        Some(id)
    }
}

/// Everything a poller task needs. Cloned into each spawned task.
#[derive(Clone)]
pub struct PollerCtx {
    pub api: TornApi,
    pub store: Arc<StateStore>,
    pub notifier: Notifier,
}

fn ticker(secs: u64) -> tokio::time::Interval {
    let mut t = tokio::time::interval(Duration::from_secs(secs.max(1)));
    // A slow fetch delays the next tick instead of stacking ticks, so one
    // poller never has two requests in flight.
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Round-robins tracked users, one profile fetch per tick.
pub async fn run_user_poller(ctx: PollerCtx, interval_secs: u64) {
    let mut tick = ticker(interval_secs);
    let mut cursor = RoundRobin::default();
    loop {
        tick.tick().await;
        let ids = ctx.store.with(|s| s.active_user_ids()).await;
        let Some(id) = cursor.next(&ids) else { continue };
        match ctx.api.profile(id).await {
            Ok(profile) => {
                let now = now_ts();
                let alerts = ctx
                    .store
                    .mutate(|s| match s.users.get_mut(&id) {
                        Some(user) => user.observe(&profile, now),
                        None => Vec::new(), // untracked mid-tick
                    })
                    .await;
                ctx.notifier.send_all(&alerts).await;
            }
            Err(e) => warn!("user {id} poll skipped: {e}"),
        }
    }
}

/// Round-robins tracked factions, one roster fetch per tick.
pub async fn run_faction_poller(ctx: PollerCtx, interval_secs: u64) {
    let mut tick = ticker(interval_secs);
    let mut cursor = RoundRobin::default();
    loop {
        tick.tick().await;
        let ids = ctx.store.with(|s| s.active_faction_ids()).await;
        let Some(id) = cursor.next(&ids) else { continue };
        match ctx.api.faction(id).await {
            Ok(resp) => {
                let now = now_ts();
                let alerts = ctx
                    .store
                    .mutate(|s| match s.factions.get_mut(&id) {
                        Some(faction) => faction.observe(&resp, now),
                        None => Vec::new(),
                    })
                    .await;
                ctx.notifier.send_all(&alerts).await;
            }
            Err(e) => warn!("faction {id} poll skipped: {e}"),
        }
    }
}

/// Polls own resource bars. The upstream fetch is skipped entirely while
/// no bar is enabled.
pub async fn run_bars_poller(ctx: PollerCtx, interval_secs: u64) {
    let mut tick = ticker(interval_secs);
    loop {
        tick.tick().await;
        if !ctx.store.with(|s| s.selfwatch.bars.any_enabled()).await {
            continue;
        }
        match ctx.api.bars().await {
            Ok(resp) => {
                let alerts = ctx.store.mutate(|s| s.selfwatch.bars.observe(&resp)).await;
                ctx.notifier.send_all(&alerts).await;
            }
            Err(e) => warn!("bars poll skipped: {e}"),
        }
    }
}

/// Polls the chain counter on its own (typically faster) cadence.
pub async fn run_chain_poller(ctx: PollerCtx, interval_secs: u64) {
    let mut tick = ticker(interval_secs);
    loop {
        tick.tick().await;
        if !ctx.store.with(|s| s.selfwatch.chain.enabled).await {
            continue;
        }
        match ctx.api.bars().await {
            Ok(resp) => {
                let alerts = ctx
                    .store
                    .mutate(|s| s.selfwatch.chain.observe(resp.chain.current, resp.chain.timeout))
                    .await;
                ctx.notifier.send_all(&alerts).await;
            }
            Err(e) => warn!("chain poll skipped: {e}"),
        }
    }
}

/// Polls the icon feed; one fetch feeds both cooldown readiness and
/// trackable-activity detection.
pub async fn run_icons_poller(ctx: PollerCtx, interval_secs: u64) {
    let mut tick = ticker(interval_secs);
    loop {
        tick.tick().await;
        let wanted = ctx
            .store
            .with(|s| s.selfwatch.cooldowns.any_enabled() || s.selfwatch.activities.any_enabled())
            .await;
        if !wanted {
            continue;
        }
        match ctx.api.icons().await {
            Ok(resp) => {
                let snap = IconSnapshot::from_feed(&resp, now_ts());
                let alerts = ctx
                    .store
                    .mutate(|s| {
                        let mut alerts = s.selfwatch.cooldowns.observe(&snap);
                        alerts.extend(s.selfwatch.activities.observe(&snap));
                        alerts
                    })
                    .await;
                ctx.notifier.send_all(&alerts).await;
            }
            Err(e) => warn!("icons poll skipped: {e}"),
        }
    }
}

/// Polls company employee effectiveness for the addiction tracker.
pub async fn run_company_poller(ctx: PollerCtx, interval_secs: u64) {
    let mut tick = ticker(interval_secs);
    loop {
        tick.tick().await;
        if !ctx.store.with(|s| s.selfwatch.addiction.enabled).await {
            continue;
        }
        match ctx.api.company().await {
            Ok(resp) => {
                let own_id = ctx.store.with(|s| s.own_id).await;
                let Some(me) = resp.company_employees.get(&own_id.to_string()) else {
                    warn!("own employee {own_id} missing from company feed, skipping");
                    continue;
                };
                let value = me.effectiveness.addiction;
                let alerts = ctx.store.mutate(|s| s.selfwatch.addiction.observe(value)).await;
                ctx.notifier.send_all(&alerts).await;
            }
            Err(e) => warn!("company poll skipped: {e}"),
        }
    }
}

/// Coalesced persistence: writes at most once per quiet interval.
pub async fn run_flusher(store: Arc<StateStore>) {
    let mut tick = tokio::time::interval(FLUSH_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        store.flush_if_dirty().await;
    }
}

/// Periodic liveness/stats line for external monitoring.
pub async fn run_stats_logger(store: Arc<StateStore>, interval_secs: u64) {
    let started = tokio::time::Instant::now();
    let mut tick = ticker(interval_secs);
    loop {
        tick.tick().await;
        let stats = store.with(|s| s.stats(started.elapsed().as_secs())).await;
        match serde_json::to_string(&stats) {
            Ok(json) => info!("stats {json}"),
            Err(e) => warn!("stats serialization failed: {e}"),
        }
    }
}

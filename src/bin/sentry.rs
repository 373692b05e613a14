use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use torn_sentry::api::{ApiError, TornApi};
use torn_sentry::config::{AppConfig, CONFIG_PATH, parse_pre_alerts, parse_states};
use torn_sentry::faction::OfflineWatch;
use torn_sentry::notify::Notifier;
use torn_sentry::poller::{
    PollerCtx, run_bars_poller, run_chain_poller, run_company_poller, run_faction_poller,
    run_flusher, run_icons_poller, run_stats_logger, run_user_poller,
};
use torn_sentry::store::StateStore;
use torn_sentry::types::ProfileResponse;

/// Attempts for the startup credential check before giving up.
const STARTUP_RETRIES: u32 = 3;

#[derive(Parser)]
#[command(name = "sentry", about = "Torn state-transition alert bot")]
struct Args {
    /// Config file path
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    info!("Loaded config from {}", args.config.display());
    if let Ok(key) = std::env::var("TORN_API_KEY") {
        if !key.trim().is_empty() {
            config.account.api_key = key;
        }
    }

    let api = TornApi::new(config.account.api_key.clone());

    // The system is useless without a valid credential: a rejected key at
    // startup is fatal by design.
    let me = verify_key(&api).await?;
    info!("Authenticated as {} [{}]", me.name, me.player_id);

    let store = Arc::new(StateStore::open(PathBuf::from(&config.settings.state_path)));
    store.mutate(|s| s.own_id = me.player_id).await;
    store
        .mutate(|s| config.self_seed.apply(&mut s.selfwatch))
        .await?;

    seed_tracking(&config, &api, &store).await?;

    let notifier = Notifier::new(config.notify.webhook_url.clone());
    let ctx = PollerCtx {
        api,
        store: store.clone(),
        notifier,
    };

    let settings = &config.settings;
    let tasks = vec![
        tokio::spawn(run_user_poller(ctx.clone(), settings.user_poll_secs)),
        tokio::spawn(run_faction_poller(ctx.clone(), settings.faction_poll_secs)),
        tokio::spawn(run_bars_poller(ctx.clone(), settings.bars_poll_secs)),
        tokio::spawn(run_chain_poller(ctx.clone(), settings.chain_poll_secs)),
        tokio::spawn(run_icons_poller(ctx.clone(), settings.icons_poll_secs)),
        tokio::spawn(run_company_poller(ctx.clone(), settings.company_poll_secs)),
        tokio::spawn(run_flusher(store.clone())),
        tokio::spawn(run_stats_logger(store.clone(), settings.stats_log_secs)),
    ];

    info!("Entering polling loops. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    for task in &tasks {
        task.abort();
    }
    store.flush().await.context("final state flush failed")?;
    info!("State flushed, exiting");

    Ok(())
}

/// Fetch the own profile, retrying transient failures; a bad key is fatal
/// immediately.
async fn verify_key(api: &TornApi) -> Result<ProfileResponse> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match api.own_profile().await {
            Ok(profile) => return Ok(profile),
            Err(e @ ApiError::InvalidKey) => {
                return Err(anyhow::anyhow!(e)).context("startup credential check failed");
            }
            Err(e) if e.is_transient() && attempt < STARTUP_RETRIES => {
                warn!("credential check attempt {attempt} failed: {e}, retrying");
                tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(e)).context("startup credential check failed");
            }
        }
    }
}

/// Track everything listed in the config that is not already in the
/// persisted store. A fresh track fetches the profile/roster first so the
/// entity starts from a named, silent baseline; already-tracked entities
/// only get their settings refreshed.
async fn seed_tracking(config: &AppConfig, api: &TornApi, store: &Arc<StateStore>) -> Result<()> {
    let defaults = config.settings.pre_times()?;

    for seed in &config.users {
        let states = parse_states(&seed.states).with_context(|| format!("user {}", seed.id))?;
        let pre_times =
            parse_pre_alerts(&seed.pre_alerts, &defaults).with_context(|| format!("user {}", seed.id))?;
        let travel_class = seed.travel_class.unwrap_or_default();

        let exists = store.with(|s| s.users.contains_key(&seed.id)).await;
        if exists {
            store
                .mutate(|s| {
                    if let Some(user) = s.users.get_mut(&seed.id) {
                        user.states = states.clone();
                        user.pre_times = pre_times.clone();
                        user.travel_class = travel_class;
                        user.enabled = true;
                    }
                })
                .await;
            continue;
        }

        match api.profile(seed.id).await {
            Ok(profile) => {
                let now = chrono::Utc::now().timestamp();
                store
                    .mutate(|s| {
                        let user = s.track_user(seed.id, profile.name.clone(), states.clone())?;
                        user.pre_times = pre_times.clone();
                        user.travel_class = travel_class;
                        user.observe(&profile, now); // silent baseline
                        anyhow::Ok(())
                    })
                    .await?;
                info!("Tracking user {} [{}]", profile.name, seed.id);
            }
            Err(e) => warn!("cannot track user {} yet: {e}", seed.id),
        }
    }

    for seed in &config.factions {
        let states =
            parse_states(&seed.states).with_context(|| format!("faction {}", seed.id))?;
        let pre_times = parse_pre_alerts(&seed.pre_alerts, &defaults)
            .with_context(|| format!("faction {}", seed.id))?;
        let offline = match seed.offline_hours {
            Some(hours) => OfflineWatch {
                enabled: true,
                hours,
            },
            None => OfflineWatch::default(),
        };

        let exists = store.with(|s| s.factions.contains_key(&seed.id)).await;
        if exists {
            store
                .mutate(|s| {
                    if let Some(faction) = s.factions.get_mut(&seed.id) {
                        faction.states = states.clone();
                        faction.pre_times = pre_times.clone();
                        faction.offline = offline.clone();
                        faction.daily.enabled = seed.daily_respect;
                        faction.enabled = true;
                    }
                })
                .await;
            continue;
        }

        match api.faction(seed.id).await {
            Ok(resp) => {
                let now = chrono::Utc::now().timestamp();
                store
                    .mutate(|s| {
                        let faction =
                            s.track_faction(seed.id, resp.name.clone(), states.clone())?;
                        faction.pre_times = pre_times.clone();
                        faction.offline = offline.clone();
                        faction.daily.enabled = seed.daily_respect;
                        faction.observe(&resp, now); // seed roster silently
                        anyhow::Ok(())
                    })
                    .await?;
                info!("Tracking faction {} [{}]", resp.name, seed.id);
            }
            Err(e) => warn!("cannot track faction {} yet: {e}", seed.id),
        }
    }

    Ok(())
}

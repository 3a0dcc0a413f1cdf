//! Headless ipvane agent: watches the external IP and prints every state
//! transition to stdout, one line per event. Logs go to stderr so the event
//! stream stays clean for piping.

use std::collections::HashMap;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ipvane_core::config::WatchCfg;
use ipvane_core::events::StateEvent;
use ipvane_core::probe::NeverIdle;
use ipvane_core::scheduler::UpdateScheduler;
use ipvane_lookup::{HttpLocationProvider, LocationProvider};

const ENV_PREFIX: &str = "IPVANE_";

/// Collect `IPVANE_*` environment variables into the config key space,
/// e.g. `IPVANE_UPDATE_INTERVAL_SECS=10` sets `update_interval_secs`.
fn env_settings() -> HashMap<String, String> {
    std::env::vars()
        .filter_map(|(k, v)| {
            k.strip_prefix(ENV_PREFIX)
                .map(|rest| (rest.to_ascii_lowercase(), v))
        })
        .collect()
}

fn print_event(event: &StateEvent) {
    let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    match event {
        StateEvent::LocationChanged { record, is_forced } => {
            let tag = if *is_forced { " (forced)" } else { "" };
            println!(
                "[{ts}] {} {} {} via {}{tag}",
                record.ip, record.country_code, record.city, record.isp
            );
        }
        StateEvent::NetworkLost => println!("[{ts}] network lost"),
        StateEvent::EnteredIdle => println!("[{ts}] entered idle mode"),
        StateEvent::ExitedIdle => println!("[{ts}] exited idle mode"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();

    let cfg = WatchCfg::from_map(&env_settings());
    tracing::info!(
        interval_secs = cfg.update_interval_secs,
        idle_enabled = cfg.idle_enabled,
        "ipvane starting"
    );

    let provider = Arc::new(HttpLocationProvider::new()?) as Arc<dyn LocationProvider>;
    // No portable input-idle source in a headless process; idle mode stays
    // dormant unless a platform probe is wired in.
    let (mut scheduler, handle, mut events, _status) =
        UpdateScheduler::new(cfg, provider, Box::new(NeverIdle));
    let token = scheduler.token();

    // SIGUSR1 requests an immediate forced update
    #[cfg(unix)]
    {
        let handle = handle.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let mut usr1 = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::user_defined1(),
            ) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to register SIGUSR1 handler");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    Some(_) = usr1.recv() => {
                        tracing::info!("SIGUSR1 received, forcing update");
                        handle.force_update();
                    }
                }
            }
        });
    }
    let _ = &handle;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    scheduler.run().await;

    // Dropping the scheduler closes the event channel; the printer drains
    // whatever is still queued and exits.
    drop(scheduler);
    let _ = printer.await;
    Ok(())
}

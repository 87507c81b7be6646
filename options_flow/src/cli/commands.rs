//! Subcommand bodies, wired from `main`.

use std::{io::BufRead, sync::Arc};

use anyhow::Context;
use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    aggregate::aggregate,
    chart::{ChartRefresher, ChartRenderer, ChartRequest, RefreshTrigger, TerminalRenderer},
    cli::params::parse_selection,
    config::FlowConfig,
    models::ticker::Ticker,
    scheduler::{Clock, PollScheduler, SystemClock, TickOutcome},
    source::analytics_page::AnalyticsPageSource,
    store::DailyStore,
};

struct Services {
    clock: Arc<SystemClock>,
    store: DailyStore,
    scheduler: PollScheduler,
}

fn services(config: &FlowConfig) -> anyhow::Result<Services> {
    let clock = Arc::new(SystemClock::new(config.time_zone()?));
    let source = AnalyticsPageSource::new(&config.page).context("failed to build page client")?;
    let store = DailyStore::new(&config.storage_root);
    let scheduler = PollScheduler::new(
        config,
        Arc::new(source),
        store.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    Ok(Services {
        clock,
        store,
        scheduler,
    })
}

/// Polls and charts until Ctrl-C or SIGTERM.
pub async fn run(config: &FlowConfig, ticker: Option<Ticker>, chart: bool) -> anyhow::Result<()> {
    let Services {
        clock,
        store,
        scheduler,
    } = services(config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!("signal handler error: {e}; shutting down");
        }
        info!("shutdown requested; finishing current work");
        on_signal.cancel();
    });

    if !chart {
        scheduler.run(cancel).await;
        return Ok(());
    }

    let today = clock.now().date();
    let initial = ChartRequest {
        ticker: ticker
            .or_else(|| config.tracked_tickers.first().cloned())
            .context("no ticker to chart")?,
        start: today,
        end: today,
    };
    let renderer = Arc::new(TerminalRenderer::new(config.chart.width, config.chart.height));
    let refresher = ChartRefresher::new(store, renderer, config.chart_refresh());
    let triggers = spawn_stdin_triggers(initial.clone());

    tokio::join!(
        scheduler.run(cancel.clone()),
        refresher.run(initial, triggers, cancel.clone()),
    );
    Ok(())
}

/// One polling pass; fails if no ticker was stored.
pub async fn poll_once(config: &FlowConfig) -> anyhow::Result<()> {
    let Services { scheduler, .. } = services(config)?;
    let report = scheduler.tick().await;

    for (ticker, outcome) in &report.outcomes {
        match outcome {
            TickOutcome::Stored(row) => println!(
                "{ticker}\t{}\tprice={}\tdelta_momentum={}\tpremium_momentum={}",
                row.time, row.price, row.delta_momentum, row.premium_momentum
            ),
            TickOutcome::SourceFailed { message, .. } | TickOutcome::StoreFailed { message } => {
                eprintln!("{ticker}\tERROR: {message}")
            }
        }
    }
    eprintln!("SUMMARY: {} stored, {} failed", report.stored(), report.failed());

    anyhow::ensure!(report.stored() > 0, "no ticker was stored");
    Ok(())
}

/// Draws one chart from what is already on disk.
pub fn chart_once(
    config: &FlowConfig,
    ticker: &Ticker,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let start = match start {
        Some(day) => day,
        None => SystemClock::new(config.time_zone()?).now().date(),
    };
    let end = end.unwrap_or(start);
    let store = DailyStore::new(&config.storage_root);
    let series = aggregate(&store, ticker, start, end);
    TerminalRenderer::new(config.chart.width, config.chart.height).render(&series)
}

/// Reads chart selections from stdin on a plain thread so a pending read
/// never holds up runtime shutdown.
fn spawn_stdin_triggers(initial: ChartRequest) -> mpsc::Receiver<RefreshTrigger> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        let mut current = initial;
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_selection(&line, &current) {
                Some(trigger) => {
                    if let RefreshTrigger::Select(request) = &trigger {
                        current = request.clone();
                    }
                    if tx.blocking_send(trigger).is_err() {
                        break;
                    }
                }
                None => {
                    warn!(
                        input = %line.trim(),
                        "expected `TICKER [START [END]]` or an empty line"
                    );
                }
            }
        }
    });
    rx
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl-C");
    }

    Ok(())
}

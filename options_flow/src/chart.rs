//! Chart views over an aggregated series, and the refresh loop that redraws
//! them.
//!
//! Two views share a time axis (minutes since the first sample):
//!
//! * **delta**: price with net delta calls/puts on top, price with delta
//!   momentum below;
//! * **premium**: the same layout for net premium and premium momentum.
//!
//! Terminal plots have a single y axis, so every non-price line is projected
//! onto the price range and its true min/max is printed in the legend.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::NaiveDate;
use textplots::{Chart, Plot, Shape};
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    aggregate::aggregate,
    models::{series::AggregatedSeries, snapshot::DerivedSnapshot, ticker::Ticker},
    store::DailyStore,
};

/// Draws an aggregated series. Implementations must cope with empty series.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, series: &AggregatedSeries) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub label: &'static str,
    /// `(minutes since first sample, y)` in price units.
    pub points: Vec<(f32, f32)>,
    /// True range of the underlying values.
    pub min: f64,
    pub max: f64,
}

/// One plot: `lines[0]` is price, the rest are projected overlays.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub title: String,
    pub top: Panel,
    pub bottom: Panel,
    pub x_max: f32,
    pub price_range: (f64, f64),
}

type Field = fn(&DerivedSnapshot) -> f64;

/// Shared x positions and price range for every line of one series.
struct Axes<'a> {
    rows: &'a [DerivedSnapshot],
    xs: Vec<f32>,
    price_range: (f64, f64),
}

impl Axes<'_> {
    fn price(&self) -> Line {
        self.line("Price", |r| r.price, false)
    }

    fn overlay(&self, label: &'static str, field: Field) -> Line {
        self.line(label, field, true)
    }

    fn line(&self, label: &'static str, field: Field, projected: bool) -> Line {
        let (min, max) = range_of(self.rows, field);
        let points = self
            .xs
            .iter()
            .zip(self.rows)
            .map(|(x, row)| {
                let y = if projected {
                    project(field(row), (min, max), self.price_range)
                } else {
                    field(row)
                };
                (*x, y as f32)
            })
            .collect();
        Line {
            label,
            points,
            min,
            max,
        }
    }

    fn view(
        &self,
        title: String,
        calls: (&'static str, Field),
        puts: (&'static str, Field),
        momentum: (&'static str, Field),
    ) -> View {
        View {
            title,
            top: Panel {
                lines: vec![
                    self.price(),
                    self.overlay(calls.0, calls.1),
                    self.overlay(puts.0, puts.1),
                ],
            },
            bottom: Panel {
                lines: vec![self.price(), self.overlay(momentum.0, momentum.1)],
            },
            x_max: self.xs.last().copied().unwrap_or(0.0).max(1e-3),
            price_range: self.price_range,
        }
    }
}

fn delta_calls(r: &DerivedSnapshot) -> f64 {
    r.net_delta_calls as f64
}

fn delta_puts(r: &DerivedSnapshot) -> f64 {
    r.net_delta_puts as f64
}

fn delta_momentum(r: &DerivedSnapshot) -> f64 {
    r.delta_momentum as f64
}

fn premium_calls(r: &DerivedSnapshot) -> f64 {
    r.net_premium_calls as f64
}

fn premium_puts(r: &DerivedSnapshot) -> f64 {
    r.net_premium_puts as f64
}

fn premium_momentum(r: &DerivedSnapshot) -> f64 {
    r.premium_momentum as f64
}

/// Builds the delta view and the premium view for `series`.
pub fn build_views(series: &AggregatedSeries) -> [View; 2] {
    let axes = Axes {
        rows: &series.rows,
        xs: elapsed_minutes(&series.rows),
        price_range: padded(range_of(&series.rows, |r| r.price)),
    };

    [
        axes.view(
            format!("Net Delta and Stock Price: {}", series.ticker),
            ("Net Delta Calls", delta_calls),
            ("Net Delta Puts", delta_puts),
            ("Net Delta Momentum", delta_momentum),
        ),
        axes.view(
            format!("Net Premium and Stock Price: {}", series.ticker),
            ("Net Premium Calls", premium_calls),
            ("Net Premium Puts", premium_puts),
            ("Net Premium Momentum", premium_momentum),
        ),
    ]
}

fn elapsed_minutes(rows: &[DerivedSnapshot]) -> Vec<f32> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    rows.iter()
        .map(|r| (r.time - first.time).num_seconds() as f32 / 60.0)
        .collect()
}

fn range_of(rows: &[DerivedSnapshot], field: Field) -> (f64, f64) {
    rows.iter().map(field).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// Widens a flat or empty range so the plot has some height.
fn padded((lo, hi): (f64, f64)) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo > f64::EPSILON {
        return (lo, hi);
    }
    let pad = (lo.abs() * 0.01).max(1.0);
    (lo - pad, hi + pad)
}

/// Linear map of `value` from `from` onto `onto`. A flat source range maps to
/// the middle of the target.
pub fn project(value: f64, from: (f64, f64), onto: (f64, f64)) -> f64 {
    let span = from.1 - from.0;
    if span.abs() <= f64::EPSILON {
        return (onto.0 + onto.1) / 2.0;
    }
    onto.0 + (value - from.0) / span * (onto.1 - onto.0)
}

/// Braille line charts on stdout.
#[derive(Debug, Clone, Copy)]
pub struct TerminalRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self {
            width: 120,
            height: 30,
        }
    }
}

impl TerminalRenderer {
    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        let defaults = Self::default();
        Self {
            width: width.unwrap_or(defaults.width).max(40),
            height: height.unwrap_or(defaults.height).max(10),
        }
    }

    fn draw_panel(&self, view: &View, panel: &Panel) {
        for line in &panel.lines {
            if line.points.is_empty() {
                println!("  {:<22} (no data)", line.label);
            } else {
                println!("  {:<22} {:.2} → {:.2}", line.label, line.min, line.max);
            }
        }
        if panel.lines.first().is_none_or(|price| price.points.len() < 2) {
            println!();
            return;
        }

        let (w, h) = (self.width, self.height);
        let (x_max, y_min, y_max) = (
            view.x_max,
            view.price_range.0 as f32,
            view.price_range.1 as f32,
        );
        let lines: Vec<&[(f32, f32)]> = panel.lines.iter().map(|l| l.points.as_slice()).collect();
        match lines.as_slice() {
            [a] => Chart::new_with_y_range(w, h, 0.0, x_max, y_min, y_max)
                .lineplot(&Shape::Lines(a))
                .display(),
            [a, b] => Chart::new_with_y_range(w, h, 0.0, x_max, y_min, y_max)
                .lineplot(&Shape::Lines(a))
                .lineplot(&Shape::Lines(b))
                .display(),
            [a, b, c, ..] => Chart::new_with_y_range(w, h, 0.0, x_max, y_min, y_max)
                .lineplot(&Shape::Lines(a))
                .lineplot(&Shape::Lines(b))
                .lineplot(&Shape::Lines(c))
                .display(),
            [] => {}
        }
        println!();
    }
}

impl ChartRenderer for TerminalRenderer {
    fn render(&self, series: &AggregatedSeries) -> anyhow::Result<()> {
        println!(
            "{} {} → {}: {} samples",
            series.ticker,
            series.start,
            series.end,
            series.len()
        );
        if !series.skipped_days.is_empty() {
            println!("  skipped unreadable days: {:?}", series.skipped_days);
        }
        for view in build_views(series) {
            println!("== {} ==", view.title);
            self.draw_panel(&view, &view.top);
            self.draw_panel(&view, &view.bottom);
        }
        Ok(())
    }
}

/// Lets at most one render run at a time; extra requests are dropped.
#[derive(Debug, Clone, Default)]
pub struct RefreshGate(Arc<AtomicBool>);

/// Held while a render is in flight; releases the gate on drop.
#[derive(Debug)]
pub struct RefreshPermit(Arc<AtomicBool>);

impl RefreshGate {
    pub fn try_enter(&self) -> Option<RefreshPermit> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshPermit(Arc::clone(&self.0)))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for RefreshPermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What to chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRequest {
    pub ticker: Ticker,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone)]
pub enum RefreshTrigger {
    /// Redraw the current selection.
    Manual,
    /// Switch ticker and/or date range, then redraw.
    Select(ChartRequest),
}

/// Render started by [`ChartRefresher::run`].
#[derive(Default)]
struct InFlight {
    task: Option<JoinHandle<()>>,
    /// The selection changed after `task` started.
    stale: bool,
}

async fn finished(task: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = task {
        if let Err(error) = handle.await {
            warn!(%error, "chart render task failed");
        }
    }
}

/// Re-renders on a timer and on explicit triggers.
pub struct ChartRefresher {
    store: DailyStore,
    renderer: Arc<dyn ChartRenderer>,
    gate: RefreshGate,
    period: Duration,
}

impl ChartRefresher {
    pub fn new(store: DailyStore, renderer: Arc<dyn ChartRenderer>, period: Duration) -> Self {
        Self {
            store,
            renderer,
            gate: RefreshGate::default(),
            period,
        }
    }

    /// Starts a render of `request` on the blocking pool unless one is
    /// already running, in which case the request is dropped and `None` is
    /// returned.
    pub fn refresh(&self, request: &ChartRequest) -> Option<JoinHandle<()>> {
        let Some(permit) = self.gate.try_enter() else {
            debug!(ticker = %request.ticker, "render already in flight; dropping refresh");
            return None;
        };

        let store = self.store.clone();
        let renderer = Arc::clone(&self.renderer);
        let request = request.clone();
        Some(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let series = aggregate(&store, &request.ticker, request.start, request.end);
            if let Err(error) = renderer.render(&series) {
                warn!(ticker = %request.ticker, %error, "chart render failed");
            }
        }))
    }

    fn draw(&self, request: &ChartRequest, state: &mut InFlight, selection_changed: bool) {
        match self.refresh(request) {
            Some(task) => {
                state.task = Some(task);
                state.stale = false;
            }
            None => state.stale |= selection_changed,
        }
    }

    /// Runs until `cancel` fires. The first timer tick fires immediately.
    ///
    /// Timer ticks and manual triggers that land while a render is running
    /// are dropped. A selection that lands then is drawn as soon as that
    /// render finishes.
    pub async fn run(
        &self,
        initial: ChartRequest,
        mut triggers: mpsc::Receiver<RefreshTrigger>,
        cancel: CancellationToken,
    ) {
        let mut current = initial;
        let mut timer = tokio::time::interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            ticker = %current.ticker,
            period_secs = self.period.as_secs_f64(),
            "chart refresher started"
        );

        let mut state = InFlight::default();
        let mut triggers_open = true;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => self.draw(&current, &mut state, false),
                trigger = triggers.recv(), if triggers_open => match trigger {
                    Some(RefreshTrigger::Manual) => self.draw(&current, &mut state, false),
                    Some(RefreshTrigger::Select(request)) => {
                        debug!(
                            ticker = %request.ticker,
                            start = %request.start,
                            end = %request.end,
                            "chart selection changed"
                        );
                        current = request;
                        self.draw(&current, &mut state, true);
                    }
                    // All senders gone: keep going on the timer alone.
                    None => triggers_open = false,
                },
                _ = finished(&mut state.task), if state.task.is_some() => {
                    state.task = None;
                    if state.stale {
                        self.draw(&current, &mut state, true);
                    }
                }
            }
        }

        info!("chart refresher stopped");
    }
}

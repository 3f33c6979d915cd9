//! Scenario logic and the run loop
use crate::aggregator::{AggregateStats, Aggregator};
use crate::http::Http;
use crate::pool::Pool;
use crate::reporter;
use crate::scheduler::{Lifecycle, Phase, Schedule};
use crate::timer::Timer;
use std::{
    future::Future,
    num::NonZeroU32,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};
use surge_core::{ConfigError, RunStatistics, ScenarioConfig, Stage, StatusSet, Threshold, PROGRESS_INTERVAL};
use tokio::sync::watch;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// Load test scenario structure
///
/// Wraps a scenario function `Fn(Http) -> impl Future<Output = ()>`. Awaiting it runs the whole
/// schedule and resolves to the run statistics. Usually created by the
/// [`#[scenario]`](surge_macros::scenario) macro, or with [`Scenario::new`] for closures.
#[pin_project::pin_project]
pub struct Scenario<T> {
    func: T,
    runner_fut: Option<Pin<Box<dyn Future<Output = Result<RunStatistics, ConfigError>> + Send>>>,
    config: ScenarioConfig,
    stop: Option<StopSignal>,
}

impl<T> Scenario<T> {
    pub fn new(name: &str, func: T) -> Self {
        Self {
            func,
            runner_fut: None,
            config: ScenarioConfig::new(name),
            stop: None,
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }
}

impl<T, F> Future for Scenario<T>
where
    T: Fn(Http) -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    type Output = Result<RunStatistics, ConfigError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if this.runner_fut.is_none() {
            let func = this.func.clone();
            let config = this.config.clone();
            let stop = this.stop.take();
            *this.runner_fut = Some(Box::pin(run_scenario(func, config, stop)));
        }

        if let Some(runner) = this.runner_fut {
            runner.as_mut().poll(cx)
        } else {
            unreachable!()
        }
    }
}

/// Builder methods shared by every scenario, including those generated by `#[scenario]`.
pub trait ConfigurableScenario<T: Send>: Future<Output = T> + Sized + Send {
    fn stages(self, stages: Vec<Stage>) -> Self;
    fn stage(self, duration: Duration, target: u32) -> Self;
    fn threshold(self, threshold: Threshold) -> Self;
    fn thresholds(self, thresholds: Vec<Threshold>) -> Self;
    fn pause(self, pause: Duration) -> Self;
    fn tick(self, tick: Duration) -> Self;
    fn request_timeout(self, timeout: Duration) -> Self;
    fn rps(self, rps: NonZeroU32) -> Self;
    fn max_duration(self, duration: Duration) -> Self;
    fn expected_statuses(self, statuses: StatusSet) -> Self;
    fn stop_signal(self, signal: StopSignal) -> Self;
}

impl<T, F> ConfigurableScenario<Result<RunStatistics, ConfigError>> for Scenario<T>
where
    T: Fn(Http) -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    /// Replace the whole stage schedule.
    ///
    /// # Example
    /// ```no_run
    /// use surge::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let stats = my_scenario()
    ///         .stages(vec!["30s:20".parse().unwrap(), "2m:100".parse().unwrap(), "30s:0".parse().unwrap()])
    ///         .await
    ///         .unwrap();
    ///     println!("{}", Report(&stats));
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario(http: Http) {
    ///     http.get("http://localhost:3000/").await;
    /// }
    /// ```
    fn stages(mut self, stages: Vec<Stage>) -> Self {
        self.config.stages = stages;
        self
    }

    /// Append a stage ramping to `target` virtual users over `duration`.
    fn stage(mut self, duration: Duration, target: u32) -> Self {
        self.config.stages.push(Stage::new(duration, target));
        self
    }

    /// Add a pass/fail threshold, evaluated when the run completes.
    ///
    /// # Example
    /// ```no_run
    /// use surge::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let stats = my_scenario()
    ///         .stage(Duration::from_secs(60), 10)
    ///         .threshold("http_req_duration:p(95)<500".parse().unwrap())
    ///         .threshold("http_req_failed:rate<0.01".parse().unwrap())
    ///         .await
    ///         .unwrap();
    ///     assert!(stats.passed());
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario(http: Http) {
    ///     http.get("http://localhost:3000/").await;
    /// }
    /// ```
    fn threshold(mut self, threshold: Threshold) -> Self {
        self.config.thresholds.push(threshold);
        self
    }

    fn thresholds(mut self, thresholds: Vec<Threshold>) -> Self {
        self.config.thresholds.extend(thresholds);
        self
    }

    /// Pause each virtual user takes between iterations (default 1s).
    fn pause(mut self, pause: Duration) -> Self {
        self.config.pause = pause;
        self
    }

    /// How often the scheduler re-evaluates the target (default 100ms).
    fn tick(mut self, tick: Duration) -> Self {
        self.config.tick = tick;
        self
    }

    fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Cap the request rate across all virtual users.
    fn rps(mut self, rps: NonZeroU32) -> Self {
        self.config.rps = Some(rps);
        self
    }

    /// Stop the run early, draining virtual users, once `duration` has elapsed.
    fn max_duration(mut self, duration: Duration) -> Self {
        self.config.max_duration = Some(duration);
        self
    }

    /// Statuses that count as successful requests for `http_req_failed` (default 200-399).
    fn expected_statuses(mut self, statuses: StatusSet) -> Self {
        self.config.expected_statuses = statuses;
        self
    }

    /// Drain and finish the run as soon as the paired [`StopHandle`] fires.
    fn stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop = Some(signal);
        self
    }
}

/// Create a connected stop handle and signal for cancelling a run.
pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(tx), StopSignal(rx))
}

/// Triggers cancellation. Virtual users stop after their in-flight iteration.
#[derive(Debug)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

#[instrument(name="scenario", skip_all, fields(name=config.name))]
pub(crate) async fn run_scenario<T, F>(
    scenario: T,
    config: ScenarioConfig,
    stop: Option<StopSignal>,
) -> Result<RunStatistics, ConfigError>
where
    T: Fn(Http) -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    info!("Running {} with config {:?}", config.name, &config);

    let aggregator = Arc::new(Aggregator::new());
    let http = Http::new(&config, aggregator.clone())?;
    let schedule = Schedule::new(config.stages.clone());
    let mut pool = Pool::new(scenario, http, config.pause);
    let mut stats = AggregateStats::new();
    let mut lifecycle = Lifecycle::new();
    let mut cancelled = false;

    info!(
        "Schedule of {} stages over {}, peaking at {} VUs",
        schedule.stages().len(),
        humantime::format_duration(schedule.total_duration()),
        schedule.max_target()
    );

    let mut timer = Timer::new(config.tick).await;
    let start = Instant::now();
    let mut next_progress = PROGRESS_INTERVAL;
    lifecycle.advance(Phase::Ramping);

    // NOTE: `start` is the only clock; every target is derived from it.
    loop {
        let elapsed = start.elapsed();
        if elapsed >= schedule.total_duration() {
            break;
        }

        if stop.as_ref().is_some_and(StopSignal::is_stopped) {
            warn!("Stop requested, draining early.");
            cancelled = true;
            break;
        }

        if config.max_duration.is_some_and(|max| elapsed >= max) {
            warn!("Max duration reached, draining early.");
            cancelled = true;
            break;
        }

        let target = schedule.target_at(elapsed);
        pool.resize(target as usize);
        aggregator.collect(&mut stats);
        stats.observe_vus(pool.live(), pool.allocated());

        #[cfg(feature = "metrics")]
        {
            metrics::gauge!("vus").set(pool.live() as f64);
            metrics::gauge!("vus_max").set(pool.allocated() as f64);
        }

        if elapsed >= next_progress {
            next_progress += PROGRESS_INTERVAL;
            info!(
                "[{}] VUs {}/{}, {} requests",
                humantime::format_duration(Duration::from_secs(elapsed.as_secs())),
                pool.live(),
                schedule.max_target(),
                aggregator.requests()
            );
        }

        let tick = timer.tick().await;
        trace!("Tick after {tick:?}, target {target}");
    }

    lifecycle.advance(Phase::Draining);
    info!("Draining, {} VUs mid-iteration", pool.busy());
    pool.resize(0);
    stats.observe_vus(0, pool.allocated());
    while pool.busy() > 0 {
        timer.tick().await;
        aggregator.collect(&mut stats);
    }
    pool.shutdown().await;

    lifecycle.advance(Phase::Complete);
    aggregator.collect(&mut stats);
    stats.set_elapsed(start.elapsed());

    let statistics = reporter::finalize(&config, &stats, cancelled);
    info!(
        "Scenario complete: {} requests, {} thresholds failed",
        statistics.requests,
        statistics.thresholds.iter().filter(|t| !t.passed).count()
    );

    Ok(statistics)
}

//! Virtual user pool.
//!
//! Every virtual user is a long-lived tokio task that loops over the scenario while it is active.
//! Deactivated users finish their current iteration and park; they are re-activated before any
//! new user is spawned, so the number of spawned users never exceeds the peak target.
use crate::http::Http;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use surge_core::IterationResult;
use tokio::sync::watch;
use tokio::task::JoinHandle;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

struct VirtualUser {
    id: u64,
    active: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub(crate) struct Pool<T> {
    scenario: T,
    http: Http,
    pause: Duration,
    vus: Vec<VirtualUser>,
    // vus[..live] are active.
    live: usize,
    in_flight: Arc<AtomicUsize>,
}

impl<T, F> Pool<T>
where
    T: Fn(Http) -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(scenario: T, http: Http, pause: Duration) -> Self {
        Self {
            scenario,
            http,
            pause,
            vus: vec![],
            live: 0,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Grow or shrink the number of active virtual users to `target`.
    pub fn resize(&mut self, target: usize) {
        if self.live == target {
            return;
        }

        if self.live > target {
            while self.live > target {
                self.live -= 1;
                let vu = &self.vus[self.live];
                trace!("Retiring VU {}", vu.id);
                vu.active.send_replace(false);
            }
            return;
        }

        while self.live < target {
            if self.live < self.vus.len() {
                let vu = &self.vus[self.live];
                trace!("Re-activating VU {}", vu.id);
                vu.active.send_replace(true);
            } else {
                let vu = self.spawn();
                self.vus.push(vu);
            }
            self.live += 1;
        }
    }

    fn spawn(&self) -> VirtualUser {
        let id = self.vus.len() as u64 + 1;
        let (tx, rx) = watch::channel(true);
        trace!("Spawning VU {id}");

        let handle = tokio::spawn(
            run_vu(
                self.scenario.clone(),
                self.http.for_vu(id),
                self.pause,
                rx,
                self.in_flight.clone(),
            )
            .instrument(tracing::trace_span!("vu", id)),
        );

        VirtualUser {
            id,
            active: tx,
            handle,
        }
    }

    /// Active virtual users.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Virtual users ever spawned; inactive ones stay allocated for re-use.
    pub fn allocated(&self) -> usize {
        self.vus.len()
    }

    /// Virtual users currently inside an iteration.
    pub fn busy(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop every virtual user and wait for their tasks to exit.
    ///
    /// Callers should drain first; any iteration still running is awaited, never aborted.
    pub async fn shutdown(mut self) {
        self.resize(0);
        for vu in self.vus.drain(..) {
            // Dropping the sender is the exit signal.
            drop(vu.active);
            if let Err(e) = vu.handle.await {
                error!("VU {} exited abnormally: {e}", vu.id);
            }
        }
    }
}

async fn run_vu<T, F>(
    scenario: T,
    http: Http,
    pause: Duration,
    mut active: watch::Receiver<bool>,
    in_flight: Arc<AtomicUsize>,
) where
    T: Fn(Http) -> F,
    F: Future<Output = ()>,
{
    loop {
        while !*active.borrow_and_update() {
            if active.changed().await.is_err() {
                return;
            }
        }

        // Announce the iteration before the final activity check so a concurrent drain either
        // sees it in flight or stops it from starting.
        in_flight.fetch_add(1, Ordering::SeqCst);
        if !*active.borrow() {
            in_flight.fetch_sub(1, Ordering::SeqCst);
            continue;
        }

        let start = Instant::now();
        let res = AssertUnwindSafe(scenario(http.clone()))
            .catch_unwind()
            .await;
        let failed = match res {
            Ok(()) => false,
            Err(panic) => {
                warn!("Iteration of VU {} panicked: {}", http.vu(), panic_message(&panic));
                true
            }
        };
        http.record_iteration(IterationResult {
            duration: start.elapsed(),
            failed,
        });
        in_flight.fetch_sub(1, Ordering::SeqCst);

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = active.wait_for(|active| !*active) => {}
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

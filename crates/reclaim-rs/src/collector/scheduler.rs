//! Background scheduling for a [`Collector`]: timers and the visibility signal.
//!
//! [`Collector::start`] spawns one Tokio task that owns every timer:
//!
//! - the monitor interval, which re-evaluates memory pressure (first tick
//!   fires immediately);
//! - the optional forced-collection interval;
//! - a one-shot re-check scheduled after each automatic collection;
//! - a subscription to a [`VisibilitySignal`], re-evaluating when it turns
//!   [`Visible`](Visibility::Visible).
//!
//! Because one task drives all of these, sweeps never overlap. The returned
//! [`CollectorTask`] is the teardown handle: [`stop`](CollectorTask::stop)
//! ends the loop and drops the visibility subscription; dropping the handle
//! aborts the task.

use std::future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};

use super::Collector;
use super::events::{CollectTrigger, CollectorEvent, EvaluationTrigger};

/// Whether the user-facing surface is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Publisher of visibility changes.
///
/// Clone freely; all clones publish to the same subscribers. Each
/// [`subscribe`](Self::subscribe) call returns a receiver; dropping the
/// receiver unsubscribes.
#[derive(Clone, Debug)]
pub struct VisibilitySignal {
    tx: Arc<watch::Sender<Visibility>>,
}

impl VisibilitySignal {
    pub fn new(initial: Visibility) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Publish `visibility`. Returns `false` (and notifies nobody) when it
    /// equals the current value.
    pub fn set(&self, visibility: Visibility) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == visibility {
                false
            } else {
                *current = visibility;
                true
            }
        })
    }

    pub fn current(&self) -> Visibility {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Visibility> {
        self.tx.subscribe()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for VisibilitySignal {
    fn default() -> Self {
        Self::new(Visibility::Visible)
    }
}

/// Handle to a running collector task.
pub struct CollectorTask {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl CollectorTask {
    /// Stop the loop and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    /// Whether the task has already exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }
}

impl Drop for CollectorTask {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

impl Collector {
    /// Spawn the background task on the current Tokio runtime.
    ///
    /// `visibility` is ignored when
    /// [`optimize_on_visibility_change`](super::CollectorConfig::optimize_on_visibility_change)
    /// is off.
    pub fn start(self: &Arc<Self>, visibility: Option<&VisibilitySignal>) -> CollectorTask {
        let visibility = visibility
            .filter(|_| self.config().optimize_on_visibility_change)
            .map(VisibilitySignal::subscribe);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(run(Arc::clone(self), visibility, shutdown_rx));
        CollectorTask {
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }

    /// Spawn a one-off [`Recheck`](EvaluationTrigger::Recheck) evaluation
    /// after [`recheck_delay`](super::CollectorConfig::recheck_delay).
    ///
    /// For evaluations made outside the background task, such as a manual
    /// [`evaluate`](Collector::evaluate) whose result
    /// [`needs_recheck`](super::Evaluation::needs_recheck).
    pub fn schedule_recheck(self: &Arc<Self>) -> JoinHandle<super::Evaluation> {
        let collector = Arc::clone(self);
        let delay = collector.config().recheck_delay;
        tokio::spawn(async move {
            time::sleep(delay).await;
            collector.evaluate(EvaluationTrigger::Recheck)
        })
    }
}

async fn run(
    collector: Arc<Collector>,
    mut visibility: Option<watch::Receiver<Visibility>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let config = collector.config().clone();
    collector.emit(&CollectorEvent::Started {
        monitor_interval: config.monitor_interval,
        auto_collect_interval: config.auto_collect_interval,
    });

    let mut monitor = time::interval(config.monitor_interval);
    monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut forced = config.auto_collect_interval.map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let mut recheck: Option<Pin<Box<Sleep>>> = None;
    let mut trigger = EvaluationTrigger::Startup;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = monitor.tick() => {
                let evaluation = collector.evaluate(trigger);
                trigger = EvaluationTrigger::Interval;
                if evaluation.needs_recheck() {
                    recheck = Some(Box::pin(time::sleep(config.recheck_delay)));
                }
            }
            _ = tick(forced.as_mut()) => {
                collector.sweep(CollectTrigger::Interval, |_| true);
            }
            changed = visibility_changed(visibility.as_mut()) => match changed {
                Some(current) => {
                    collector.emit(&CollectorEvent::VisibilityChanged(current));
                    if current == Visibility::Visible {
                        let evaluation = collector.evaluate(EvaluationTrigger::Visibility);
                        if evaluation.needs_recheck() {
                            recheck = Some(Box::pin(time::sleep(config.recheck_delay)));
                        }
                    }
                }
                // Publisher gone: stop listening.
                None => visibility = None,
            },
            _ = wake(recheck.as_mut()) => {
                recheck = None;
                collector.evaluate(EvaluationTrigger::Recheck);
            }
        }
    }

    collector.emit(&CollectorEvent::Stopped);
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn wake(sleep: Option<&mut Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}

async fn visibility_changed(rx: Option<&mut watch::Receiver<Visibility>>) -> Option<Visibility> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => future::pending().await,
    }
}

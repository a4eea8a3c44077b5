use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use crate::alert::{AlertEvent, AlertSelector, AlertSink};
use crate::detect::Detection;
use crate::frame::{FrameView, RawFrame};
use crate::pipeline::gate::{Admission, AdmissionGate, AdmissionIntervals, AdmissionTicket};
use crate::pipeline::Pipeline;

/// What happened to a submitted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Copied out and handed to the inference worker.
    Admitted,
    /// Dropped: a run is in flight.
    Busy,
    /// Dropped: too soon after the last run started.
    Throttled,
    /// Dropped: detection is stopped.
    Stopped,
}

/// Counter snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub admitted: u64,
    pub dropped_busy: u64,
    pub dropped_throttled: u64,
    pub dropped_stopped: u64,
    pub failed: u64,
    pub delivered: u64,
    pub discarded: u64,
    pub alerts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    dropped_busy: AtomicU64,
    dropped_throttled: AtomicU64,
    dropped_stopped: AtomicU64,
    failed: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
    alerts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
            dropped_throttled: self.dropped_throttled.load(Ordering::Relaxed),
            dropped_stopped: self.dropped_stopped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
        }
    }
}

struct Job {
    frame: RawFrame,
    depth_enabled: bool,
    ticket: AdmissionTicket,
}

struct Outcome {
    detections: Vec<Detection>,
    generation: u64,
}

/// Detection session: admission gate, inference worker and result delivery.
///
/// `submit` runs on the producer's thread and never blocks on inference. An
/// admitted frame is copied out before `submit` returns, then processed on the
/// worker thread. Results are handed to a single delivery thread, which runs
/// the alert selector and the callbacks one result at a time.
///
/// Every scheduler owns its own gate, selector and cooldown table.
pub struct FrameScheduler {
    gate: AdmissionGate,
    has_depth: bool,
    depth_enabled: Arc<AtomicBool>,
    selector: Arc<Mutex<AlertSelector>>,
    counters: Arc<Counters>,
    jobs: Option<SyncSender<Job>>,
    worker: Option<JoinHandle<()>>,
    delivery: Option<JoinHandle<()>>,
}

impl FrameScheduler {
    /// Start the worker threads. The returned scheduler is running.
    ///
    /// `on_result` receives every delivered ranked list together with the
    /// alert selected for it, if any; `sink` is notified afterwards. Both run
    /// on the delivery thread with the selector locked, so they must not call
    /// back into `stop`.
    pub fn spawn<S, F>(
        pipeline: Pipeline,
        selector: AlertSelector,
        sink: S,
        on_result: F,
        intervals: AdmissionIntervals,
    ) -> Result<Self>
    where
        S: AlertSink + 'static,
        F: FnMut(&[Detection], Option<&AlertEvent>) + Send + 'static,
    {
        let gate = AdmissionGate::new(intervals);
        let has_depth = pipeline.has_depth();
        let depth_enabled = Arc::new(AtomicBool::new(has_depth));
        let selector = Arc::new(Mutex::new(selector));
        let counters = Arc::new(Counters::default());

        let (jobs_tx, jobs_rx) = mpsc::sync_channel::<Job>(1);
        let (results_tx, results_rx) = mpsc::channel::<Outcome>();

        let worker_counters = counters.clone();
        let worker = std::thread::Builder::new()
            .name("perception-worker".to_string())
            .spawn(move || run_worker(pipeline, jobs_rx, results_tx, worker_counters))
            .context("failed to spawn inference worker")?;

        let delivery_gate = gate.clone();
        let delivery_selector = selector.clone();
        let delivery_counters = counters.clone();
        let delivery = std::thread::Builder::new()
            .name("perception-delivery".to_string())
            .spawn(move || {
                run_delivery(
                    results_rx,
                    delivery_gate,
                    delivery_selector,
                    delivery_counters,
                    sink,
                    on_result,
                )
            })
            .context("failed to spawn result delivery")?;

        Ok(Self {
            gate,
            has_depth,
            depth_enabled,
            selector,
            counters,
            jobs: Some(jobs_tx),
            worker: Some(worker),
            delivery: Some(delivery),
        })
    }

    pub fn submit(&self, view: &FrameView<'_>) -> SubmitOutcome {
        self.submit_at(view, Instant::now())
    }

    /// Admission decision at an explicit instant.
    pub fn submit_at(&self, view: &FrameView<'_>, now: Instant) -> SubmitOutcome {
        let depth_enabled = self.depth_enabled();
        let ticket = match self.gate.try_admit(now, depth_enabled) {
            Admission::Admitted(ticket) => ticket,
            Admission::Busy => {
                Counters::bump(&self.counters.dropped_busy);
                log::trace!("frame dropped: run in flight");
                return SubmitOutcome::Busy;
            }
            Admission::Throttled => {
                Counters::bump(&self.counters.dropped_throttled);
                log::trace!("frame dropped: throttled");
                return SubmitOutcome::Throttled;
            }
            Admission::Stopped => {
                Counters::bump(&self.counters.dropped_stopped);
                return SubmitOutcome::Stopped;
            }
        };

        let frame = RawFrame::copy_from(view);
        log::debug!(
            "frame admitted: {}x{} {:?}, {} bytes, depth {}",
            frame.width,
            frame.height,
            frame.format,
            frame.byte_len(),
            depth_enabled
        );
        let job = Job {
            frame,
            depth_enabled,
            ticket,
        };
        let Some(jobs) = self.jobs.as_ref() else {
            return SubmitOutcome::Stopped;
        };
        // The ticket guarantees the worker has taken the previous job.
        match jobs.try_send(job) {
            Ok(()) => {
                Counters::bump(&self.counters.admitted);
                SubmitOutcome::Admitted
            }
            Err(TrySendError::Full(_)) => {
                Counters::bump(&self.counters.dropped_busy);
                SubmitOutcome::Busy
            }
            Err(TrySendError::Disconnected(_)) => {
                log::error!("inference worker gone, detection stopped");
                Counters::bump(&self.counters.dropped_stopped);
                self.stop();
                SubmitOutcome::Stopped
            }
        }
    }

    /// Resume admitting frames. Cooldowns start empty.
    pub fn start(&self) {
        if !self.gate.is_running() {
            log::info!("detection started");
        }
        self.gate.start();
    }

    /// Stop admitting frames and clear the cooldown table.
    ///
    /// A run already in flight completes, but its result is discarded. Once
    /// this returns, no further result or alert is delivered until `start`.
    pub fn stop(&self) {
        let mut selector = lock_selector(&self.selector);
        if self.gate.is_running() {
            log::info!("detection stopped");
        }
        self.gate.stop();
        selector.reset();
    }

    pub fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    /// Switch depth fusion on or off; takes effect with the next admitted frame.
    ///
    /// Without a depth network the scheduler stays in the faster no-depth mode.
    pub fn set_depth_enabled(&self, enabled: bool) {
        if enabled && !self.has_depth {
            log::warn!("depth fusion requested without a depth network, ignored");
            return;
        }
        let previous = self.depth_enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            log::info!(
                "depth fusion {}, minimum interval {:?}",
                if enabled { "enabled" } else { "disabled" },
                self.gate.intervals().for_depth(enabled)
            );
        }
    }

    pub fn depth_enabled(&self) -> bool {
        self.depth_enabled.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    /// Stop, let the in-flight run finish, and join both threads.
    pub fn shutdown(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        self.stop();
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("inference worker panicked"))?;
        }
        if let Some(delivery) = self.delivery.take() {
            delivery
                .join()
                .map_err(|_| anyhow!("result delivery panicked"))?;
        }
        Ok(())
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("scheduler shutdown: {}", err);
        }
    }
}

fn run_worker(
    mut pipeline: Pipeline,
    jobs: Receiver<Job>,
    results: Sender<Outcome>,
    counters: Arc<Counters>,
) {
    for job in jobs {
        let Job {
            frame,
            depth_enabled,
            ticket,
        } = job;
        let started = Instant::now();
        let run = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&frame, depth_enabled)));
        let detections = match run {
            Ok(Ok(detections)) => detections,
            Ok(Err(err)) => {
                Counters::bump(&counters.failed);
                log::error!("pipeline run failed: {}", err);
                Vec::new()
            }
            Err(payload) => {
                Counters::bump(&counters.failed);
                log::error!("pipeline run panicked: {}", panic_message(payload.as_ref()));
                Vec::new()
            }
        };
        log::debug!(
            "pipeline run: {} detections in {:?}, {:?} after capture",
            detections.len(),
            started.elapsed(),
            frame.captured_at().elapsed()
        );
        let generation = ticket.generation();
        drop(frame);
        drop(ticket);
        if results
            .send(Outcome {
                detections,
                generation,
            })
            .is_err()
        {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

fn run_delivery<S, F>(
    results: Receiver<Outcome>,
    gate: AdmissionGate,
    selector: Arc<Mutex<AlertSelector>>,
    counters: Arc<Counters>,
    mut sink: S,
    mut on_result: F,
) where
    S: AlertSink,
    F: FnMut(&[Detection], Option<&AlertEvent>),
{
    for outcome in results {
        let mut selector = lock_selector(&selector);
        if !gate.is_current(outcome.generation) {
            Counters::bump(&counters.discarded);
            log::debug!("result discarded: detection stopped since admission");
            continue;
        }
        let alert = selector.select(&outcome.detections);
        Counters::bump(&counters.delivered);
        on_result(&outcome.detections, alert.as_ref());
        if let Some(event) = alert.as_ref() {
            Counters::bump(&counters.alerts);
            sink.notify(event);
        }
    }
}

fn lock_selector(selector: &Mutex<AlertSelector>) -> MutexGuard<'_, AlertSelector> {
    selector.lock().unwrap_or_else(PoisonError::into_inner)
}

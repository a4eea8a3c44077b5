use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use anyhow::anyhow;

use perception_kernel::detect::{LabelTable, StubBackend};
use perception_kernel::{
    AdmissionIntervals, AlertEvent, AlertSelector, ChannelAlertSink, Detection, DistanceCategory,
    FrameScheduler, FrameView, InferenceBackend, PipelineSettings, PixelFormat, Pipeline,
    PlaneView, SubmitOutcome, Tensor,
};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
const WAIT: Duration = Duration::from_secs(5);

type Delivered = (Vec<Detection>, Option<AlertEvent>);

struct Session {
    scheduler: FrameScheduler,
    results: Receiver<Delivered>,
    alerts: Receiver<AlertEvent>,
}

fn session_with(detector: Box<dyn InferenceBackend>) -> Session {
    let depth: Box<dyn InferenceBackend> = Box::new(StubBackend::flat_depth(16, 500.0));
    spawn_session(detector, Some(depth))
}

fn spawn_session(
    detector: Box<dyn InferenceBackend>,
    depth: Option<Box<dyn InferenceBackend>>,
) -> Session {
    let pipeline = Pipeline::new(
        detector,
        depth,
        LabelTable::coco(),
        PipelineSettings::default(),
    )
    .unwrap();

    let (alert_tx, alerts) = mpsc::channel();
    let (result_tx, results) = mpsc::channel();
    let scheduler = FrameScheduler::spawn(
        pipeline,
        AlertSelector::new(),
        ChannelAlertSink::new(alert_tx),
        move |detections: &[Detection], alert: Option<&AlertEvent>| {
            let _ = result_tx.send((detections.to_vec(), alert.cloned()));
        },
        AdmissionIntervals::default(),
    )
    .unwrap();
    Session {
        scheduler,
        results,
        alerts,
    }
}

fn session(latency: Option<Duration>) -> Session {
    let mut detector = StubBackend::centered_detector(64, 80).unwrap();
    if let Some(latency) = latency {
        detector = detector.with_latency(latency);
    }
    session_with(Box::new(detector))
}

/// Lend a camera-owned BGRA frame to `submit`, then scribble over the buffer
/// the way a camera recycles it.
fn submit(scheduler: &FrameScheduler, now: Instant) -> SubmitOutcome {
    let mut camera_memory = vec![90u8; (WIDTH * HEIGHT * 4) as usize];
    let outcome = {
        let planes = [PlaneView {
            data: &camera_memory,
            row_stride: WIDTH as usize * 4,
            pixel_stride: 4,
        }];
        let view = FrameView {
            width: WIDTH,
            height: HEIGHT,
            format: PixelFormat::Bgra8888,
            planes: &planes,
        };
        scheduler.submit_at(&view, now)
    };
    camera_memory.fill(0);
    outcome
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn delivers_ranked_result_and_one_alert() {
    let session = session(None);
    let t0 = Instant::now();

    assert_eq!(submit(&session.scheduler, t0), SubmitOutcome::Admitted);
    let (detections, alert) = session.results.recv_timeout(WAIT).expect("result");
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].class_name, "person");
    assert_eq!(detections[0].category, DistanceCategory::VeryClose);
    assert_eq!(
        alert,
        Some(AlertEvent::new("person", DistanceCategory::VeryClose))
    );

    let event = session.alerts.recv_timeout(WAIT).expect("alert");
    assert_eq!(event.message(), "person very close");
    assert!(session.alerts.try_recv().is_err());

    let stats = session.scheduler.stats();
    assert_eq!(stats.admitted, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.alerts, 1);
    session.scheduler.shutdown().unwrap();
}

#[test]
fn throttles_by_depth_interval() {
    let session = session(None);
    let t0 = Instant::now();

    assert_eq!(submit(&session.scheduler, t0), SubmitOutcome::Admitted);
    session.results.recv_timeout(WAIT).expect("first result");

    let t1 = t0 + Duration::from_millis(400);
    assert_eq!(submit(&session.scheduler, t1), SubmitOutcome::Throttled);

    session.scheduler.set_depth_enabled(false);
    assert!(!session.scheduler.depth_enabled());
    assert_eq!(submit(&session.scheduler, t1), SubmitOutcome::Admitted);
    let (detections, alert) = session.results.recv_timeout(WAIT).expect("second result");
    assert_eq!(detections[0].category, DistanceCategory::Far);
    // New key (person, far): fires despite the recent very-close alert.
    assert_eq!(alert.map(|event| event.category), Some(DistanceCategory::Far));

    assert_eq!(session.scheduler.stats().dropped_throttled, 1);
    session.scheduler.shutdown().unwrap();
}

#[test]
fn drops_frames_while_a_run_is_in_flight() {
    let session = session(Some(Duration::from_millis(300)));
    let t0 = Instant::now();

    assert_eq!(submit(&session.scheduler, t0), SubmitOutcome::Admitted);
    assert_eq!(
        submit(&session.scheduler, t0 + Duration::from_secs(10)),
        SubmitOutcome::Busy
    );
    session.results.recv_timeout(WAIT).expect("result");

    // The slot frees before delivery; no queued frame follows.
    assert!(session.results.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(
        submit(&session.scheduler, t0 + Duration::from_secs(20)),
        SubmitOutcome::Admitted
    );
    session.results.recv_timeout(WAIT).expect("second result");

    let stats = session.scheduler.stats();
    assert_eq!(stats.admitted, 2);
    assert_eq!(stats.dropped_busy, 1);
    session.scheduler.shutdown().unwrap();
}

#[test]
fn stop_discards_in_flight_result_and_resets_cooldowns() {
    let session = session(Some(Duration::from_millis(200)));
    let t0 = Instant::now();

    assert_eq!(submit(&session.scheduler, t0), SubmitOutcome::Admitted);
    session.results.recv_timeout(WAIT).expect("first result");
    session.alerts.recv_timeout(WAIT).expect("first alert");

    let t1 = t0 + Duration::from_secs(10);
    assert_eq!(submit(&session.scheduler, t1), SubmitOutcome::Admitted);
    session.scheduler.stop();
    assert!(!session.scheduler.is_running());
    assert_eq!(
        submit(&session.scheduler, t1 + Duration::from_secs(10)),
        SubmitOutcome::Stopped
    );

    assert!(wait_for(|| session.scheduler.stats().discarded == 1));
    assert!(session.results.try_recv().is_err());
    assert!(session.alerts.try_recv().is_err());

    // Restarted detection alerts again at once: the cooldown table was cleared.
    session.scheduler.start();
    assert_eq!(
        submit(&session.scheduler, t1 + Duration::from_secs(20)),
        SubmitOutcome::Admitted
    );
    let (_, alert) = session.results.recv_timeout(WAIT).expect("restarted result");
    assert!(alert.is_some());
    session.alerts.recv_timeout(WAIT).expect("restarted alert");
    session.scheduler.shutdown().unwrap();
}

struct FailingDetector;

impl InferenceBackend for FailingDetector {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn input_shape(&self) -> &[usize] {
        &[1, 32, 32, 3]
    }

    fn output_shape(&self) -> &[usize] {
        &[]
    }

    fn run(&mut self, _input: &Tensor) -> anyhow::Result<Tensor> {
        Err(anyhow!("accelerator reset"))
    }
}

#[test]
fn failed_run_delivers_empty_list_without_retry() {
    let session = session_with(Box::new(FailingDetector));
    let t0 = Instant::now();

    assert_eq!(submit(&session.scheduler, t0), SubmitOutcome::Admitted);
    let (detections, alert) = session.results.recv_timeout(WAIT).expect("result");
    assert!(detections.is_empty());
    assert!(alert.is_none());
    assert!(session.results.recv_timeout(Duration::from_millis(100)).is_err());

    let stats = session.scheduler.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.admitted, 1);
    session.scheduler.shutdown().unwrap();
}

/// Panics on its first run, then behaves like the centered stub detector.
struct PanicOnceDetector {
    inner: StubBackend,
    panicked: bool,
}

impl InferenceBackend for PanicOnceDetector {
    fn name(&self) -> &'static str {
        "panic-once"
    }

    fn input_shape(&self) -> &[usize] {
        self.inner.input_shape()
    }

    fn output_shape(&self) -> &[usize] {
        self.inner.output_shape()
    }

    fn run(&mut self, input: &Tensor) -> anyhow::Result<Tensor> {
        if !self.panicked {
            self.panicked = true;
            panic!("detector kernel crashed");
        }
        self.inner.run(input)
    }
}

#[test]
fn panicking_run_does_not_end_the_session() {
    let detector = PanicOnceDetector {
        inner: StubBackend::centered_detector(64, 80).unwrap(),
        panicked: false,
    };
    let session = session_with(Box::new(detector));
    let t0 = Instant::now();

    assert_eq!(submit(&session.scheduler, t0), SubmitOutcome::Admitted);
    let (detections, alert) = session.results.recv_timeout(WAIT).expect("faulted result");
    assert!(detections.is_empty());
    assert!(alert.is_none());

    let t1 = t0 + Duration::from_secs(5);
    assert_eq!(submit(&session.scheduler, t1), SubmitOutcome::Admitted);
    let (detections, _) = session.results.recv_timeout(WAIT).expect("next result");
    assert_eq!(detections.len(), 1);
    assert!(session.scheduler.is_running());

    let stats = session.scheduler.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.delivered, 2);
    session.scheduler.shutdown().unwrap();
}

#[test]
fn depth_cannot_be_enabled_without_a_depth_network() {
    let detector = StubBackend::centered_detector(64, 80).unwrap();
    let session = spawn_session(Box::new(detector), None);
    assert!(!session.scheduler.depth_enabled());

    session.scheduler.set_depth_enabled(true);
    assert!(!session.scheduler.depth_enabled());

    let t0 = Instant::now();
    assert_eq!(submit(&session.scheduler, t0), SubmitOutcome::Admitted);
    session.results.recv_timeout(WAIT).expect("first result");
    // Paced by the 300 ms no-depth interval.
    let t1 = t0 + Duration::from_millis(400);
    assert_eq!(submit(&session.scheduler, t1), SubmitOutcome::Admitted);
    session.results.recv_timeout(WAIT).expect("second result");
    session.scheduler.shutdown().unwrap();
}

#[test]
fn sessions_are_independent() {
    let first = session(None);
    let second = session(None);
    let t0 = Instant::now();

    assert_eq!(submit(&first.scheduler, t0), SubmitOutcome::Admitted);
    assert_eq!(submit(&second.scheduler, t0), SubmitOutcome::Admitted);
    first.scheduler.stop();

    second.results.recv_timeout(WAIT).expect("second session result");
    second.alerts.recv_timeout(WAIT).expect("second session alert");
    assert!(second.scheduler.is_running());
    assert!(!first.scheduler.is_running());
}

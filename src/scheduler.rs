use crate::geometry;
use crate::params::{Controls, FilterParameters};
use crate::pipeline::Detector;
use crate::shapes::ellipse::FaceEllipse;
use crate::transform;
use crate::video::{FrameSink, FrameSource};
use anyhow::Result;
use image::{Rgba, RgbaImage};
use pollster::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{Level, debug, error, span, trace, warn};

const TRACE_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Last committed face region. Written whole by the detection side, copied
/// whole by the render side, so a frame never sees half an update.
#[derive(Debug, Clone, Default)]
pub struct SharedEllipse {
    inner: Arc<RwLock<FaceEllipse>>,
}

impl SharedEllipse {
    pub fn snapshot(&self) -> FaceEllipse {
        match self.inner.read() {
            Ok(e) => *e,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn commit(&self, ellipse: FaceEllipse) {
        match self.inner.write() {
            Ok(mut e) => *e = ellipse,
            Err(poisoned) => *poisoned.into_inner() = ellipse,
        }
    }
}

/// Owns the detector on a dedicated thread. At most one detection is in
/// flight; submitting while busy is a no-op.
pub struct DetectionWorker {
    frames: flume::Sender<RgbaImage>,
    busy: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

/// Lives as long as the worker thread. Clears the in-flight flag however the
/// thread ends, so a panicking detector cannot wedge submissions.
struct WorkerExit {
    busy: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Face detection thread panicked, face region will no longer update");
        } else {
            debug!("Face detection thread finished");
        }
        self.busy.store(false, Ordering::Release);
        self.stopped.store(true, Ordering::Release);
    }
}

impl DetectionWorker {
    pub fn spawn<D: Detector + 'static>(mut detector: D, ellipse: SharedEllipse) -> Result<Self> {
        let (frames, rx) = flume::bounded::<RgbaImage>(1);
        let busy = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let exit = WorkerExit {
            busy: Arc::clone(&busy),
            stopped: Arc::clone(&stopped),
        };

        // Exits once the sender side is dropped
        thread::Builder::new()
            .name("face-detection".into())
            .spawn(move || {
                let exit = exit;
                for frame in rx.iter() {
                    let span = span!(Level::DEBUG, "detect");
                    let guard = span.enter();
                    let start = Instant::now();

                    match detector.detect(&frame).block_on() {
                        Ok(detection) => {
                            ellipse.commit(geometry::face_ellipse(&detection));
                            debug!("Detection took {:?}", start.elapsed());
                        }
                        Err(e) => warn!("Face detection failed, keeping last region: {e:?}"),
                    }

                    drop(guard);
                    exit.busy.store(false, Ordering::Release);
                }
            })?;

        Ok(Self {
            frames,
            busy,
            stopped,
        })
    }

    /// Hands a copy of `frame` to the detector. Returns false when skipped
    /// because a detection is still running.
    pub fn submit(&self, frame: &RgbaImage) -> bool {
        if !self.is_running() || self.busy.swap(true, Ordering::AcqRel) {
            return false;
        }

        match self.frames.try_send(frame.clone()) {
            Ok(_) => true,
            Err(e) => {
                warn!("Could not hand frame to detector: {e}");
                self.busy.store(false, Ordering::Release);
                false
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// False once the detection thread has exited.
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }
}

/// Drives per frame processing and the slower detection cadence.
pub struct FrameScheduler {
    ellipse: SharedEllipse,
    worker: Option<DetectionWorker>,
    detect_every: Duration,
    last_tick: Option<Instant>,
    trace: bool,
}

impl FrameScheduler {
    /// Scheduler without a detector; the face region only changes through
    /// [`SharedEllipse::commit`].
    pub fn new() -> Self {
        Self {
            ellipse: SharedEllipse::default(),
            worker: None,
            detect_every: Duration::ZERO,
            last_tick: None,
            trace: false,
        }
    }

    pub fn with_detector<D: Detector + 'static>(detector: D, detect_every: Duration) -> Result<Self> {
        let ellipse = SharedEllipse::default();
        let worker = DetectionWorker::spawn(detector, ellipse.clone())?;

        Ok(Self {
            ellipse,
            worker: Some(worker),
            detect_every,
            last_tick: None,
            trace: false,
        })
    }

    /// Draw the face region outline on every output frame
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn shared_ellipse(&self) -> SharedEllipse {
        self.ellipse.clone()
    }

    pub fn ellipse(&self) -> FaceEllipse {
        self.ellipse.snapshot()
    }

    /// Submits `frame` for detection if a detection tick is due. A tick that
    /// lands while a detection is in flight is skipped, never queued.
    fn tick_detection(&mut self, frame: &RgbaImage) {
        let Some(worker) = &self.worker else {
            return;
        };

        let due = self
            .last_tick
            .is_none_or(|t| t.elapsed() >= self.detect_every);
        if !due {
            return;
        }

        self.last_tick = Some(Instant::now());
        if !worker.submit(frame) {
            trace!("Detection still in flight, skipping tick");
        }
    }

    /// Processes one frame. Never waits on detection: uses whatever region
    /// was committed last.
    pub fn process_frame(&mut self, frame: &RgbaImage, params: &FilterParameters) -> RgbaImage {
        let span = span!(Level::DEBUG, "process_frame");
        let _guard = span.enter();
        let start = Instant::now();

        self.tick_detection(frame);

        let region = if params.face_mask_enabled {
            self.ellipse.snapshot()
        } else {
            FaceEllipse::WHOLE_FRAME
        };

        let mut output = transform::apply(frame, &region, params);
        if self.trace {
            region.draw_outline(&mut output, TRACE_COLOR);
        }

        debug!("{}ms to process frame", start.elapsed().as_millis());
        output
    }

    /// Pulls frames from `source` until it runs dry or fails, pushing each
    /// processed frame to `sink`. Returns the number of frames written.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K, controls: &Controls) -> usize
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        let mut written = 0;

        loop {
            let span = span!(Level::INFO, "frame_loop_iter");
            let _guard = span.enter();

            let get_frame_span = span!(Level::DEBUG, "get_frame");
            let get_frame_guard = get_frame_span.enter();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("Source exhausted after {written} frames");
                    break;
                }
                Err(e) => {
                    error!("Failed to pull frame from source: {e:?}");
                    break;
                }
            };
            drop(get_frame_guard);

            let params = controls.snapshot();
            let output = self.process_frame(&frame, &params);

            let write_frame_span = span!(Level::DEBUG, "write_frame");
            let write_frame_guard = write_frame_span.enter();
            match sink.write_frame(&output) {
                Ok(_) => {
                    trace!("Rendered frame.");
                    written += 1;
                }
                Err(e) => error!("Failed to render frame: {e:?}"),
            }
            drop(write_frame_guard);
        }

        written
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Anchors, Detection, FixedDetector, Landmarks};
    use crate::shapes::point::PointF32;
    use anyhow::Error;
    use std::sync::mpsc;

    fn face() -> Detection {
        Some(Landmarks::from_anchors(&Anchors {
            nose_tip: PointF32::new(0.5, 0.45),
            forehead: PointF32::new(0.5, 0.2),
            chin: PointF32::new(0.5, 0.8),
            l_eye_outer: PointF32::new(0.35, 0.4),
            r_eye_outer: PointF32::new(0.65, 0.4),
        }))
    }

    fn wait_for(ellipse: &SharedEllipse, pred: impl Fn(&FaceEllipse) -> bool) -> FaceEllipse {
        let start = Instant::now();
        loop {
            let e = ellipse.snapshot();
            if pred(&e) || start.elapsed() > Duration::from_secs(5) {
                return e;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Blocks inside detect until released by the test.
    struct GatedDetector {
        gate: mpsc::Receiver<()>,
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Detector for GatedDetector {
        async fn detect(&mut self, _frame: &RgbaImage) -> Result<Detection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.recv();
            Ok(face())
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        async fn detect(&mut self, _frame: &RgbaImage) -> Result<Detection> {
            Err(Error::msg("model exploded"))
        }
    }

    #[test]
    fn shared_ellipse_swaps_whole_value() {
        let shared = SharedEllipse::default();
        assert_eq!(shared.snapshot(), FaceEllipse::NONE);

        let e = FaceEllipse::new(PointF32::new(0.3, 0.3), 0.1, 0.2);
        shared.commit(e);
        assert_eq!(shared.snapshot(), e);
    }

    #[test]
    fn detection_commits_region() -> Result<()> {
        let mut scheduler = FrameScheduler::with_detector(FixedDetector::new(face()), Duration::ZERO)?;
        let frame = RgbaImage::new(8, 8);
        scheduler.process_frame(&frame, &FilterParameters::default());

        let e = wait_for(&scheduler.shared_ellipse(), |e| !e.is_degenerate());
        assert!((e.major_radius - 0.18).abs() < 1e-5);
        assert!((e.minor_radius - 0.36).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn empty_detection_clears_region() -> Result<()> {
        let mut scheduler = FrameScheduler::with_detector(FixedDetector::new(None), Duration::ZERO)?;
        let shared = scheduler.shared_ellipse();
        shared.commit(FaceEllipse::WHOLE_FRAME);

        scheduler.process_frame(&RgbaImage::new(4, 4), &FilterParameters::default());
        let e = wait_for(&shared, |e| *e == FaceEllipse::NONE);
        assert_eq!(e, FaceEllipse::NONE);
        Ok(())
    }

    #[test]
    fn failed_detection_keeps_last_region() -> Result<()> {
        let ellipse = SharedEllipse::default();
        let kept = FaceEllipse::new(PointF32::new(0.4, 0.4), 0.2, 0.3);
        ellipse.commit(kept);

        let worker = DetectionWorker::spawn(FailingDetector, ellipse.clone())?;
        assert!(worker.submit(&RgbaImage::new(4, 4)));

        let start = Instant::now();
        while worker.is_busy() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!worker.is_busy());
        assert_eq!(ellipse.snapshot(), kept);
        Ok(())
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        async fn detect(&mut self, _frame: &RgbaImage) -> Result<Detection> {
            panic!("detector bug");
        }
    }

    #[test]
    fn panicking_detector_releases_worker() -> Result<()> {
        let ellipse = SharedEllipse::default();
        let worker = DetectionWorker::spawn(PanickingDetector, ellipse.clone())?;
        let frame = RgbaImage::new(4, 4);
        assert!(worker.submit(&frame));

        let start = Instant::now();
        while worker.is_running() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(2));
        }

        assert!(!worker.is_running());
        assert!(!worker.is_busy());
        assert!(!worker.submit(&frame));
        assert!(!worker.is_busy());
        assert_eq!(ellipse.snapshot(), FaceEllipse::NONE);
        Ok(())
    }

    #[test]
    fn busy_worker_skips_submissions() -> Result<()> {
        let (release, gate) = mpsc::channel();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let detector = GatedDetector {
            gate,
            calls: Arc::clone(&calls),
        };
        let ellipse = SharedEllipse::default();
        let worker = DetectionWorker::spawn(detector, ellipse.clone())?;
        let frame = RgbaImage::new(4, 4);

        assert!(worker.submit(&frame));
        assert!(!worker.submit(&frame));
        assert!(!worker.submit(&frame));

        release.send(())?;
        wait_for(&ellipse, |e| !e.is_degenerate());
        let start = Instant::now();
        while worker.is_busy() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(worker.submit(&frame));
        release.send(())?;
        Ok(())
    }

    #[test]
    fn render_does_not_wait_for_detection() -> Result<()> {
        let (release, gate) = mpsc::channel();
        let detector = GatedDetector {
            gate,
            calls: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        };
        let mut scheduler = FrameScheduler::with_detector(detector, Duration::ZERO)?;
        let frame = RgbaImage::from_pixel(6, 6, Rgba([90, 90, 90, 255]));
        let params = FilterParameters {
            brightness: 0.3,
            ..Default::default()
        };

        // Detector is blocked; frames still flow using the empty region
        for _ in 0..3 {
            assert_eq!(scheduler.process_frame(&frame, &params), frame);
        }

        release.send(())?;
        Ok(())
    }

    #[test]
    fn cadence_limits_submissions() -> Result<()> {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        struct CountingDetector(Arc<std::sync::atomic::AtomicUsize>);
        impl Detector for CountingDetector {
            async fn detect(&mut self, _frame: &RgbaImage) -> Result<Detection> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }

        let mut scheduler = FrameScheduler::with_detector(
            CountingDetector(Arc::clone(&calls)),
            Duration::from_secs(3600),
        )?;
        let frame = RgbaImage::new(4, 4);
        for _ in 0..10 {
            scheduler.process_frame(&frame, &FilterParameters::default());
            thread::sleep(Duration::from_millis(1));
        }

        let start = Instant::now();
        while calls.load(Ordering::SeqCst) == 0 && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(2));
        }
        thread::sleep(Duration::from_millis(20));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn mask_disabled_covers_whole_frame() {
        let mut scheduler = FrameScheduler::new();
        let frame = RgbaImage::from_pixel(6, 6, Rgba([90, 90, 90, 255]));
        let params = FilterParameters {
            brightness: 0.3,
            face_mask_enabled: false,
            ..Default::default()
        };

        let out = scheduler.process_frame(&frame, &params);
        assert!(out.pixels().all(|p| p[0] > 90));
    }
}

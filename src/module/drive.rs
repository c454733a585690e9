//! Provide Loop for Capture and Detection.
//!
//! Each cycle grabs a frame, shows it in grayscale with the detections of
//! the previous cycle drawn on top, then waits for the detector's answer on
//! the new frame. The answer is drawn on the next cycle, so the overlay
//! always lags the video by one frame.

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use futures::channel::oneshot;

use crate::module::control::{self, CameraInfoField, Control, SaveLatch};
use crate::module::store::{FileStore, PersistenceCache, SavedViewer, Store};
use crate::module::util::conf::TagSize;
use crate::module::util::init::TagscopeProperty;
use crate::module::vision::camera::{Camera, FrameSource};
use crate::module::vision::detector::{Detector, ProcessBackend, WorkerDetector};
use crate::module::vision::overlay::{self, RgbaCanvas, Surface};
use crate::module::vision::{grayscale, Detection};

/// Where the loop is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// The detector has not signalled readiness; nothing is captured.
    AwaitingDetector,
    Capturing,
    /// The last capture failed; the next tick is a retry.
    IdleRetry,
    /// The detector can never become ready; only controls are handled.
    DetectorFailed,
}

/// When the next step should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// On the next display refresh.
    Refresh,
    /// After a fixed delay, instead of the next refresh.
    Retry(Duration),
}

/// State carried from one cycle to the next.
pub struct PipelineContext {
    /// Detections of the previous cycle, drawn on the current frame.
    pub detections: Vec<Detection>,
    pub latch: SaveLatch,
    pub camera: CameraInfoField,
    pub tag_sizes: Vec<TagSize>,
}

/// The capture / convert / detect / draw / persist cycle.
pub struct FrameLoop<S, D, C, T>
where
    S: FrameSource,
    D: Detector,
    C: Surface,
    T: Store,
{
    source: S,
    detector: D,
    live: C,
    viewer: SavedViewer<C>,
    cache: PersistenceCache<T>,
    controls: Receiver<Control>,
    ready: oneshot::Receiver<()>,
    state: LoopState,
    retry_delay: Duration,
    pub ctx: PipelineContext,
}

impl<S, D, C, T> FrameLoop<S, D, C, T>
where
    S: FrameSource,
    D: Detector,
    C: Surface,
    T: Store,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        mut detector: D,
        live: C,
        viewer: SavedViewer<C>,
        cache: PersistenceCache<T>,
        controls: Receiver<Control>,
        ctx: PipelineContext,
        retry_delay: Duration,
    ) -> Self {
        let (tx, ready) = oneshot::channel();
        detector.on_ready(Box::new(move || {
            let _ = tx.send(());
        }));
        Self {
            source,
            detector,
            live,
            viewer,
            cache,
            controls,
            ready,
            state: LoopState::AwaitingDetector,
            retry_delay,
            ctx,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn viewer(&self) -> &SavedViewer<C> {
        &self.viewer
    }

    pub fn live(&self) -> &C {
        &self.live
    }

    /// Waits for the detector's ready signal and configures it.
    ///
    /// Returns false if the detector will never become ready.
    pub async fn wait_ready(&mut self) -> bool {
        if self.state != LoopState::AwaitingDetector {
            return self.state != LoopState::DetectorFailed;
        }
        if (&mut self.ready).await.is_err() {
            self.give_up();
            return false;
        }
        self.start().await;
        true
    }

    /// Runs one tick of the state machine.
    pub async fn step(&mut self) -> Schedule {
        self.apply_controls().await;
        match self.state {
            LoopState::AwaitingDetector => match self.ready.try_recv() {
                Ok(Some(())) => self.start().await,
                Ok(None) => return Schedule::Refresh,
                Err(_) => {
                    self.give_up();
                    return Schedule::Refresh;
                }
            },
            LoopState::DetectorFailed => return Schedule::Refresh,
            LoopState::IdleRetry => self.state = LoopState::Capturing,
            LoopState::Capturing => (),
        }
        self.cycle().await
    }

    fn give_up(&mut self) {
        log::error!("Detector will not become ready; frame loop stays idle");
        self.state = LoopState::DetectorFailed;
    }

    async fn start(&mut self) {
        self.configure_intrinsics().await;
        for tag in self.ctx.tag_sizes.clone() {
            if let Err(e) = self.detector.configure_tag_size(tag.id, tag.size).await {
                log::error!("Failed to set size of tag {}: {}", tag.id, e);
            }
        }
        log::info!("Detector configured, starting capture");
        self.state = LoopState::Capturing;
    }

    async fn configure_intrinsics(&mut self) {
        let info = self.ctx.camera.current().clone();
        if let Err(e) = self
            .detector
            .configure_intrinsics(info.fx, info.fy, info.cx, info.cy)
            .await
        {
            log::error!("Failed to set camera parameters: {}", e);
        }
    }

    async fn apply_controls(&mut self) {
        while let Ok(control) = self.controls.try_recv() {
            match control {
                Control::ToggleSave => self.ctx.latch.toggle(),
                Control::CameraInfo(text) => {
                    if self.ctx.camera.on_change(&text).is_ok()
                        && matches!(self.state, LoopState::Capturing | LoopState::IdleRetry)
                    {
                        self.configure_intrinsics().await;
                    }
                }
            }
        }
    }

    async fn cycle(&mut self) -> Schedule {
        let mut frame = match self.source.grab() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Failed to get video frame. Video not started? ({})", e);
                self.state = LoopState::IdleRetry;
                return Schedule::Retry(self.retry_delay);
            }
        };

        if self.live.dimensions() != (frame.width, frame.height) {
            self.live.resize(frame.width, frame.height);
        }
        self.live.put_image(&frame);

        let gray = grayscale::convert(&mut frame);
        self.live.put_image(&frame);
        overlay::draw_detections(&mut self.live, &self.ctx.detections);
        if let Err(e) = self.live.present() {
            log::warn!("{}", e);
        }

        self.ctx.detections = match self.detector.detect(gray).await {
            Ok(dets) => dets,
            Err(e) => {
                log::error!("Detection failed: {}", e);
                Vec::new()
            }
        };

        if self.ctx.latch.is_armed() && !self.ctx.detections.is_empty() {
            self.save_detection();
        }
        Schedule::Refresh
    }

    fn save_detection(&mut self) {
        let snapshot = self.live.snapshot();
        if let Err(e) = self.cache.save(&snapshot, &self.ctx.detections) {
            log::error!("Failed to save detection: {}", e);
            return;
        }
        self.ctx.latch.toggle();
        if let Err(e) = self.cache.load_into(&mut self.viewer) {
            log::error!("Failed to show saved detection: {}", e);
        }
    }
}

/// Start the frame loop. Runs until the process exits, also when the
/// detector fails to start.
///
pub async fn run(property: TagscopeProperty) {
    let conf = property.conf;
    let paths = property.path;

    // init camera
    let source = Camera::open(&conf);
    // init detector
    let detector_conf = conf.detector.clone();
    let detector = WorkerDetector::spawn(move || ProcessBackend::spawn(&detector_conf));
    // init surfaces and storage
    let live = RgbaCanvas::new(0, 0, Some(paths.output.live.into()));
    let mut viewer = SavedViewer::new(
        RgbaCanvas::new(0, 0, Some(paths.output.saved_image.into())),
        Some(paths.output.saved_data.into()),
    );
    let cache = PersistenceCache::new(FileStore::new(&paths.dir.store), &conf.storage.key);
    if let Err(e) = cache.load_into(&mut viewer) {
        log::warn!("Can't show saved detection: {}", e);
    }
    // controls from the console
    let (tx, rx) = mpsc::channel();
    control::listen(std::io::stdin(), tx);

    let ctx = PipelineContext {
        detections: Vec::new(),
        latch: SaveLatch::new(),
        camera: CameraInfoField::new(conf.camera_info.clone()),
        tag_sizes: conf.detector.tag_sizes.clone(),
    };
    let mut frame_loop = FrameLoop::new(
        source,
        detector,
        live,
        viewer,
        cache,
        rx,
        ctx,
        Duration::from_millis(conf.frame_loop.retry_delay_ms),
    );

    frame_loop.wait_ready().await;

    let mut refresh =
        tokio::time::interval(Duration::from_secs_f64(1.0 / conf.frame_loop.refresh_hz.max(1) as f64));
    refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        match frame_loop.step().await {
            Schedule::Refresh => {
                refresh.tick().await;
            }
            Schedule::Retry(delay) => tokio::time::sleep(delay).await,
        }
    }
}

//! Provide Tag Detection
//!
//! The detector itself is an external program. This module is the proxy to
//! it: a `Detector` capability whose calls resolve asynchronously, served by
//! a worker thread that owns a synchronous `Backend`.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use super::{Detection, GrayscaleBuffer};
use crate::module::util::conf;

/// Errors crossing the detector boundary.
#[derive(thiserror::Error, Debug)]
pub enum DetectorError {
    #[error("detector worker is gone")]
    Disconnected,
    #[error("detector failed: {0}")]
    Failed(String),
    #[error("detector io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed detector message: {0}")]
    Protocol(#[from] serde_json::Error),
}

/// Invoked once when the detector can accept requests.
pub type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

/// Asynchronous handle to a tag detector.
///
/// Calls are not serialized here; callers keep at most one in flight.
pub trait Detector {
    /// Registers the ready callback. Fires immediately if already ready.
    fn on_ready(&mut self, callback: ReadyCallback);
    fn configure_intrinsics(
        &mut self,
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
    ) -> BoxFuture<'_, Result<(), DetectorError>>;
    fn configure_tag_size(
        &mut self,
        tag_id: i32,
        size_meters: f64,
    ) -> BoxFuture<'_, Result<(), DetectorError>>;
    fn detect(
        &mut self,
        image: GrayscaleBuffer,
    ) -> BoxFuture<'_, Result<Vec<Detection>, DetectorError>>;
}

/// Synchronous detector implementation living on the worker thread.
pub trait Backend {
    fn set_intrinsics(&mut self, fx: f64, fy: f64, cx: f64, cy: f64)
        -> Result<(), DetectorError>;
    fn set_tag_size(&mut self, tag_id: i32, size_meters: f64) -> Result<(), DetectorError>;
    fn detect(&mut self, image: &GrayscaleBuffer) -> Result<Vec<Detection>, DetectorError>;
}

type Reply<T> = oneshot::Sender<Result<T, DetectorError>>;

enum Request {
    Intrinsics {
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        reply: Reply<()>,
    },
    TagSize {
        tag_id: i32,
        size: f64,
        reply: Reply<()>,
    },
    Detect {
        image: GrayscaleBuffer,
        reply: Reply<Vec<Detection>>,
    },
}

enum Readiness {
    Pending(Option<ReadyCallback>),
    Ready,
    Failed,
}

/// Detector proxy backed by a dedicated worker thread.
pub struct WorkerDetector {
    tx: mpsc::Sender<Request>,
    readiness: Arc<Mutex<Readiness>>,
    _worker: JoinHandle<()>,
}

impl WorkerDetector {
    /// Starts the worker. `factory` runs on the worker thread; its success
    /// makes the detector ready, its failure leaves it permanently unready
    /// and drops any registered callback.
    pub fn spawn<B, F>(factory: F) -> Self
    where
        B: Backend,
        F: FnOnce() -> Result<B, DetectorError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Request>();
        let readiness = Arc::new(Mutex::new(Readiness::Pending(None)));
        let state = Arc::clone(&readiness);
        let worker = thread::spawn(move || {
            log::debug!("Detector Thread Started");
            let mut backend = match factory() {
                Ok(backend) => backend,
                Err(e) => {
                    log::error!("Detector failed to start: {}", e);
                    drop(transition(&state, Readiness::Failed));
                    return;
                }
            };
            log::info!("Detector ready");
            if let Some(callback) = transition(&state, Readiness::Ready) {
                callback();
            }
            for req in rx {
                serve(&mut backend, req);
            }
            log::debug!("Detector Thread Exit Loop");
        });
        Self {
            tx,
            readiness,
            _worker: worker,
        }
    }

    fn call<T: Send + 'static>(
        &self,
        request: impl FnOnce(Reply<T>) -> Request,
    ) -> BoxFuture<'static, Result<T, DetectorError>> {
        let (reply, rx) = oneshot::channel();
        let sent = self
            .tx
            .send(request(reply))
            .map_err(|_| DetectorError::Disconnected);
        async move {
            sent?;
            rx.await.map_err(|_| DetectorError::Disconnected)?
        }
        .boxed()
    }
}

impl Detector for WorkerDetector {
    fn on_ready(&mut self, callback: ReadyCallback) {
        let fire_now = {
            let mut state = lock(&self.readiness);
            match &mut *state {
                Readiness::Pending(slot) => {
                    *slot = Some(callback);
                    None
                }
                Readiness::Ready => Some(callback),
                Readiness::Failed => {
                    drop(callback);
                    None
                }
            }
        };
        if let Some(callback) = fire_now {
            callback();
        }
    }

    fn configure_intrinsics(
        &mut self,
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
    ) -> BoxFuture<'_, Result<(), DetectorError>> {
        self.call(|reply| Request::Intrinsics {
            fx,
            fy,
            cx,
            cy,
            reply,
        })
    }

    fn configure_tag_size(
        &mut self,
        tag_id: i32,
        size_meters: f64,
    ) -> BoxFuture<'_, Result<(), DetectorError>> {
        self.call(|reply| Request::TagSize {
            tag_id,
            size: size_meters,
            reply,
        })
    }

    fn detect(
        &mut self,
        image: GrayscaleBuffer,
    ) -> BoxFuture<'_, Result<Vec<Detection>, DetectorError>> {
        self.call(|reply| Request::Detect { image, reply })
    }
}

fn lock(state: &Mutex<Readiness>) -> MutexGuard<'_, Readiness> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// Moves to `next`, handing back a callback that was still waiting.
fn transition(state: &Mutex<Readiness>, next: Readiness) -> Option<ReadyCallback> {
    match std::mem::replace(&mut *lock(state), next) {
        Readiness::Pending(callback) => callback,
        _ => None,
    }
}

fn serve<B: Backend>(backend: &mut B, req: Request) {
    // A dropped receiver only means the caller stopped waiting.
    match req {
        Request::Intrinsics {
            fx,
            fy,
            cx,
            cy,
            reply,
        } => {
            let _ = reply.send(backend.set_intrinsics(fx, fy, cx, cy));
        }
        Request::TagSize {
            tag_id,
            size,
            reply,
        } => {
            let _ = reply.send(backend.set_tag_size(tag_id, size));
        }
        Request::Detect { image, reply } => {
            let _ = reply.send(backend.detect(&image));
        }
    }
}

/// Options forwarded to the external detector when it starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorOptions {
    pub decimate: f32,
    pub sigma: f32,
    pub nthreads: u32,
    pub refine_edges: bool,
    pub max_detections: u32,
    pub return_pose: bool,
    pub return_solutions: bool,
}

impl From<&conf::Detector> for DetectorOptions {
    fn from(conf: &conf::Detector) -> Self {
        Self {
            decimate: conf.decimate,
            sigma: conf.sigma,
            nthreads: conf.nthreads,
            refine_edges: conf.refine_edges,
            max_detections: conf.max_detections,
            return_pose: conf.return_pose,
            return_solutions: conf.return_solutions,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WireRequest {
    Init(DetectorOptions),
    Intrinsics { fx: f64, fy: f64, cx: f64, cy: f64 },
    TagSize { id: i32, size: f64 },
    Detect { width: u32, height: u32, pixels: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireReply {
    Detections(Vec<Detection>),
    Status { result: String },
}

/// External detector process speaking newline-delimited JSON over stdio.
///
/// One reply line per request line: `{"result":"ok"}`, `{"result":"<error>"}`
/// or, for `detect`, an array of detections.
pub struct ProcessBackend {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessBackend {
    /// Spawns the configured detector command and sends it the detector options.
    pub fn spawn(conf: &conf::Detector) -> Result<Self, DetectorError> {
        let mut child = Command::new(&conf.command)
            .args(&conf.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DetectorError::Failed("detector stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DetectorError::Failed("detector stdout unavailable".to_string()))?;
        let mut backend = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };
        let reply = backend.exchange(&WireRequest::Init(DetectorOptions::from(conf)))?;
        expect_ok(reply)?;
        Ok(backend)
    }

    fn exchange(&mut self, req: &WireRequest) -> Result<WireReply, DetectorError> {
        let line = serde_json::to_string(req)?;
        writeln!(self.stdin, "{}", line)?;
        self.stdin.flush()?;

        let mut buf = String::new();
        if self.stdout.read_line(&mut buf)? == 0 {
            return Err(DetectorError::Failed(
                "detector closed its output".to_string(),
            ));
        }
        Ok(serde_json::from_str(buf.trim())?)
    }
}

fn expect_ok(reply: WireReply) -> Result<(), DetectorError> {
    match reply {
        WireReply::Status { result } if result == "ok" => Ok(()),
        WireReply::Status { result } => Err(DetectorError::Failed(result)),
        WireReply::Detections(_) => Err(DetectorError::Failed(
            "unexpected detections reply".to_string(),
        )),
    }
}

impl Backend for ProcessBackend {
    fn set_intrinsics(
        &mut self,
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
    ) -> Result<(), DetectorError> {
        let reply = self.exchange(&WireRequest::Intrinsics { fx, fy, cx, cy })?;
        expect_ok(reply)
    }

    fn set_tag_size(&mut self, tag_id: i32, size_meters: f64) -> Result<(), DetectorError> {
        let reply = self.exchange(&WireRequest::TagSize {
            id: tag_id,
            size: size_meters,
        })?;
        expect_ok(reply)
    }

    fn detect(&mut self, image: &GrayscaleBuffer) -> Result<Vec<Detection>, DetectorError> {
        let reply = self.exchange(&WireRequest::Detect {
            width: image.width,
            height: image.height,
            pixels: BASE64_STANDARD.encode(&image.data),
        })?;
        match reply {
            WireReply::Detections(dets) => Ok(dets),
            WireReply::Status { result } => Err(DetectorError::Failed(result)),
        }
    }
}

impl Drop for ProcessBackend {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::vision::Point;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-process backend returning a fixed detection set.
    struct FixedBackend {
        dets: Vec<Detection>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Backend for FixedBackend {
        fn set_intrinsics(&mut self, fx: f64, _: f64, _: f64, _: f64) -> Result<(), DetectorError> {
            self.calls.lock().unwrap().push(format!("intrinsics {fx}"));
            Ok(())
        }
        fn set_tag_size(&mut self, tag_id: i32, size: f64) -> Result<(), DetectorError> {
            self.calls.lock().unwrap().push(format!("tag_size {tag_id} {size}"));
            Ok(())
        }
        fn detect(&mut self, image: &GrayscaleBuffer) -> Result<Vec<Detection>, DetectorError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("detect {}x{}", image.width, image.height));
            Ok(self.dets.clone())
        }
    }

    fn square(id: i32) -> Detection {
        Detection::new(
            id,
            [
                Point { x: 0.0, y: 0.0 },
                Point { x: 4.0, y: 0.0 },
                Point { x: 4.0, y: 4.0 },
                Point { x: 0.0, y: 4.0 },
            ],
            Point { x: 2.0, y: 2.0 },
        )
    }

    fn gray(width: u32, height: u32) -> GrayscaleBuffer {
        GrayscaleBuffer {
            width,
            height,
            data: vec![128; (width * height) as usize],
        }
    }

    fn ready_signal(detector: &mut WorkerDetector) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        detector.on_ready(Box::new(move || {
            let _ = tx.send(());
        }));
        rx
    }

    #[test]
    fn worker_serves_requests_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let backend_calls = Arc::clone(&calls);
        let mut detector = WorkerDetector::spawn(move || {
            Ok(FixedBackend {
                dets: vec![square(3)],
                calls: backend_calls,
            })
        });
        block_on(ready_signal(&mut detector)).unwrap();

        block_on(detector.configure_intrinsics(900.0, 900.0, 320.0, 240.0)).unwrap();
        block_on(detector.configure_tag_size(5, 0.5)).unwrap();
        let dets = block_on(detector.detect(gray(8, 6))).unwrap();

        assert_eq!(dets, vec![square(3)]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["intrinsics 900", "tag_size 5 0.5", "detect 8x6"]
        );
    }

    #[test]
    fn ready_fires_exactly_once_even_when_registered_late() {
        let mut detector = WorkerDetector::spawn(|| {
            Ok(FixedBackend {
                dets: vec![],
                calls: Arc::new(Mutex::new(Vec::new())),
            })
        });
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let (tx, rx) = oneshot::channel();
        detector.on_ready(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        }));
        block_on(rx).unwrap();
        // A round trip guarantees the worker finished its startup.
        assert!(block_on(detector.detect(gray(1, 1))).unwrap().is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Registered after readiness: fires immediately.
        let late = Arc::new(AtomicUsize::new(0));
        let late_counter = Arc::clone(&late);
        detector.on_ready(Box::new(move || {
            late_counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(late.load(Ordering::SeqCst), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_start_never_becomes_ready() {
        let mut detector = WorkerDetector::spawn(|| -> Result<FixedBackend, DetectorError> {
            Err(DetectorError::Failed("no detector".to_string()))
        });
        let rx = ready_signal(&mut detector);
        // The callback is dropped, so the signal is cancelled instead of fired.
        assert!(block_on(rx).is_err());
        assert!(matches!(
            block_on(detector.detect(gray(1, 1))),
            Err(DetectorError::Disconnected)
        ));
    }

    fn script_conf(script: &str) -> conf::Detector {
        conf::Detector {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            decimate: 2.0,
            sigma: 0.0,
            nthreads: 1,
            refine_edges: true,
            max_detections: 0,
            return_pose: true,
            return_solutions: false,
            tag_sizes: vec![],
        }
    }

    const FAKE_DETECTOR: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"op":"detect"'*) echo '[{"id":3, "size":0.15, "corners": [{"x":0,"y":0},{"x":4,"y":0},{"x":4,"y":4},{"x":0,"y":4}], "center": {"x":2,"y":2}}]' ;;
    *'"op":"tag_size"'*) echo '{ "result": "unknown tag" }' ;;
    *) echo '{"result":"ok"}' ;;
  esac
done
"#;

    #[test]
    fn process_backend_speaks_json_lines() {
        let mut backend = ProcessBackend::spawn(&script_conf(FAKE_DETECTOR)).unwrap();
        backend.set_intrinsics(1.0, 1.0, 0.5, 0.5).unwrap();
        match backend.set_tag_size(5, 0.5) {
            Err(DetectorError::Failed(msg)) => assert_eq!(msg, "unknown tag"),
            other => panic!("unexpected reply: {:?}", other),
        }
        let dets = backend.detect(&gray(4, 4)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].id, 3);
        assert_eq!(dets[0].size, Some(0.15));
    }

    #[test]
    fn process_backend_behind_worker() {
        let conf = script_conf(FAKE_DETECTOR);
        let mut detector = WorkerDetector::spawn(move || ProcessBackend::spawn(&conf));
        block_on(ready_signal(&mut detector)).unwrap();
        let dets = block_on(detector.detect(gray(2, 2))).unwrap();
        assert_eq!(dets[0].center, Point { x: 2.0, y: 2.0 });
    }

    #[test]
    fn process_backend_rejected_init() {
        let res = ProcessBackend::spawn(&script_conf(
            r#"read -r line; echo '{"result":"Detector not initialized"}'"#,
        ));
        assert!(matches!(res, Err(DetectorError::Failed(_))));
    }

    #[test]
    fn wire_requests_are_tagged_by_op() {
        let req = WireRequest::TagSize { id: 5, size: 0.5 };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"op":"tag_size","id":5,"size":0.5}"#
        );
        let opts = DetectorOptions::from(&script_conf(""));
        let init = serde_json::to_value(WireRequest::Init(opts)).unwrap();
        assert_eq!(init["op"], "init");
        assert_eq!(init["return_pose"], true);
    }
}

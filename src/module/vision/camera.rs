//! Camera Functions
//!

use image::ImageFormat;

use super::Frame;
use crate::module::util::conf::Config;

/// Errors raised while acquiring frames.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    /// The stream exists but has not delivered a usable frame yet.
    #[error("stream not ready: {0}")]
    NotReady(String),
    /// The device could not be opened or configured.
    #[error("camera unavailable: {0}")]
    Device(String),
}

/// Produces raw color frames on demand.
pub trait FrameSource {
    fn grab(&mut self) -> Result<Frame, CaptureError>;
}

/// Represents a V4L2 camera configuration and capture functionality.
///
pub struct V4l2Camera {
    cap: rscam::Camera,
}

impl V4l2Camera {
    /// Opens and starts the camera with MJPG frames at the requested resolution.
    ///
    /// # Arguments
    ///
    /// * `device` - Device node, e.g. `/dev/video0`.
    /// * `resolution` - Requested width and height.
    /// * `fps` - Requested frame rate.
    ///
    pub fn new(device: &str, resolution: (u32, u32), fps: u32) -> Result<Self, CaptureError> {
        let mut cap = rscam::Camera::new(device)
            .map_err(|e| CaptureError::Device(format!("{device}: {e}")))?;

        cap.start(&rscam::Config {
            interval: (1, fps.max(1)),
            resolution,
            format: b"MJPG",
            nbuffers: 1,
            ..Default::default()
        })
        .map_err(|e| CaptureError::Device(format!("{device}: {e}")))?;

        Ok(Self { cap })
    }
}

impl FrameSource for V4l2Camera {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        let raw = self
            .cap
            .capture()
            .map_err(|e| CaptureError::NotReady(e.to_string()))?;
        let img = image::load_from_memory_with_format(&raw[..], ImageFormat::Jpeg)
            .map_err(|e| CaptureError::NotReady(e.to_string()))?;
        Ok(Frame::from_image(img.to_rgba8()))
    }
}

/// Replays a single image file as a stream.
pub struct StillImage {
    frame: Frame,
}

impl StillImage {
    pub fn open(path: &str) -> Result<Self, CaptureError> {
        let img = image::open(path).map_err(|e| CaptureError::Device(format!("{path}: {e}")))?;
        Ok(Self {
            frame: Frame::from_image(img.to_rgba8()),
        })
    }
}

impl FrameSource for StillImage {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        Ok(self.frame.clone())
    }
}

/// Frame source chosen from the configuration.
///
/// `Unavailable` is what remains when acquisition failed: every grab reports
/// the stream as not ready.
pub enum Camera {
    V4l2(V4l2Camera),
    Still(StillImage),
    Unavailable,
}

impl Camera {
    /// Acquires the configured source. Failures are logged, not retried.
    pub fn open(conf: &Config) -> Self {
        let [width, height] = conf.camera_info.img_size;
        let res = match conf.camera.source.as_str() {
            "v4l2" => V4l2Camera::new(&conf.camera.device, (width, height), conf.camera.fps)
                .map(Camera::V4l2),
            "still" => StillImage::open(&conf.camera.device).map(Camera::Still),
            other => Err(CaptureError::Device(format!("unknown source '{other}'"))),
        };
        match res {
            Ok(cam) => {
                log::info!("Camera opened: {} {}", conf.camera.source, conf.camera.device);
                cam
            }
            Err(e) => {
                log::error!("Camera acquisition failed: {}", e);
                Camera::Unavailable
            }
        }
    }
}

impl FrameSource for Camera {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        match self {
            Camera::V4l2(cam) => cam.grab(),
            Camera::Still(still) => still.grab(),
            Camera::Unavailable => Err(CaptureError::NotReady("no camera stream".to_string())),
        }
    }
}

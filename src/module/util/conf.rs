//! Config Handler.

use serde::{Deserialize, Serialize};

use crate::module::control::CameraInfo;

/// Errors raised while loading or saving the configuration file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] ::toml::de::Error),
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] ::toml::ser::Error),
}

/// Provides TOML config file handling.
pub mod toml {

    use super::{ConfigError, DEFAULT_CONFIG};
    use crate::module::define;
    use std::fs::File;
    use std::io::prelude::*;
    use std::path::Path;

    /// Loads a configuration file from the given directory.
    /// If not found, generates a default config file.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory where the configuration file is located or should be created.
    ///
    pub fn load(dir: &str) -> Result<super::Config, ConfigError> {
        let path = Path::new(dir).join(define::path::CONF_FILE);

        if !path.is_file() {
            // Create the default config if it doesn't exist
            let config: super::Config = toml::from_str(DEFAULT_CONFIG)?;
            let toml_str = toml::to_string(&config)?;
            let mut file = File::create(&path)?;
            file.write_all(toml_str.as_bytes())?;
        }

        let conf_str: String = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&conf_str)?)
    }

    /// Saves a configuration file to the given directory.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory where the configuration file should be saved.
    /// * `conf` - The configuration data to be saved.
    ///
    pub fn save(dir: &str, conf: &super::Config) -> Result<(), ConfigError> {
        let toml_str = toml::to_string(conf)?;
        let path = crate::module::util::path::join(&[dir, define::path::CONF_FILE]);
        let mut file = File::create(path)?;
        file.write_all(toml_str.as_bytes())?;
        Ok(())
    }
}

/// Represents the configuration data structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub system: System,
    pub camera: Camera,
    pub camera_info: CameraInfo,
    pub detector: Detector,
    pub frame_loop: FrameLoop,
    pub storage: Storage,
}

/// Represents system-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct System {
    pub log_level: String,
}

/// Represents camera-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Camera {
    pub source: String,
    pub device: String,
    pub fps: u32,
}

/// Represents detector-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Detector {
    pub command: String,
    pub args: Vec<String>,
    pub decimate: f32,
    pub sigma: f32,
    pub nthreads: u32,
    pub refine_edges: bool,
    pub max_detections: u32,
    pub return_pose: bool,
    pub return_solutions: bool,
    pub tag_sizes: Vec<TagSize>,
}

/// Physical size of one tag id, in meters.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct TagSize {
    pub id: i32,
    pub size: f64,
}

/// Represents frame loop timing parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrameLoop {
    pub refresh_hz: u32,
    pub retry_delay_ms: u64,
}

/// Represents durable storage parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Storage {
    pub key: String,
}

// Default configuration data in TOML format
const DEFAULT_CONFIG: &str = r#"
[system]
  log_level = 'INFO' # Log level (e.g., 'INFO', 'DEBUG')

[camera]
  source = 'v4l2' # Frame source ('v4l2' for a camera, 'still' for an image file)
  device = '/dev/video0' # Camera device or image file path
  fps = 30 # Requested capture rate

[camera_info]
  fx = 997.2827 # x focal length in pixels
  fy = 997.2827 # y focal length in pixels
  cx = 636.9118 # x principal point in pixels
  cy = 360.5100 # y principal point in pixels
  img_size = [1280, 720] # Requested capture resolution

[detector]
  command = 'apriltag-worker' # External detector executable
  args = [] # Extra arguments for the detector
  decimate = 2.0 # Decimate input image by this factor
  sigma = 0.0 # Low-pass blur applied to input; negative sharpens
  nthreads = 1 # Detector threads
  refine_edges = true # Spend more time aligning tag edges
  max_detections = 0 # Maximum detections returned (0 = no max)
  return_pose = true # Return pose of detected tags
  return_solutions = false # Return both pose solutions when available

  [[detector.tag_sizes]]
  id = 5
  size = 0.5

[frame_loop]
  refresh_hz = 60 # Display refresh rate
  retry_delay_ms = 500 # Delay before retrying a capture that was not ready

[storage]
  key = 'detectData' # Durable slot for the saved detection
"#;

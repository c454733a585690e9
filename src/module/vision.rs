//! Processing related to visual information.
//!
//! Holds the pixel containers passed between capture, conversion, detection
//! and drawing, and the detection record returned by the external detector.
use image::RgbaImage;
use serde::{Deserialize, Serialize};

pub mod camera;
pub mod detector;
pub mod grayscale;
pub mod overlay;

/// A captured color frame, RGBA8 row-major.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    /// Wraps an RGBA buffer. Returns `None` if its length is not `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_image(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Single-channel luminance image handed to the detector.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayscaleBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A point in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Tag pose relative to the camera.
///
/// `R` is column-major, as the detector emits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    #[serde(rename = "R")]
    pub r: [[f64; 3]; 3],
    pub t: [f64; 3],
    pub e: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asol: Option<AltSolution>,
}

/// The other local minimum of the pose estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltSolution {
    #[serde(rename = "R")]
    pub r: [[f64; 3]; 3],
    pub t: [f64; 3],
    pub e: f64,
    pub uniquesol: bool,
}

/// Detection result
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    pub corners: [Point; 4],
    pub center: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
}

impl Detection {
    /// Detection without size or pose.
    pub fn new(id: i32, corners: [Point; 4], center: Point) -> Self {
        Self {
            id,
            size: None,
            corners,
            center,
            pose: None,
        }
    }
}

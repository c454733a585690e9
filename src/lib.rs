//! Tagscope: live AprilTag detection viewer.
//!
//! Frames from a camera are shown in grayscale with the detections of an
//! external tag detector drawn on top; one frame and its detection can be
//! saved to a durable slot and viewed later.

pub mod module;

//! This module contains all the sub-modules of the project.

pub mod control; // Control module: Camera parameter field, save latch and control input.
pub mod define; // Definition module: Contains definitions and constants used throughout the project.
pub mod drive; // Drive module: Runs the capture and detection loop.
pub mod store; // Store module: Single-slot cache of the last saved detection.
pub mod util; // Utility module: Provides various utility functions and helpers.
pub mod vision; // Vision module: Frames, grayscale conversion, detector proxy and overlay.

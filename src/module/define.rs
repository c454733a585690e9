//! Module for Constants and Paths Definitions
//!
//! This module defines various constants and paths used throughout the application.

/// System Constants
pub mod system {
    /// Name of the system
    pub const NAME: &str = "tagscope";
}

/// File Paths
pub mod path {

    // Persistent Data Directory
    pub const PERSISTENT_DIR: &str = "/data/";

    // Ephemeral Data Directory
    pub const EPHEMERAL_DIR: &str = "/run/user/1000/";

    // Durable Store Directory
    pub const STORE_DIR: &str = "store";

    // Log Directory
    pub const LOG_DIR: &str = "log";

    // Configuration File
    pub const CONF_FILE: &str = "conf.toml";

    // Live display surface
    pub const LIVE_IMAGE: &str = "live.png";

    // Saved detection viewer surface
    pub const SAVED_IMAGE: &str = "saved_det.png";

    // Saved detection viewer text
    pub const SAVED_DATA: &str = "saved_det.json";
}

/// Overlay drawing style
pub mod overlay {
    use image::Rgba;

    pub const STROKE_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);
    pub const STROKE_WIDTH: u32 = 5;
    pub const TEXT_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);
    pub const TEXT_SIZE: u32 = 20;
    // Id label sits this many pixels below the tag center.
    pub const TEXT_OFFSET_Y: f64 = 5.0;
}

/// Save control
pub mod control {
    pub const SAVE_IDLE_LABEL: &str = "Save next detection (local storage)";
    pub const SAVE_ARMED_LABEL: &str = "Saving next detection... (press to cancel)";
    pub const SAVE_BUTTON_CLASS: &str = "btn";
    pub const ACTIVE_CLASS: &str = "active";

    // Control line that toggles the save latch
    pub const SAVE_COMMAND: &str = "save";
}

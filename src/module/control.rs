//! User Controls
//!
//! The camera-parameter text field, the save-latch button, and the input
//! thread that turns console lines into control messages.

use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

use crate::module::define;

/// Camera intrinsics for pose estimation, and the requested capture size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub img_size: [u32; 2],
}

#[derive(thiserror::Error, Debug)]
pub enum ControlError {
    #[error("invalid camera parameters: {0}")]
    CameraInfo(#[from] serde_json::Error),
}

/// Editable camera-parameter text with last-known-good fallback.
#[derive(Debug, Clone)]
pub struct CameraInfoField {
    text: String,
    current: CameraInfo,
}

impl CameraInfoField {
    pub fn new(initial: CameraInfo) -> Self {
        Self {
            text: pretty(&initial),
            current: initial,
        }
    }

    /// Text currently shown in the field.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn current(&self) -> &CameraInfo {
        &self.current
    }

    /// Handles an edit. Invalid text is rejected and the field reverts to
    /// the last valid parameters.
    pub fn on_change(&mut self, text: &str) -> Result<&CameraInfo, ControlError> {
        match serde_json::from_str::<CameraInfo>(text) {
            Ok(info) => {
                self.text = text.to_string();
                self.current = info;
                Ok(&self.current)
            }
            Err(e) => {
                log::warn!("Error parsing camera parameters! {}", e);
                self.text = pretty(&self.current);
                Err(e.into())
            }
        }
    }
}

fn pretty(info: &CameraInfo) -> String {
    // Plain numbers and an array always serialize.
    serde_json::to_string_pretty(info).unwrap_or_default()
}

/// One-shot "save next detection" latch, shown as a toggle button.
#[derive(Debug, Clone)]
pub struct SaveLatch {
    armed: bool,
    label: &'static str,
    class_name: String,
}

impl Default for SaveLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveLatch {
    pub fn new() -> Self {
        Self {
            armed: false,
            label: define::control::SAVE_IDLE_LABEL,
            class_name: define::control::SAVE_BUTTON_CLASS.to_string(),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn label(&self) -> &str {
        self.label
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Arms an idle latch, disarms an armed one.
    pub fn toggle(&mut self) {
        if self.armed {
            self.armed = false;
            self.label = define::control::SAVE_IDLE_LABEL;
            self.class_name = self
                .class_name
                .split_whitespace()
                .filter(|token| *token != define::control::ACTIVE_CLASS)
                .collect::<Vec<_>>()
                .join(" ");
        } else {
            self.armed = true;
            self.label = define::control::SAVE_ARMED_LABEL;
            self.class_name.push(' ');
            self.class_name.push_str(define::control::ACTIVE_CLASS);
        }
        log::info!("{}", self.label);
    }
}

/// Control events delivered to the frame loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    ToggleSave,
    CameraInfo(String),
}

impl Control {
    /// Interprets one input line. Blank and unknown lines yield nothing.
    pub fn parse(line: &str) -> Option<Control> {
        let line = line.trim();
        if line == define::control::SAVE_COMMAND {
            Some(Control::ToggleSave)
        } else if line.starts_with('{') {
            Some(Control::CameraInfo(line.to_string()))
        } else {
            None
        }
    }
}

/// Reads control lines from `input` on a thread and sends them to the frame loop.
pub fn listen<R: Read + Send + 'static>(input: R, tx: Sender<Control>) -> JoinHandle<()> {
    thread::spawn(move || {
        log::debug!("Control Thread Started");
        for line in BufReader::new(input).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Control input error: {}", e);
                    break;
                }
            };
            match Control::parse(&line) {
                Some(control) => {
                    if tx.send(control).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => (),
                None => log::warn!("Unknown control: {}", line),
            }
        }
        log::debug!("Control Thread Exit Loop");
    })
}

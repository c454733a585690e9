//! Drawing surfaces and the detection overlay.

use std::path::PathBuf;

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut, text_size};

use super::{Detection, Frame, Point};
use crate::module::define;

#[derive(thiserror::Error, Debug)]
pub enum SurfaceError {
    #[error("failed to write surface: {0}")]
    Image(#[from] image::ImageError),
}

/// A 2D drawing target with canvas-like semantics.
pub trait Surface {
    fn dimensions(&self) -> (u32, u32);
    /// Changes the size. Content is cleared, as with a canvas.
    fn resize(&mut self, width: u32, height: u32);
    /// Writes pixels at the origin; whatever falls outside is clipped.
    fn put_image(&mut self, frame: &Frame);
    fn snapshot(&self) -> Frame;
    /// Strokes the path through `points` in order.
    fn stroke_polygon(&mut self, points: &[Point], color: Rgba<u8>, width: u32);
    /// Draws `text` horizontally centered on `at.x` with its baseline on `at.y`.
    fn fill_text(&mut self, text: &str, at: Point, color: Rgba<u8>, size: u32);
    /// Makes the current content visible.
    fn present(&mut self) -> Result<(), SurfaceError>;
}

/// Draws the id and outline of every detection.
///
/// Drawing is additive; call it once per displayed frame.
pub fn draw_detections<S: Surface>(surface: &mut S, detections: &[Detection]) {
    for det in detections {
        let mut outline = det.corners.to_vec();
        outline.push(det.corners[0]);
        surface.stroke_polygon(
            &outline,
            define::overlay::STROKE_COLOR,
            define::overlay::STROKE_WIDTH,
        );
        surface.fill_text(
            &det.id.to_string(),
            Point {
                x: det.center.x,
                y: det.center.y + define::overlay::TEXT_OFFSET_Y,
            },
            define::overlay::TEXT_COLOR,
            define::overlay::TEXT_SIZE,
        );
    }
}

/// Label face, bundled so drawing never depends on installed fonts.
const LABEL_FONT: &[u8] = include_bytes!("../../../assets/DejaVuSans-Bold.ttf");

/// In-memory RGBA surface, written out as PNG on `present` when it has an output path.
pub struct RgbaCanvas {
    image: RgbaImage,
    output: Option<PathBuf>,
    font: Option<FontRef<'static>>,
}

impl RgbaCanvas {
    pub fn new(width: u32, height: u32, output: Option<PathBuf>) -> Self {
        let font = match FontRef::try_from_slice(LABEL_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                log::error!("Failed to load label font: {}", e);
                None
            }
        };
        Self {
            image: RgbaImage::new(width, height),
            output,
            font,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

impl Surface for RgbaCanvas {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    fn put_image(&mut self, frame: &Frame) {
        if self.image.dimensions() == (frame.width, frame.height) {
            self.image.copy_from_slice(&frame.data);
            return;
        }
        if let Some(top) = RgbaImage::from_raw(frame.width, frame.height, frame.data.clone()) {
            imageops::replace(&mut self.image, &top, 0, 0);
        }
    }

    fn snapshot(&self) -> Frame {
        let (width, height) = self.image.dimensions();
        Frame {
            width,
            height,
            data: self.image.as_raw().clone(),
        }
    }

    fn stroke_polygon(&mut self, points: &[Point], color: Rgba<u8>, width: u32) {
        let half = (width / 2) as f64;
        let (w, h) = self.image.dimensions();
        let bounds = (-1.0, -1.0, w as f64, h as f64);
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            // Thick stroke as a bundle of offset one-pixel segments.
            let mut dy = -half;
            while dy <= half {
                let mut dx = -half;
                while dx <= half {
                    let from = (a.x + dx, a.y + dy);
                    let to = (b.x + dx, b.y + dy);
                    if let Some((from, to)) = clip_segment(from, to, bounds) {
                        draw_line_segment_mut(
                            &mut self.image,
                            (from.0 as f32, from.1 as f32),
                            (to.0 as f32, to.1 as f32),
                            color,
                        );
                    }
                    dx += 1.0;
                }
                dy += 1.0;
            }
        }
    }

    fn fill_text(&mut self, text: &str, at: Point, color: Rgba<u8>, size: u32) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(size as f32);
        let (text_width, _) = text_size(scale, font, text);
        // draw_text_mut takes the top of the line box; the baseline is one ascent below.
        let ascent = font.as_scaled(scale).ascent();
        let x = (at.x - text_width as f64 / 2.0).round() as i32;
        let y = (at.y - ascent as f64).round() as i32;
        draw_text_mut(&mut self.image, color, x, y, scale, font, text);
    }

    fn present(&mut self) -> Result<(), SurfaceError> {
        if let Some(path) = &self.output {
            self.image.save(path)?;
        }
        Ok(())
    }
}

/// Cuts the segment `a`-`b` to the rectangle `(min_x, min_y, max_x, max_y)`
/// (Liang-Barsky). Returns `None` when nothing of it lies inside.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [
        (-dx, a.0 - min_x),
        (dx, max_x - a.0),
        (-dy, a.1 - min_y),
        (dy, max_y - a.1),
    ] {
        if p == 0.0 {
            // Parallel to this edge
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

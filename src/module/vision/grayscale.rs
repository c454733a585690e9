//! Grayscale conversion of captured frames.

use super::{Frame, GrayscaleBuffer};

/// Converts `frame` to luminance.
///
/// Returns one byte per pixel, `round((R + G + B) / 3)`, and rewrites the
/// frame's color channels to that value so the displayed image is
/// monochrome. Alpha is left as is.
pub fn convert(frame: &mut Frame) -> GrayscaleBuffer {
    let mut gray = Vec::with_capacity(frame.pixel_count());
    for px in frame.data.chunks_exact_mut(4) {
        let value = luminance(px[0], px[1], px[2]);
        gray.push(value);
        px[0] = value;
        px[1] = value;
        px[2] = value;
    }
    GrayscaleBuffer {
        width: frame.width,
        height: frame.height,
        data: gray,
    }
}

// Sum / 3 never ends in .5, so adding 1 before the division rounds to nearest.
fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((r as u16 + g as u16 + b as u16 + 1) / 3) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Frame {
        let mut data = Vec::new();
        for i in 0..64u32 {
            let v = (i * 37 % 256) as u8;
            data.extend_from_slice(&[v, v.wrapping_mul(3), v.wrapping_add(101), (i * 4) as u8]);
        }
        // Extreme pixels
        data.extend_from_slice(&[255, 255, 255, 255, 0, 0, 0, 0]);
        Frame::from_raw(11, 6, data).unwrap()
    }

    #[test]
    fn luminance_rounds_to_nearest() {
        assert_eq!(luminance(0, 0, 1), 0); // 0.33
        assert_eq!(luminance(0, 1, 1), 1); // 0.67
        assert_eq!(luminance(10, 10, 10), 10);
        assert_eq!(luminance(255, 255, 254), 255); // 254.67
        assert_eq!(luminance(255, 255, 255), 255);
    }

    #[test]
    fn output_matches_rounded_mean() {
        let mut frame = sample_frame();
        let original = frame.clone();
        let gray = convert(&mut frame);

        assert_eq!(gray.data.len(), (original.width * original.height) as usize);
        assert_eq!((gray.width, gray.height), (11, 6));
        for (px, g) in original.data.chunks_exact(4).zip(gray.data.iter()) {
            let mean = (px[0] as f64 + px[1] as f64 + px[2] as f64) / 3.0;
            assert_eq!(*g, mean.round() as u8);
        }
    }

    #[test]
    fn frame_becomes_monochrome_with_alpha_kept() {
        let mut frame = sample_frame();
        let original = frame.clone();
        let gray = convert(&mut frame);

        for ((px, orig), g) in frame
            .data
            .chunks_exact(4)
            .zip(original.data.chunks_exact(4))
            .zip(gray.data.iter())
        {
            assert_eq!(px[0], *g);
            assert_eq!(px[1], *g);
            assert_eq!(px[2], *g);
            assert_eq!(px[3], orig[3]);
        }
    }

    #[test]
    fn empty_frame() {
        let mut frame = Frame::from_raw(0, 0, vec![]).unwrap();
        let gray = convert(&mut frame);
        assert!(gray.data.is_empty());
    }
}

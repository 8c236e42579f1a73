//! Down-sampled frame differencing.

use scrollcap_core::Frame;

/// Edge length of the square motion sample.
pub const SAMPLE_SIZE: u32 = 64;
/// Only every Nth sample pixel is compared.
pub const SAMPLE_STRIDE: usize = 4;
/// Average RGB Manhattan distance (0–765) at which motion is reported.
pub const MOVEMENT_THRESHOLD: f32 = 18.0;

/// A small nearest-neighbour thumbnail of a frame, row-major RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pixels: Vec<[u8; 4]>,
}

impl Sample {
    /// Down-scale `frame` to `SAMPLE_SIZE`×`SAMPLE_SIZE` without filtering.
    pub fn from_frame(frame: &Frame) -> Self {
        let (w, h) = (frame.width() as u64, frame.height() as u64);
        let size = SAMPLE_SIZE as u64;
        let mut pixels = Vec::with_capacity((size * size) as usize);
        for sy in 0..size {
            let y = (sy * h / size) as u32;
            for sx in 0..size {
                let x = (sx * w / size) as u32;
                pixels.push(frame.pixel(x, y));
            }
        }
        Self { pixels }
    }

    /// Build a sample from raw pixels (any length).
    pub fn from_pixels(pixels: Vec<[u8; 4]>) -> Self {
        Self { pixels }
    }

    pub fn pixels(&self) -> &[[u8; 4]] {
        &self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

#[inline]
fn color_distance(a: [u8; 4], b: [u8; 4]) -> u32 {
    a[0].abs_diff(b[0]) as u32 + a[1].abs_diff(b[1]) as u32 + a[2].abs_diff(b[2]) as u32
}

/// Mean RGB Manhattan distance over every `SAMPLE_STRIDE`th pixel.
/// `None` when nothing could be compared.
pub fn average_distance(previous: &Sample, current: &Sample) -> Option<f32> {
    let len = previous.len().min(current.len());
    let mut sum: u64 = 0;
    let mut sampled: u64 = 0;
    for i in (0..len).step_by(SAMPLE_STRIDE) {
        sum += color_distance(previous.pixels[i], current.pixels[i]) as u64;
        sampled += 1;
    }
    if sampled == 0 {
        return None;
    }
    Some(sum as f32 / sampled as f32)
}

/// Whether `current` moved relative to `previous`. The first sample of a
/// session has no predecessor and only establishes the baseline.
pub fn has_meaningful_change(previous: Option<&Sample>, current: &Sample) -> bool {
    let Some(previous) = previous else { return false };
    average_distance(previous, current).is_some_and(|avg| avg >= MOVEMENT_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(rgba: [u8; 4]) -> Sample {
        Sample::from_pixels(vec![rgba; (SAMPLE_SIZE * SAMPLE_SIZE) as usize])
    }

    #[test]
    fn identical_samples_never_move() {
        let s = uniform([10, 200, 30, 255]);
        assert_eq!(average_distance(&s, &s), Some(0.0));
        assert!(!has_meaningful_change(Some(&s), &s));
    }

    #[test]
    fn first_sample_is_baseline_only() {
        let s = uniform([0, 0, 0, 255]);
        assert!(!has_meaningful_change(None, &s));
    }

    #[test]
    fn changes_off_stride_are_ignored() {
        let base = uniform([50, 50, 50, 255]);
        let mut pixels = base.pixels().to_vec();
        for (i, px) in pixels.iter_mut().enumerate() {
            if i % SAMPLE_STRIDE != 0 {
                *px = [255, 255, 255, 255];
            }
        }
        let noisy = Sample::from_pixels(pixels);
        assert_eq!(average_distance(&base, &noisy), Some(0.0));
        assert!(!has_meaningful_change(Some(&base), &noisy));
    }

    #[test]
    fn distance_grows_with_difference() {
        let base = uniform([100, 100, 100, 255]);
        let mut last = 0.0;
        for delta in [1u8, 5, 6, 20, 100] {
            let other = uniform([100 + delta, 100 + delta, 100 + delta, 255]);
            let d = average_distance(&base, &other).unwrap();
            assert!(d > last, "delta {delta} gave {d}, previous {last}");
            last = d;
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let base = uniform([100, 100, 100, 255]);
        // 6 per channel → 18 total
        let at = uniform([106, 106, 106, 255]);
        let below = uniform([106, 106, 105, 255]);
        assert!(has_meaningful_change(Some(&base), &at));
        assert!(!has_meaningful_change(Some(&base), &below));
    }

    #[test]
    fn alpha_is_not_compared() {
        let a = uniform([1, 2, 3, 0]);
        let b = uniform([1, 2, 3, 255]);
        assert_eq!(average_distance(&a, &b), Some(0.0));
    }

    #[test]
    fn sampling_picks_nearest_pixels() {
        // left half black, right half white
        let (w, h) = (128u32, 32u32);
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for _y in 0..h {
            for x in 0..w {
                let v = if x < w / 2 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let frame = Frame::from_rgba(w, h, data).unwrap();
        let sample = Sample::from_frame(&frame);
        assert_eq!(sample.len(), 64 * 64);
        assert_eq!(sample.pixels()[0], [0, 0, 0, 255]);
        assert_eq!(sample.pixels()[63], [255, 255, 255, 255]);
        assert_eq!(sample.pixels()[31], [0, 0, 0, 255]);
        assert_eq!(sample.pixels()[32], [255, 255, 255, 255]);
    }
}

//! Geometric normalization for plate crops: scaling, skew correction, and
//! sharpening applied before a crop is handed to recognition.
//!
//! Everything here is deterministic and side-effect free. Empty inputs
//! short-circuit to empty outputs; malformed geometry never panics.

use platewatch_types::GrayImage;

/// Resizes by `scale_percent / 100` in both axes using bilinear sampling.
///
/// `enlarge(image, 100)` preserves dimensions exactly. Empty input, or a
/// scale small enough to collapse either axis to zero, yields an empty image.
pub fn enlarge(image: &GrayImage, scale_percent: u32) -> GrayImage {
    if image.is_empty() {
        return GrayImage::empty();
    }
    let new_width = (image.width() as u64 * scale_percent as u64 / 100) as u32;
    let new_height = (image.height() as u64 * scale_percent as u64 / 100) as u32;
    if new_width == 0 || new_height == 0 {
        return GrayImage::empty();
    }
    if new_width == image.width() && new_height == image.height() {
        return rebuild(image, image.to_packed_vec(), image.width(), image.height());
    }

    let scale_x = image.width() as f64 / new_width as f64;
    let scale_y = image.height() as f64 / new_height as f64;
    let mut out = vec![0u8; new_width as usize * new_height as usize];
    for y in 0..new_height {
        let src_y = (y as f64 + 0.5) * scale_y - 0.5;
        for x in 0..new_width {
            let src_x = (x as f64 + 0.5) * scale_x - 0.5;
            out[y as usize * new_width as usize + x as usize] =
                sample_bilinear(image, src_x, src_y);
        }
    }
    rebuild(image, out, new_width, new_height)
}

/// Searches rotation angles in `[-angle_limit, +angle_limit]` (inclusive,
/// stepped by `angle_step`, most negative first) for the one that maximizes
/// the row-profile sharpness score, then re-rotates the original image by the
/// winning angle with bilinear interpolation and edge-replicating borders.
///
/// Ties resolve to the first angle scanned. Returns `(0.0, empty)` for empty
/// input or a non-positive step.
pub fn correct_skew(image: &GrayImage, angle_step: f64, angle_limit: f64) -> (f64, GrayImage) {
    if image.is_empty() || angle_step <= 0.0 || angle_limit < 0.0 {
        return (0.0, GrayImage::empty());
    }

    let mut best_angle = -angle_limit;
    let mut best_score = f64::MIN;
    let mut angle = -angle_limit;
    while angle <= angle_limit + 1e-9 {
        let rotated = rotate_nearest(image, angle);
        let score = profile_score(&row_profile(
            &rotated,
            image.width() as usize,
            image.height() as usize,
        ));
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
        angle += angle_step;
    }

    (best_angle, rotate_bilinear_replicate(image, best_angle))
}

/// Integer nearest-neighbor upscaling followed by a 3x3 unsharp mask (center
/// weight 9, eight neighbors -1) to recover edge contrast lost to
/// interpolation earlier in the pipeline.
pub fn sharpen_upscale(image: &GrayImage, scale: u32) -> GrayImage {
    if image.is_empty() || scale == 0 {
        return GrayImage::empty();
    }
    let width = image.width() as usize * scale as usize;
    let height = image.height() as usize * scale as usize;
    let mut upscaled = vec![0u8; width * height];
    for y in 0..height {
        let src_row = image.row((y / scale as usize) as u32);
        let dst_row = &mut upscaled[y * width..(y + 1) * width];
        for (x, value) in dst_row.iter_mut().enumerate() {
            *value = src_row[x / scale as usize];
        }
    }

    let mut out = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0i32;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sy = (y as i64 + dy).clamp(0, height as i64 - 1) as usize;
                    let sx = (x as i64 + dx).clamp(0, width as i64 - 1) as usize;
                    let weight = if dx == 0 && dy == 0 { 9 } else { -1 };
                    acc += weight * upscaled[sy * width + sx] as i32;
                }
            }
            out[y * width + x] = acc.clamp(0, 255) as u8;
        }
    }
    rebuild(image, out, width as u32, height as u32)
}

/// Global histogram equalization, used to precondition cascade input.
pub fn equalize(image: &GrayImage) -> GrayImage {
    if image.is_empty() {
        return GrayImage::empty();
    }
    let mut histogram = [0u64; 256];
    for y in 0..image.height() {
        for &value in image.row(y) {
            histogram[value as usize] += 1;
        }
    }
    let total = image.width() as u64 * image.height() as u64;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        cumulative += count;
        lut[value] = ((cumulative * 255) / total) as u8;
    }
    let mut out = Vec::with_capacity(total as usize);
    for y in 0..image.height() {
        out.extend(image.row(y).iter().map(|&v| lut[v as usize]));
    }
    rebuild(image, out, image.width(), image.height())
}

fn rebuild(source: &GrayImage, data: Vec<u8>, width: u32, height: u32) -> GrayImage {
    GrayImage::from_owned(width, height, width as usize, source.timestamp(), data)
        .map(|img| img.with_frame_index(source.frame_index()))
        .unwrap_or_else(|_| GrayImage::empty())
}

fn sample_bilinear(image: &GrayImage, x: f64, y: f64) -> u8 {
    let max_x = (image.width() - 1) as f64;
    let max_y = (image.height() - 1) as f64;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let top = image.pixel(x0, y0) as f64 * (1.0 - fx) + image.pixel(x1, y0) as f64 * fx;
    let bottom = image.pixel(x0, y1) as f64 * (1.0 - fx) + image.pixel(x1, y1) as f64 * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

/// Fast scoring rotation: nearest-neighbor sampling with a zero border, so
/// empty corners do not contribute to the profile.
fn rotate_nearest(image: &GrayImage, angle_deg: f64) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let mut out = vec![0u8; width * height];
    for y in 0..height {
        let dy = y as f64 - cy;
        for x in 0..width {
            let dx = x as f64 - cx;
            let src_x = cos * dx + sin * dy + cx;
            let src_y = -sin * dx + cos * dy + cy;
            let sx = src_x.round();
            let sy = src_y.round();
            if sx < 0.0 || sy < 0.0 || sx >= width as f64 || sy >= height as f64 {
                continue;
            }
            out[y * width + x] = image.pixel(sx as u32, sy as u32);
        }
    }
    out
}

/// Final rotation: bilinear sampling with edge replication so the corrected
/// plate has no black wedges for the recognizer to chew on.
fn rotate_bilinear_replicate(image: &GrayImage, angle_deg: f64) -> GrayImage {
    let width = image.width();
    let height = image.height();
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let mut out = vec![0u8; width as usize * height as usize];
    for y in 0..height {
        let dy = y as f64 - cy;
        for x in 0..width {
            let dx = x as f64 - cx;
            let src_x = cos * dx + sin * dy + cx;
            let src_y = -sin * dx + cos * dy + cy;
            out[y as usize * width as usize + x as usize] =
                sample_bilinear(image, src_x, src_y);
        }
    }
    rebuild(image, out, width, height)
}

fn row_profile(data: &[u8], width: usize, height: usize) -> Vec<f64> {
    let mut profile = Vec::with_capacity(height);
    for y in 0..height {
        let row = &data[y * width..(y + 1) * width];
        profile.push(row.iter().map(|&v| v as f64).sum());
    }
    profile
}

/// Sum of squared differences between adjacent profile rows. Sharper, more
/// bimodal profiles (text rows against background) score higher.
fn profile_score(profile: &[f64]) -> f64 {
    profile
        .windows(2)
        .map(|pair| {
            let diff = pair[1] - pair[0];
            diff * diff
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banded_image(width: u32, height: u32) -> GrayImage {
        let mut data = vec![20u8; (width * height) as usize];
        let band = (height / 2).saturating_sub(3)..(height / 2 + 3).min(height);
        for y in band {
            for x in 0..width {
                data[(y * width + x) as usize] = 235;
            }
        }
        GrayImage::from_pixels(width, height, data).unwrap()
    }

    #[test]
    fn enlarge_at_100_percent_keeps_dimensions() {
        let image = banded_image(40, 20);
        let same = enlarge(&image, 100);
        assert_eq!(same.width(), 40);
        assert_eq!(same.height(), 20);
        assert_eq!(same.data(), image.to_packed_vec().as_slice());
    }

    #[test]
    fn enlarge_scales_both_axes() {
        let image = banded_image(40, 20);
        let bigger = enlarge(&image, 150);
        assert_eq!(bigger.width(), 60);
        assert_eq!(bigger.height(), 30);
        let smaller = enlarge(&image, 50);
        assert_eq!(smaller.width(), 20);
        assert_eq!(smaller.height(), 10);
    }

    #[test]
    fn enlarge_of_empty_is_empty() {
        assert!(enlarge(&GrayImage::empty(), 150).is_empty());
        let tiny = banded_image(4, 4);
        assert!(enlarge(&tiny, 1).is_empty());
    }

    #[test]
    fn correct_skew_prefers_zero_for_aligned_bands() {
        let image = banded_image(80, 40);
        let (angle, corrected) = correct_skew(&image, 1.0, 10.0);
        assert_eq!(angle, 0.0);
        assert_eq!(corrected.width(), 80);
        assert_eq!(corrected.height(), 40);
    }

    #[test]
    fn correct_skew_recovers_known_rotation() {
        let image = banded_image(120, 60);
        for &theta in &[4.0f64, -6.0] {
            let rotated = rotate_bilinear_replicate(&image, theta);
            let (angle, _) = correct_skew(&rotated, 1.0, 12.0);
            assert!(
                (angle + theta).abs() <= 1.0 + 1e-9,
                "expected about {} got {}",
                -theta,
                angle
            );
        }
    }

    #[test]
    fn correct_skew_of_empty_is_empty() {
        let (angle, image) = correct_skew(&GrayImage::empty(), 1.0, 15.0);
        assert_eq!(angle, 0.0);
        assert!(image.is_empty());
    }

    #[test]
    fn sharpen_upscale_multiplies_dimensions() {
        let image = banded_image(20, 10);
        let sharpened = sharpen_upscale(&image, 2);
        assert_eq!(sharpened.width(), 40);
        assert_eq!(sharpened.height(), 20);
    }

    #[test]
    fn sharpen_upscale_keeps_flat_areas_flat() {
        let image = GrayImage::from_pixels(8, 8, vec![100u8; 64]).unwrap();
        let sharpened = sharpen_upscale(&image, 2);
        // kernel weights sum to one, so constant regions pass through
        assert!(sharpened.data().iter().all(|&v| v == 100));
    }

    #[test]
    fn equalize_stretches_contrast() {
        let mut data = vec![100u8; 64];
        data[..32].fill(110);
        let image = GrayImage::from_pixels(8, 8, data).unwrap();
        let equalized = equalize(&image);
        let min = equalized.data().iter().min().copied().unwrap();
        let max = equalized.data().iter().max().copied().unwrap();
        assert!(max > min);
        assert!(max as i32 - min as i32 >= 100);
    }
}

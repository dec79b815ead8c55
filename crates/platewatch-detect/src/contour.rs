//! Contour-based fallback detector.
//!
//! When the cascade finds nothing (or to supplement recall in all-candidates
//! mode), plates are located by shape alone: smooth, adaptively binarize,
//! close small gaps between characters, then keep connected components whose
//! bounding boxes look like a rectangular plate rather than background
//! clutter.

use platewatch_types::{GrayImage, Region};

/// Geometry thresholds encoding the expected shape of a plate at typical
/// capture resolutions. Width/height/aspect bounds are exclusive.
#[derive(Debug, Clone, Copy)]
pub struct ContourConfig {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub min_fill: f32,
    pub smooth_radius: u32,
    pub threshold_block: u32,
    pub threshold_offset: i16,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            min_width: 100,
            max_width: 500,
            min_height: 30,
            max_height: 150,
            min_aspect: 2.0,
            max_aspect: 5.0,
            min_fill: 0.4,
            smooth_radius: 2,
            threshold_block: 15,
            threshold_offset: 10,
        }
    }
}

/// Finds plate-shaped regions, largest first. Pure with respect to input.
pub fn find_plate_regions(image: &GrayImage, config: &ContourConfig) -> Vec<Region> {
    if image.is_empty() {
        return Vec::new();
    }
    let width = image.width() as usize;
    let height = image.height() as usize;

    let smoothed = bilateral_smooth(image, config.smooth_radius, 25.0);
    let mut mask = adaptive_threshold_inv(
        &smoothed,
        width,
        height,
        config.threshold_block as usize,
        config.threshold_offset,
    );
    close_3x3(&mut mask, width, height);

    let mut components = connected_components(&mask, width, height);
    components.sort_by(|a, b| b.area.cmp(&a.area));

    let mut regions = Vec::new();
    for comp in components {
        let w = (comp.max_x - comp.min_x + 1) as u32;
        let h = (comp.max_y - comp.min_y + 1) as u32;
        let fill = comp.area as f32 / (w as f32 * h as f32);
        if !plate_shaped(w, h, fill, config) {
            log::debug!(
                "contour reject {}x{}+{}+{} fill {:.2}",
                w,
                h,
                comp.min_x,
                comp.min_y,
                fill
            );
            continue;
        }
        regions.push(Region::new(comp.min_x as u32, comp.min_y as u32, w, h));
    }
    regions
}

fn plate_shaped(width: u32, height: u32, fill: f32, config: &ContourConfig) -> bool {
    if width <= config.min_width || width >= config.max_width {
        return false;
    }
    if height <= config.min_height || height >= config.max_height {
        return false;
    }
    let aspect = width as f32 / height as f32;
    if aspect <= config.min_aspect || aspect >= config.max_aspect {
        return false;
    }
    fill > config.min_fill
}

/// Edge-preserving smoothing: gaussian in space, gaussian in intensity
/// difference, so character strokes stay crisp while sensor noise flattens.
fn bilateral_smooth(image: &GrayImage, radius: u32, sigma_color: f32) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let radius = radius as i64;
    let sigma_space = (radius as f32 / 2.0).max(1.0);

    let mut spatial = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let d2 = (dx * dx + dy * dy) as f32;
            spatial.push((-d2 / (2.0 * sigma_space * sigma_space)).exp());
        }
    }
    let mut range = [0.0f32; 256];
    for (diff, weight) in range.iter_mut().enumerate() {
        let d = diff as f32;
        *weight = (-(d * d) / (2.0 * sigma_color * sigma_color)).exp();
    }

    let mut out = vec![0u8; width * height];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let center = image.pixel(x as u32, y as u32) as f32;
            let mut acc = 0.0f32;
            let mut norm = 0.0f32;
            let mut k = 0usize;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let sy = (y + dy).clamp(0, height as i64 - 1) as u32;
                    let sx = (x + dx).clamp(0, width as i64 - 1) as u32;
                    let value = image.pixel(sx, sy) as f32;
                    let weight = spatial[k] * range[(value - center).abs() as usize];
                    acc += weight * value;
                    norm += weight;
                    k += 1;
                }
            }
            out[y as usize * width + x as usize] = (acc / norm).round() as u8;
        }
    }
    out
}

/// Inverted adaptive mean threshold: a pixel is marked when it is darker than
/// its local neighborhood mean by more than `offset`, which picks out dark
/// characters over a bright plate body.
fn adaptive_threshold_inv(
    pixels: &[u8],
    width: usize,
    height: usize,
    block: usize,
    offset: i16,
) -> Vec<u8> {
    let mut integral = vec![0u64; (width + 1) * (height + 1)];
    for y in 0..height {
        let mut row_sum = 0u64;
        for x in 0..width {
            row_sum += pixels[y * width + x] as u64;
            integral[(y + 1) * (width + 1) + x + 1] = integral[y * (width + 1) + x + 1] + row_sum;
        }
    }

    let half = (block / 2).max(1);
    let mut mask = vec![0u8; width * height];
    for y in 0..height {
        let y0 = y.saturating_sub(half);
        let y1 = (y + half + 1).min(height);
        for x in 0..width {
            let x0 = x.saturating_sub(half);
            let x1 = (x + half + 1).min(width);
            let count = ((x1 - x0) * (y1 - y0)) as u64;
            let sum = integral[y1 * (width + 1) + x1] + integral[y0 * (width + 1) + x0]
                - integral[y0 * (width + 1) + x1]
                - integral[y1 * (width + 1) + x0];
            let mean = (sum / count) as i32;
            if (pixels[y * width + x] as i32) < mean - offset as i32 {
                mask[y * width + x] = 1;
            }
        }
    }
    mask
}

/// 3x3 morphological closing (dilate then erode) to bridge the small gaps
/// between characters so a plate becomes a single component.
fn close_3x3(mask: &mut [u8], width: usize, height: usize) {
    let dilated = morph_3x3(mask, width, height, true);
    let closed = morph_3x3(&dilated, width, height, false);
    mask.copy_from_slice(&closed);
}

fn morph_3x3(mask: &[u8], width: usize, height: usize, dilate: bool) -> Vec<u8> {
    let mut out = vec![0u8; width * height];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut hit = !dilate;
            'window: for dy in -1..=1i64 {
                for dx in -1..=1i64 {
                    let sy = y + dy;
                    let sx = x + dx;
                    let value = if sy < 0 || sx < 0 || sy >= height as i64 || sx >= width as i64 {
                        0
                    } else {
                        mask[sy as usize * width + sx as usize]
                    };
                    if dilate && value != 0 {
                        hit = true;
                        break 'window;
                    }
                    if !dilate && value == 0 {
                        hit = false;
                        break 'window;
                    }
                }
            }
            out[y as usize * width + x as usize] = hit as u8;
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct ComponentStats {
    area: usize,
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
}

#[derive(Clone, Copy)]
struct RowRun {
    y: usize,
    start: usize,
    end: usize,
}

struct RunDsu {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl RunDsu {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len as u32).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, x: u32) -> u32 {
        let idx = x as usize;
        let parent = self.parent[idx];
        if parent == x {
            return x;
        }
        let root = self.find(parent);
        self.parent[idx] = root;
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        if self.rank[root_a as usize] < self.rank[root_b as usize] {
            std::mem::swap(&mut root_a, &mut root_b);
        }
        self.parent[root_b as usize] = root_a;
        if self.rank[root_a as usize] == self.rank[root_b as usize] {
            self.rank[root_a as usize] += 1;
        }
    }
}

/// Connected components over horizontal runs: runs in adjacent rows that
/// overlap are unioned, then per-root stats give each component's area and
/// bounding box.
fn connected_components(mask: &[u8], width: usize, height: usize) -> Vec<ComponentStats> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let mut runs: Vec<RowRun> = Vec::new();
    let mut row_offsets = vec![0usize; height + 1];
    for y in 0..height {
        row_offsets[y] = runs.len();
        let row = &mask[y * width..(y + 1) * width];
        let mut x = 0usize;
        while x < width {
            if row[x] == 0 {
                x += 1;
                continue;
            }
            let start = x;
            while x < width && row[x] != 0 {
                x += 1;
            }
            runs.push(RowRun { y, start, end: x });
        }
    }
    row_offsets[height] = runs.len();
    if runs.is_empty() {
        return Vec::new();
    }

    let mut dsu = RunDsu::new(runs.len());
    for y in 1..height {
        for curr_idx in row_offsets[y]..row_offsets[y + 1] {
            let curr = runs[curr_idx];
            for prev_idx in row_offsets[y - 1]..row_offsets[y] {
                let prev = runs[prev_idx];
                if prev.end > curr.start && curr.end > prev.start {
                    dsu.union(curr_idx as u32, prev_idx as u32);
                }
            }
        }
    }

    let mut stats: Vec<Option<ComponentStats>> = vec![None; runs.len()];
    for (idx, run) in runs.iter().enumerate() {
        let root = dsu.find(idx as u32) as usize;
        let entry = stats[root].get_or_insert(ComponentStats {
            area: 0,
            min_x: run.start,
            max_x: run.start,
            min_y: run.y,
            max_y: run.y,
        });
        entry.area += run.end - run.start;
        entry.min_x = entry.min_x.min(run.start);
        entry.max_x = entry.max_x.max(run.end - 1);
        entry.min_y = entry.min_y.min(run.y);
        entry.max_y = entry.max_y.max(run.y);
    }
    stats.into_iter().flatten().collect()
}

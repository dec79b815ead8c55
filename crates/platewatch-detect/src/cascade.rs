//! Staged rectangle-feature classifier used as the primary plate detector.
//!
//! The artifact is a pretrained, externally supplied JSON description of a
//! base detection window and an ordered list of stages. Each stage sums
//! weighted votes from rectangle features evaluated over an integral image;
//! a window survives only if every stage total clears its threshold. The
//! scanner slides the window across the frame at a ladder of scales and
//! groups overlapping raw hits with a minimum-neighbors vote.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::DetectError;
use platewatch_types::{GrayImage, Region};

/// Multi-scale scan parameters. Defaults follow the usual cascade tuning:
/// a ~1.1 scale ladder and a 3-neighbor vote.
#[derive(Debug, Clone, Copy)]
pub struct ScanParams {
    pub scale_step: f32,
    pub min_neighbors: u32,
    pub min_size: Option<(u32, u32)>,
    pub max_size: Option<(u32, u32)>,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            scale_step: 1.1,
            min_neighbors: 3,
            min_size: None,
            max_size: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeModel {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub threshold: f32,
    pub features: Vec<Feature>,
}

/// One weak classifier: a weighted sum of rectangle means compared against a
/// threshold, voting `pass_weight` or `fail_weight` into the stage total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub threshold: f32,
    pub pass_weight: f32,
    pub fail_weight: f32,
    pub rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

#[derive(Debug, Clone)]
pub struct CascadeClassifier {
    model: CascadeModel,
}

impl CascadeClassifier {
    pub fn from_path(path: &Path) -> Result<Self, DetectError> {
        let raw = fs::read_to_string(path).map_err(|source| DetectError::ArtifactIo {
            path: path.to_path_buf(),
            source,
        })?;
        let model: CascadeModel =
            serde_json::from_str(&raw).map_err(|source| DetectError::ArtifactParse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_model(model)
    }

    pub fn from_model(model: CascadeModel) -> Result<Self, DetectError> {
        if model.window_width == 0 || model.window_height == 0 {
            return Err(DetectError::ArtifactInvalid {
                reason: "detection window has zero area".into(),
            });
        }
        if model.stages.is_empty() {
            return Err(DetectError::ArtifactInvalid {
                reason: "cascade has no stages".into(),
            });
        }
        for stage in &model.stages {
            for feature in &stage.features {
                for rect in &feature.rects {
                    let fits = rect.width > 0
                        && rect.height > 0
                        && rect.x + rect.width <= model.window_width
                        && rect.y + rect.height <= model.window_height;
                    if !fits {
                        return Err(DetectError::ArtifactInvalid {
                            reason: format!(
                                "feature rect {}x{}+{}+{} exceeds the {}x{} window",
                                rect.width,
                                rect.height,
                                rect.x,
                                rect.y,
                                model.window_width,
                                model.window_height
                            ),
                        });
                    }
                }
            }
        }
        Ok(Self { model })
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.model.window_width, self.model.window_height)
    }

    /// Scans the frame at every scale where the window still fits and
    /// returns grouped candidate regions, strongest cluster first.
    pub fn detect_multi_scale(&self, image: &GrayImage, params: &ScanParams) -> Vec<Region> {
        if image.is_empty() {
            return Vec::new();
        }
        let integral = IntegralImage::new(image);
        let scale_step = params.scale_step.max(1.01);
        let mut raw_hits = Vec::new();
        let mut scale = 1.0f32;

        loop {
            let win_w = (self.model.window_width as f32 * scale).round() as u32;
            let win_h = (self.model.window_height as f32 * scale).round() as u32;
            if win_w > image.width() || win_h > image.height() {
                break;
            }
            if let Some((max_w, max_h)) = params.max_size
                && (win_w > max_w || win_h > max_h)
            {
                break;
            }
            let skip = params
                .min_size
                .is_some_and(|(min_w, min_h)| win_w < min_w || win_h < min_h);
            if !skip {
                let step = ((2.0 * scale).round() as usize).max(1);
                let mut y = 0u32;
                while y + win_h <= image.height() {
                    let mut x = 0u32;
                    while x + win_w <= image.width() {
                        if self.eval_window(&integral, x, y, scale, win_w, win_h) {
                            raw_hits.push(Region::new(x, y, win_w, win_h));
                        }
                        x += step as u32;
                    }
                    y += step as u32;
                }
            }
            scale *= scale_step;
        }

        group_hits(&raw_hits, params.min_neighbors)
    }

    fn eval_window(
        &self,
        integral: &IntegralImage,
        wx: u32,
        wy: u32,
        scale: f32,
        win_w: u32,
        win_h: u32,
    ) -> bool {
        for stage in &self.model.stages {
            let mut total = 0.0f32;
            for feature in &stage.features {
                let mut value = 0.0f32;
                for rect in &feature.rects {
                    let x0 = wx + (rect.x as f32 * scale).round() as u32;
                    let y0 = wy + (rect.y as f32 * scale).round() as u32;
                    let w = ((rect.width as f32 * scale).round() as u32).max(1);
                    let h = ((rect.height as f32 * scale).round() as u32).max(1);
                    // position and size round independently, so the scaled
                    // rect can poke past the scaled window edge
                    let x1 = (x0 + w).min(wx + win_w);
                    let y1 = (y0 + h).min(wy + win_h);
                    if x1 <= x0 || y1 <= y0 {
                        continue;
                    }
                    let (w, h) = (x1 - x0, y1 - y0);
                    let sum = integral.rect_sum(x0, y0, w, h);
                    let mean = sum as f32 / (w * h) as f32;
                    value += rect.weight * mean;
                }
                total += if value >= feature.threshold {
                    feature.pass_weight
                } else {
                    feature.fail_weight
                };
            }
            if total < stage.threshold {
                return false;
            }
        }
        true
    }
}

/// Summed-area table with a zero border row/column, so any rectangle sum is
/// four lookups.
struct IntegralImage {
    width: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    fn new(image: &GrayImage) -> Self {
        let width = image.width() as usize + 1;
        let height = image.height() as usize + 1;
        let mut sums = vec![0u64; width * height];
        for y in 0..image.height() as usize {
            let row = image.row(y as u32);
            let mut row_sum = 0u64;
            for (x, &value) in row.iter().enumerate() {
                row_sum += value as u64;
                sums[(y + 1) * width + x + 1] = sums[y * width + x + 1] + row_sum;
            }
        }
        Self { width, sums }
    }

    fn rect_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        self.sums[y1 * self.width + x1] + self.sums[y0 * self.width + x0]
            - self.sums[y0 * self.width + x1]
            - self.sums[y1 * self.width + x0]
    }
}

/// Groups overlapping raw hits into clusters and keeps those meeting the
/// neighbor vote, averaged into one rectangle each and ordered by cluster
/// size so the strongest candidate comes first.
fn group_hits(hits: &[Region], min_neighbors: u32) -> Vec<Region> {
    if hits.is_empty() {
        return Vec::new();
    }
    let mut parent: Vec<usize> = (0..hits.len()).collect();

    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut walk = i;
        while parent[walk] != root {
            let next = parent[walk];
            parent[walk] = root;
            walk = next;
        }
        root
    }

    for i in 0..hits.len() {
        for j in i + 1..hits.len() {
            if similar(&hits[i], &hits[j]) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[a] = b;
                }
            }
        }
    }

    struct Cluster {
        count: u32,
        x: u64,
        y: u64,
        w: u64,
        h: u64,
    }

    let mut clusters: Vec<(usize, Cluster)> = Vec::new();
    for i in 0..hits.len() {
        let root = find(&mut parent, i);
        let hit = &hits[i];
        match clusters.iter_mut().find(|(r, _)| *r == root) {
            Some((_, cluster)) => {
                cluster.count += 1;
                cluster.x += hit.x as u64;
                cluster.y += hit.y as u64;
                cluster.w += hit.width as u64;
                cluster.h += hit.height as u64;
            }
            None => clusters.push((
                root,
                Cluster {
                    count: 1,
                    x: hit.x as u64,
                    y: hit.y as u64,
                    w: hit.width as u64,
                    h: hit.height as u64,
                },
            )),
        }
    }

    let required = min_neighbors.max(1);
    let mut kept: Vec<(u32, Region)> = clusters
        .into_iter()
        .filter(|(_, c)| c.count >= required)
        .map(|(_, c)| {
            let n = c.count as u64;
            (
                c.count,
                Region::new(
                    (c.x / n) as u32,
                    (c.y / n) as u32,
                    (c.w / n) as u32,
                    (c.h / n) as u32,
                ),
            )
        })
        .collect();
    kept.sort_by(|a, b| b.0.cmp(&a.0));
    kept.into_iter().map(|(_, region)| region).collect()
}

fn similar(a: &Region, b: &Region) -> bool {
    let delta = (0.2 * 0.5 * (a.width + b.width) as f32) as i64;
    let close = |p: u32, q: u32| (p as i64 - q as i64).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Single stage, single feature: fires when the window mean is bright.
    fn bright_window_model(w: u32, h: u32) -> CascadeModel {
        CascadeModel {
            window_width: w,
            window_height: h,
            stages: vec![Stage {
                threshold: 1.0,
                features: vec![Feature {
                    threshold: 128.0,
                    pass_weight: 1.0,
                    fail_weight: -1.0,
                    rects: vec![WeightedRect {
                        x: 0,
                        y: 0,
                        width: w,
                        height: h,
                        weight: 1.0,
                    }],
                }],
            }],
        }
    }

    fn frame_with_bright_block(x: u32, y: u32, w: u32, h: u32) -> GrayImage {
        let mut data = vec![10u8; 64 * 48];
        for row in y..y + h {
            for col in x..x + w {
                data[(row * 64 + col) as usize] = 250;
            }
        }
        GrayImage::from_pixels(64, 48, data).unwrap()
    }

    #[test]
    fn detects_bright_block_at_its_location() {
        let classifier =
            CascadeClassifier::from_model(bright_window_model(8, 8)).expect("valid model");
        let frame = frame_with_bright_block(20, 16, 10, 10);
        let params = ScanParams {
            min_neighbors: 1,
            ..ScanParams::default()
        };
        let regions = classifier.detect_multi_scale(&frame, &params);
        assert!(!regions.is_empty());
        let best = regions[0];
        assert!(best.x >= 18 && best.x <= 24, "x={}", best.x);
        assert!(best.y >= 14 && best.y <= 20, "y={}", best.y);
    }

    #[test]
    fn uniform_dark_frame_yields_nothing() {
        let classifier =
            CascadeClassifier::from_model(bright_window_model(8, 8)).expect("valid model");
        let frame = GrayImage::from_pixels(64, 48, vec![10u8; 64 * 48]).unwrap();
        let regions = classifier.detect_multi_scale(&frame, &ScanParams::default());
        assert!(regions.is_empty());
    }

    #[test]
    fn rejects_rect_outside_window() {
        let mut model = bright_window_model(8, 8);
        model.stages[0].features[0].rects[0].width = 9;
        assert!(matches!(
            CascadeClassifier::from_model(model),
            Err(DetectError::ArtifactInvalid { .. })
        ));
    }

    #[test]
    fn loads_artifact_from_disk_and_reports_parse_errors() {
        let mut good = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&bright_window_model(12, 4)).unwrap();
        good.write_all(json.as_bytes()).unwrap();
        let classifier = CascadeClassifier::from_path(good.path()).unwrap();
        assert_eq!(classifier.window_size(), (12, 4));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        bad.write_all(b"not json").unwrap();
        assert!(matches!(
            CascadeClassifier::from_path(bad.path()),
            Err(DetectError::ArtifactParse { .. })
        ));
    }

    #[test]
    fn corner_feature_rect_survives_scaled_scan() {
        // a rect flush against the window corner rounds past the scaled
        // window edge at some ladder steps; the scan must clamp, not panic
        let model = CascadeModel {
            window_width: 4,
            window_height: 4,
            stages: vec![Stage {
                threshold: 0.0,
                features: vec![Feature {
                    threshold: 128.0,
                    pass_weight: 1.0,
                    fail_weight: -1.0,
                    rects: vec![WeightedRect {
                        x: 2,
                        y: 2,
                        width: 2,
                        height: 2,
                        weight: 1.0,
                    }],
                }],
            }],
        };
        let classifier = CascadeClassifier::from_model(model).expect("valid model");
        let frame = GrayImage::from_pixels(5, 5, vec![200u8; 25]).unwrap();
        let params = ScanParams {
            min_neighbors: 1,
            ..ScanParams::default()
        };
        let regions = classifier.detect_multi_scale(&frame, &params);
        assert!(!regions.is_empty(), "uniform bright frame passes the stage");
    }

    #[test]
    fn min_neighbors_filters_lone_hits() {
        let hits = vec![
            Region::new(10, 10, 20, 10),
            Region::new(11, 10, 20, 10),
            Region::new(10, 11, 20, 10),
            Region::new(200, 100, 20, 10),
        ];
        let grouped = group_hits(&hits, 2);
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].x >= 10 && grouped[0].x <= 11);
    }
}

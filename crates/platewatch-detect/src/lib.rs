//! Plate localization for the platewatch workspace.
//!
//! Two detection paths share a common front: a staged rectangle-feature
//! cascade loaded from a JSON artifact, and a contour-based shape detector
//! used as a fallback when no artifact is available or the cascade comes up
//! empty. [`PlateDetector`] wires the two together and applies the configured
//! candidate policy.

pub mod cascade;
pub mod contour;
pub mod normalize;

use std::path::{Path, PathBuf};

use thiserror::Error;

use cascade::{CascadeClassifier, ScanParams};
use contour::ContourConfig;
use platewatch_types::{GrayImage, Region};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to read cascade artifact {path}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cascade artifact {path}: {source}")]
    ArtifactParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid cascade artifact: {reason}")]
    ArtifactInvalid { reason: String },
}

/// How many regions a detection pass may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidatePolicy {
    /// Only the strongest region per frame.
    #[default]
    SingleBest,
    /// Every region that survives filtering, strongest first.
    AllCandidates,
}

#[derive(Debug, Clone, Default)]
pub struct DetectorConfig {
    pub scan: ScanParams,
    pub contour: ContourConfig,
    pub policy: CandidatePolicy,
}

/// Frame-level plate detector.
///
/// Construction never fails: a missing or unreadable cascade artifact is
/// logged and the detector degrades to contour-only operation.
pub struct PlateDetector {
    cascade: Option<CascadeClassifier>,
    config: DetectorConfig,
}

impl PlateDetector {
    /// Contour-only detector.
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            cascade: None,
            config,
        }
    }

    /// Detector backed by a cascade artifact. Load failures fall back to
    /// contour-only detection rather than aborting the pipeline.
    pub fn with_artifact(config: DetectorConfig, path: &Path) -> Self {
        let cascade = match CascadeClassifier::from_path(path) {
            Ok(classifier) => {
                let (w, h) = classifier.window_size();
                log::info!("loaded cascade artifact {} ({}x{} window)", path.display(), w, h);
                Some(classifier)
            }
            Err(err) => {
                log::warn!("cascade artifact unusable, falling back to contours: {err}");
                None
            }
        };
        Self { cascade, config }
    }

    pub fn has_cascade(&self) -> bool {
        self.cascade.is_some()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Locates plate candidates in a frame or ROI crop. Coordinates are
    /// relative to the input image.
    pub fn detect(&self, image: &GrayImage) -> Vec<Region> {
        if image.is_empty() {
            return Vec::new();
        }

        let mut regions = Vec::new();
        if let Some(cascade) = &self.cascade {
            let equalized = normalize::equalize(image);
            regions = cascade.detect_multi_scale(&equalized, &self.config.scan);
        }

        let need_fallback =
            regions.is_empty() || self.config.policy == CandidatePolicy::AllCandidates;
        if need_fallback {
            for region in contour::find_plate_regions(image, &self.config.contour) {
                if !regions.iter().any(|kept| overlaps(kept, &region)) {
                    regions.push(region);
                }
            }
        }

        if self.config.policy == CandidatePolicy::SingleBest {
            regions.truncate(1);
        }
        regions
    }
}

/// True when the intersection covers more than half of the smaller region.
fn overlaps(a: &Region, b: &Region) -> bool {
    let x0 = a.x.max(b.x);
    let y0 = a.y.max(b.y);
    let x1 = (a.x + a.width).min(b.x + b.width);
    let y1 = (a.y + a.height).min(b.y + b.height);
    if x1 <= x0 || y1 <= y0 {
        return false;
    }
    let inter = (x1 - x0) as u64 * (y1 - y0) as u64;
    inter * 2 > a.area().min(b.area())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plate_frame() -> GrayImage {
        let width = 400u32;
        let height = 200u32;
        let mut data = vec![30u8; (width * height) as usize];
        for y in 60..120u32 {
            for x in 80..300u32 {
                data[(y * width + x) as usize] = 225;
            }
        }
        let mut x = 90u32;
        while x + 12 < 290 {
            for y in 70..110u32 {
                for bar_x in x..x + 12 {
                    data[(y * width + bar_x) as usize] = 35;
                }
            }
            x += 14;
        }
        GrayImage::from_pixels(width, height, data).unwrap()
    }

    #[test]
    fn fallback_runs_without_an_artifact() {
        let detector = PlateDetector::new(DetectorConfig::default());
        assert!(!detector.has_cascade());
        let regions = detector.detect(&plate_frame());
        assert_eq!(regions.len(), 1, "single-best policy returns one region");
    }

    #[test]
    fn missing_artifact_degrades_instead_of_failing() {
        let detector = PlateDetector::with_artifact(
            DetectorConfig::default(),
            Path::new("/nonexistent/cascade.json"),
        );
        assert!(!detector.has_cascade());
        assert!(!detector.detect(&plate_frame()).is_empty());
    }

    #[test]
    fn empty_frame_yields_no_candidates() {
        let detector = PlateDetector::new(DetectorConfig::default());
        assert!(detector.detect(&GrayImage::empty()).is_empty());
    }

    #[test]
    fn all_candidates_policy_keeps_multiple_regions() {
        let config = DetectorConfig {
            policy: CandidatePolicy::AllCandidates,
            ..DetectorConfig::default()
        };
        let detector = PlateDetector::new(config);
        let regions = detector.detect(&plate_frame());
        assert!(!regions.is_empty());
    }

    #[test]
    fn overlap_uses_half_of_smaller_area() {
        let big = Region::new(0, 0, 100, 100);
        let small = Region::new(10, 10, 20, 20);
        assert!(overlaps(&big, &small));
        let apart = Region::new(200, 200, 20, 20);
        assert!(!overlaps(&big, &apart));
    }
}

//! Per-run accumulation of detected plates.
//!
//! Duplicate suppression keys on exact text equality. Near-miss OCR reads
//! (`0` vs `O`) therefore produce separate entries; collapsing them would
//! need a similarity policy the pipeline does not currently define.

use std::collections::HashMap;
use std::time::Duration;

use platewatch_types::Region;

#[derive(Debug, Clone)]
pub struct PlateRecord {
    pub text: String,
    pub confidence: f32,
    pub region: Region,
    pub frame_index: Option<u64>,
    pub timestamp: Option<Duration>,
    pub sightings: u32,
}

#[derive(Debug, Default)]
pub struct DetectionSession {
    plates: HashMap<String, PlateRecord>,
}

impl DetectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a recognized plate. Returns true when the text is new to this
    /// session; repeats only bump the sighting count and keep the metadata of
    /// the first sighting.
    pub fn record(
        &mut self,
        text: &str,
        confidence: f32,
        region: Region,
        frame_index: Option<u64>,
        timestamp: Option<Duration>,
    ) -> bool {
        if text.is_empty() {
            return false;
        }
        match self.plates.get_mut(text) {
            Some(record) => {
                record.sightings += 1;
                false
            }
            None => {
                self.plates.insert(
                    text.to_string(),
                    PlateRecord {
                        text: text.to_string(),
                        confidence,
                        region,
                        frame_index,
                        timestamp,
                        sightings: 1,
                    },
                );
                true
            }
        }
    }

    pub fn contains(&self, text: &str) -> bool {
        self.plates.contains_key(text)
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }

    /// All records ordered by first-seen frame.
    pub fn records(&self) -> Vec<&PlateRecord> {
        let mut records: Vec<&PlateRecord> = self.plates.values().collect();
        records.sort_by_key(|record| record.frame_index.unwrap_or(u64::MAX));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_reads_are_suppressed() {
        let mut session = DetectionSession::new();
        let region = Region::new(10, 10, 200, 50);
        assert!(session.record("X7KCC77", 0.9, region, Some(3), None));
        assert!(!session.record("X7KCC77", 0.95, region, Some(4), None));
        assert_eq!(session.len(), 1);
        let record = session.records()[0];
        assert_eq!(record.sightings, 2);
        // first sighting's metadata wins
        assert_eq!(record.frame_index, Some(3));
        assert!((record.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn empty_text_is_never_recorded() {
        let mut session = DetectionSession::new();
        assert!(!session.record("", 1.0, Region::new(0, 0, 1, 1), None, None));
        assert!(session.is_empty());
    }

    #[test]
    fn near_miss_texts_stay_distinct() {
        let mut session = DetectionSession::new();
        let region = Region::new(0, 0, 200, 50);
        assert!(session.record("AB0CDE1", 0.8, region, Some(1), None));
        assert!(session.record("ABOCDE1", 0.8, region, Some(2), None));
        assert_eq!(session.len(), 2);
    }
}

//! Frame pipeline controller.
//!
//! One loop pulls frames and drives ROI handling, detection, normalization,
//! and recognition submission. Recognition runs on a spawned task so the
//! loop keeps consuming frames while a request is outstanding; the
//! submission gate decides when a new cycle may start. Results come back
//! over a channel serialized with the loop, so no shared mutable state
//! exists beyond the gate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use crate::gate::{GateConfig, SubmissionGate};
use crate::overlay::FrameDump;
use crate::roi::RoiSelector;
use crate::session::{DetectionSession, PlateRecord};
use crate::source::DynFrameSource;
use platewatch_detect::{PlateDetector, normalize};
use platewatch_ocr::RecognitionEngine;
use platewatch_types::{GrayImage, Point, Region, SourceError};

/// ROI crops narrower than this are pre-enlarged before detection.
const SMALL_ROI_WIDTH: u32 = 300;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub gate: GateConfig,
    pub pre_enlarge_percent: u32,
    pub skew_step_degrees: f64,
    pub skew_limit_degrees: f64,
    /// Upscale factor for the sharpened crop handed to recognition. Values
    /// below 2 skip the step.
    pub sharpen_scale: u32,
    pub roi_preset: Option<Region>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            pre_enlarge_percent: 150,
            skew_step_degrees: 1.0,
            skew_limit_degrees: 15.0,
            sharpen_scale: 2,
            roi_preset: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RoiUpdated(Region),
    PlateDetected {
        text: String,
        confidence: f32,
        region: Region,
        frame_index: Option<u64>,
    },
    Finished(PipelineSummary),
}

#[derive(Debug, Clone)]
pub enum PipelineCommand {
    EnableRoiSelection,
    PointerDown(Point),
    PointerMove(Point),
    PointerUp(Point),
    SaveRoi,
    ClearRoi,
    Stop,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub frames: u64,
    pub submissions: u64,
    pub plates: Vec<PlateRecord>,
}

/// Control surface handed to the UI layer or signal handlers. Commands are
/// applied between loop iterations; all are safe to repeat.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<PipelineCommand>,
}

impl PipelineHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(PipelineCommand::Stop);
    }

    pub fn enable_roi_selection(&self) {
        let _ = self.tx.send(PipelineCommand::EnableRoiSelection);
    }

    pub fn pointer_down(&self, p: Point) {
        let _ = self.tx.send(PipelineCommand::PointerDown(p));
    }

    pub fn pointer_move(&self, p: Point) {
        let _ = self.tx.send(PipelineCommand::PointerMove(p));
    }

    pub fn pointer_up(&self, p: Point) {
        let _ = self.tx.send(PipelineCommand::PointerUp(p));
    }

    pub fn save_roi(&self) {
        let _ = self.tx.send(PipelineCommand::SaveRoi);
    }

    pub fn clear_roi(&self) {
        let _ = self.tx.send(PipelineCommand::ClearRoi);
    }
}

pub fn command_channel() -> (PipelineHandle, mpsc::UnboundedReceiver<PipelineCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PipelineHandle { tx }, rx)
}

/// Outcome of one recognition cycle: every submitted crop with its result,
/// plus the frame it came from for annotation.
struct CycleOutcome {
    frame: GrayImage,
    reads: Vec<(Region, platewatch_types::RecognitionResult)>,
}

pub struct Pipeline {
    detector: PlateDetector,
    engine: Arc<dyn RecognitionEngine>,
    config: ControllerConfig,
    dump: Option<FrameDump>,
}

impl Pipeline {
    pub fn new(
        detector: PlateDetector,
        engine: Arc<dyn RecognitionEngine>,
        config: ControllerConfig,
        dump: Option<FrameDump>,
    ) -> Self {
        Self {
            detector,
            engine,
            config,
            dump,
        }
    }

    pub async fn run(
        self,
        source: DynFrameSource,
        events: mpsc::Sender<PipelineEvent>,
        mut commands: mpsc::UnboundedReceiver<PipelineCommand>,
    ) -> Result<PipelineSummary, SourceError> {
        let mut stream = source.into_stream();
        let mut roi = RoiSelector::new();
        if let Some(preset) = self.config.roi_preset {
            roi.commit(preset);
            let _ = events.send(PipelineEvent::RoiUpdated(preset)).await;
        }
        let mut gate = SubmissionGate::new(self.config.gate);
        let mut session = DetectionSession::new();
        let mut frames = 0u64;
        let mut submissions = 0u64;
        let mut pending = 0usize;
        let mut stopping = false;

        let (result_tx, mut result_rx) = mpsc::channel::<CycleOutcome>(4);

        while !stopping {
            tokio::select! {
                biased;
                Some(command) = commands.recv() => {
                    match command {
                        PipelineCommand::EnableRoiSelection => roi.enable_selection(),
                        PipelineCommand::PointerDown(p) => roi.pointer_down(p),
                        PipelineCommand::PointerMove(p) => roi.pointer_move(p),
                        PipelineCommand::PointerUp(p) => roi.pointer_up(p),
                        PipelineCommand::SaveRoi => {
                            if let Some(rect) = roi.save() {
                                let _ = events.send(PipelineEvent::RoiUpdated(rect)).await;
                            }
                        }
                        PipelineCommand::ClearRoi => roi.clear(),
                        PipelineCommand::Stop => stopping = true,
                    }
                }
                Some(outcome) = result_rx.recv() => {
                    gate.on_result();
                    pending = pending.saturating_sub(1);
                    self.handle_outcome(outcome, &mut session, &events).await;
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            frames += 1;
                            if roi.is_selecting() {
                                continue;
                            }
                            let frame_index = frame.frame_index().unwrap_or(frames - 1);
                            let now = Instant::now();
                            if !gate.should_submit(now, frame_index) {
                                continue;
                            }
                            if self.submit_cycle(&frame, &roi, &result_tx) {
                                gate.on_submitted(now);
                                submissions += 1;
                                pending += 1;
                            }
                        }
                        Some(Err(err)) => return Err(err),
                        None => break,
                    }
                }
            }
        }

        // at end of stream, cycles already in flight are allowed to complete;
        // after an explicit stop their results are discarded instead
        if !stopping {
            while pending > 0 {
                let Some(outcome) = result_rx.recv().await else {
                    break;
                };
                pending -= 1;
                self.handle_outcome(outcome, &mut session, &events).await;
            }
        }
        drop(result_tx);

        let summary = PipelineSummary {
            frames,
            submissions,
            plates: session.records().into_iter().cloned().collect(),
        };
        let _ = events.send(PipelineEvent::Finished(summary.clone())).await;
        Ok(summary)
    }

    /// Detects plates in the effective ROI and, when any are found, spawns
    /// one recognition cycle covering all candidate crops. Returns whether a
    /// cycle was started.
    fn submit_cycle(
        &self,
        frame: &GrayImage,
        roi: &RoiSelector,
        result_tx: &mpsc::Sender<CycleOutcome>,
    ) -> bool {
        let effective = roi.effective(frame.width(), frame.height());
        let crop = frame.crop(effective);
        if crop.is_empty() {
            return false;
        }

        // small ROIs are upscaled before detection; detected regions are
        // mapped back through the inverse scale
        let enlarged = crop.width() < SMALL_ROI_WIDTH && self.config.pre_enlarge_percent > 100;
        let search = if enlarged {
            normalize::enlarge(&crop, self.config.pre_enlarge_percent)
        } else {
            crop.clone()
        };
        if search.is_empty() {
            return false;
        }

        let regions = self.detector.detect(&search);
        if regions.is_empty() {
            return false;
        }

        let mut submissions = Vec::with_capacity(regions.len());
        for region in regions {
            let plate = search.crop(region);
            if plate.is_empty() {
                continue;
            }
            let normalized = self.prepare_for_recognition(&plate);
            if normalized.is_empty() {
                continue;
            }
            let frame_region = if enlarged {
                scale_back(region, self.config.pre_enlarge_percent).offset_by(effective)
            } else {
                region.offset_by(effective)
            };
            submissions.push((frame_region, normalized));
        }
        if submissions.is_empty() {
            return false;
        }

        let engine = Arc::clone(&self.engine);
        let frame = frame.clone();
        let result_tx = result_tx.clone();
        tokio::spawn(async move {
            let mut reads = Vec::with_capacity(submissions.len());
            for (region, crop) in submissions {
                let result = match engine.recognize(&crop).await {
                    Ok(result) => result,
                    Err(err) => {
                        log::warn!("recognition failed: {err}");
                        platewatch_types::RecognitionResult::empty()
                    }
                };
                reads.push((region, result));
            }
            let _ = result_tx.send(CycleOutcome { frame, reads }).await;
        });
        true
    }

    /// Straightens a plate crop and hands recognition a sharpened upscale,
    /// which recovers detail the detector-scale crop loses on small plates.
    fn prepare_for_recognition(&self, plate: &GrayImage) -> GrayImage {
        let (angle, corrected) = normalize::correct_skew(
            plate,
            self.config.skew_step_degrees,
            self.config.skew_limit_degrees,
        );
        if angle != 0.0 {
            log::debug!("skew corrected by {angle:.1} degrees");
        }
        if self.config.sharpen_scale >= 2 {
            normalize::sharpen_upscale(&corrected, self.config.sharpen_scale)
        } else {
            corrected
        }
    }

    async fn handle_outcome(
        &self,
        outcome: CycleOutcome,
        session: &mut DetectionSession,
        events: &mpsc::Sender<PipelineEvent>,
    ) {
        for (region, result) in outcome.reads {
            if result.is_empty() {
                continue;
            }
            let newly = session.record(
                &result.text,
                result.confidence,
                region,
                outcome.frame.frame_index(),
                outcome.frame.timestamp(),
            );
            if !newly {
                continue;
            }
            if let Some(dump) = &self.dump {
                if let Err(err) = dump.write(&outcome.frame, region, &result.text) {
                    log::warn!("failed to dump annotated frame: {err}");
                }
            }
            let _ = events
                .send(PipelineEvent::PlateDetected {
                    text: result.text.clone(),
                    confidence: result.confidence,
                    region,
                    frame_index: outcome.frame.frame_index(),
                })
                .await;
        }
    }
}

fn scale_back(region: Region, percent: u32) -> Region {
    let down = |v: u32| (v as u64 * 100 / percent as u64) as u32;
    Region::new(down(region.x), down(region.y), down(region.width), down(region.height))
}

pub fn format_timestamp(ts: Option<Duration>) -> String {
    match ts {
        Some(value) => format!("{:.3}s", value.as_secs_f64()),
        None => "n/a".into(),
    }
}

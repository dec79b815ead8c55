use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use platewatch::gate::GateConfig;
use platewatch::pipeline::{ControllerConfig, Pipeline, PipelineEvent, command_channel};
use platewatch::source::mock::MockSource;
use platewatch_detect::{DetectorConfig, PlateDetector};
use platewatch_ocr::StubEngine;
use platewatch_types::{GrayImage, RecognitionResult};

/// Dark scene with a bright plate body carrying dark character bars, the
/// shape the contour detector is tuned for.
fn plate_frame() -> GrayImage {
    let width = 400u32;
    let height = 200u32;
    let mut data = vec![30u8; (width * height) as usize];
    let (px, py, pw, ph) = (80u32, 60u32, 220u32, 60u32);
    for y in py..py + ph {
        for x in px..px + pw {
            data[(y * width + x) as usize] = 225;
        }
    }
    let mut x = px + 10;
    while x + 12 < px + pw - 10 {
        for y in py + 10..py + ph - 10 {
            for bar_x in x..x + 12 {
                data[(y * width + bar_x) as usize] = 35;
            }
        }
        x += 14;
    }
    GrayImage::from_pixels(width, height, data).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn same_plate_across_frames_is_reported_once() {
    // paced so earlier recognition cycles finish between frames and later
    // frames clear the in-flight gate, forcing repeat reads of the same text
    let frames = vec![plate_frame(), plate_frame(), plate_frame(), plate_frame()];
    let source = Box::new(MockSource::from_frames(frames).paced(Duration::from_millis(25)));

    let detector = PlateDetector::new(DetectorConfig::default());
    let engine = Arc::new(StubEngine::with_script(vec![
        RecognitionResult::new("x7kcc77", 0.9);
        4
    ]));

    let config = ControllerConfig {
        gate: GateConfig {
            every_nth_frame: None,
            min_interval: None,
            single_flight: true,
        },
        ..ControllerConfig::default()
    };

    let (_handle, commands) = command_channel();
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let pipeline = Pipeline::new(detector, engine, config, None);
    let summary = pipeline
        .run(source, event_tx, commands)
        .await
        .expect("pipeline run");

    assert_eq!(summary.frames, 4);
    assert!(
        summary.submissions >= 2,
        "repeat reads must reach the session, got {} submissions",
        summary.submissions
    );
    assert_eq!(summary.plates.len(), 1, "duplicate reads collapse to one");
    assert!(summary.plates[0].sightings >= 2);

    let plate = &summary.plates[0];
    assert_eq!(plate.text, "X7KCC77");
    assert!((plate.confidence - 0.9).abs() < 1e-6);
    assert!(plate.region.x >= 60 && plate.region.x <= 110, "x={}", plate.region.x);
    assert!(plate.region.y >= 40 && plate.region.y <= 80, "y={}", plate.region.y);

    let mut detected = Vec::new();
    let mut finished = false;
    while let Ok(event) = event_rx.try_recv() {
        match event {
            PipelineEvent::PlateDetected { text, .. } => detected.push(text),
            PipelineEvent::Finished(_) => finished = true,
            PipelineEvent::RoiUpdated(_) => {}
        }
    }
    assert_eq!(detected, vec!["X7KCC77".to_string()]);
    assert!(finished);
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_without_plates_finishes_cleanly() {
    let frames = vec![
        GrayImage::from_pixels(400, 200, vec![20u8; 400 * 200]).unwrap(),
        GrayImage::from_pixels(400, 200, vec![22u8; 400 * 200]).unwrap(),
    ];
    let source = Box::new(MockSource::from_frames(frames));
    let detector = PlateDetector::new(DetectorConfig::default());
    let engine = Arc::new(StubEngine::new());

    let (_handle, commands) = command_channel();
    let (event_tx, _event_rx) = mpsc::channel(64);
    let pipeline = Pipeline::new(detector, engine, ControllerConfig::default(), None);
    let summary = pipeline
        .run(source, event_tx, commands)
        .await
        .expect("pipeline run");

    assert_eq!(summary.frames, 2);
    assert_eq!(summary.submissions, 0, "no regions means no submissions");
    assert!(summary.plates.is_empty());
}

use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use platewatch::cli::{CliArgs, OcrBinding};
use platewatch::gate::GateConfig;
use platewatch::overlay::FrameDump;
use platewatch::pipeline::{
    ControllerConfig, Pipeline, PipelineEvent, command_channel, format_timestamp,
};
use platewatch::settings::{EffectiveSettings, resolve_settings};
use platewatch::source::{SourceSpec, available_backends, open_source};
use platewatch_detect::{DetectorConfig, PlateDetector};
use platewatch_ocr::{HttpEngine, RecognitionEngine, StubEngine};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    pretty_env_logger::init();
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = CliArgs::parse();

    if cli.list_backends {
        print_available_backends();
        return Ok(());
    }

    let Some(source_arg) = cli.source.clone() else {
        return Err("no video source given; pass a device (device:N), file path, or stream URL".into());
    };
    let settings = resolve_settings(&cli)?;

    let spec = SourceSpec::from_str(&source_arg)?;
    let source = open_source(&spec, settings.backend, settings.channel_capacity)?;

    let engine = build_engine(&settings)?;
    // recognition must be possible before the loop starts
    engine.warm_up().await?;

    let detector = build_detector(&settings);
    let dump = match &settings.dump_dir {
        Some(dir) => Some(FrameDump::new(dir.clone(), settings.dump_format)?),
        None => None,
    };

    let config = ControllerConfig {
        gate: GateConfig {
            every_nth_frame: settings.every_nth_frame,
            min_interval: settings.min_interval,
            single_flight: settings.single_flight,
        },
        pre_enlarge_percent: settings.pre_enlarge_percent,
        skew_step_degrees: settings.skew_step_degrees,
        skew_limit_degrees: settings.skew_limit_degrees,
        sharpen_scale: settings.sharpen_scale,
        roi_preset: settings.roi,
    };

    let (handle, commands) = command_channel();
    let (event_tx, event_rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_events(event_rx));

    let stop_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop_handle.stop();
        }
    });

    let pipeline = Pipeline::new(detector, engine, config, dump);
    let summary = pipeline.run(source, event_tx, commands).await?;
    printer.await?;

    println!("=== Detection Summary ===");
    println!(
        "{} frames, {} submissions, {} unique plates",
        summary.frames,
        summary.submissions,
        summary.plates.len()
    );
    for plate in &summary.plates {
        println!(
            "  {} (conf {:.2}, {} sightings, first at {})",
            plate.text,
            plate.confidence,
            plate.sightings,
            format_timestamp(plate.timestamp)
        );
    }
    Ok(())
}

fn build_engine(settings: &EffectiveSettings) -> Result<Arc<dyn RecognitionEngine>, Box<dyn Error>> {
    match settings.ocr_binding {
        OcrBinding::Remote => Ok(Arc::new(HttpEngine::new(
            settings.ocr_url.clone(),
            settings.wire_format,
            settings.jpeg_quality,
        ))),
        OcrBinding::Stub => Ok(Arc::new(StubEngine::new())),
        #[cfg(feature = "binding-tesseract")]
        OcrBinding::Tesseract => Ok(Arc::new(platewatch_ocr::TesseractEngine::new(None, "eng")?)),
        #[cfg(not(feature = "binding-tesseract"))]
        OcrBinding::Tesseract => {
            Err("tesseract binding not compiled in; rebuild with --features binding-tesseract".into())
        }
    }
}

fn build_detector(settings: &EffectiveSettings) -> PlateDetector {
    let config = DetectorConfig {
        policy: settings.candidates,
        ..DetectorConfig::default()
    };
    match &settings.cascade {
        Some(path) => PlateDetector::with_artifact(config, path),
        None => {
            log::info!("no cascade artifact configured, using contour detection only");
            PlateDetector::new(config)
        }
    }
}

async fn print_events(mut events: mpsc::Receiver<PipelineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::RoiUpdated(rect) => {
                println!("roi set to {}x{}+{}+{}", rect.width, rect.height, rect.x, rect.y);
            }
            PipelineEvent::PlateDetected {
                text,
                confidence,
                region,
                frame_index,
            } => {
                let frame = frame_index
                    .map(|index| format!("frame {index}"))
                    .unwrap_or_else(|| "frame n/a".into());
                println!(
                    "plate {text} (conf {confidence:.2}) {frame} at {}x{}+{}+{}",
                    region.width, region.height, region.x, region.y
                );
            }
            PipelineEvent::Finished(_) => break,
        }
    }
}

fn print_available_backends() {
    let names: Vec<&'static str> = available_backends()
        .iter()
        .map(|backend| backend.as_str())
        .collect();
    if names.is_empty() {
        println!("available backends: (none compiled)");
    } else {
        println!("available backends: {}", names.join(", "));
    }
}

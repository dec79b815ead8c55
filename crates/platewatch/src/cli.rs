use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::overlay::DumpFormat;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OcrBinding {
    /// HTTP recognition endpoint.
    Remote,
    /// Offline stub that reads nothing.
    Stub,
    /// Embedded tesseract engine (requires the binding-tesseract feature).
    Tesseract,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CandidateMode {
    /// Only the strongest detector candidate per frame.
    SingleBest,
    /// Process every surviving candidate.
    All,
}

#[derive(Debug, Parser)]
#[command(
    name = "platewatch",
    about = "Detect and read vehicle license plates from a video stream",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Lock capture to a specific backend implementation
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Path to the cascade classifier artifact (JSON)
    #[arg(long = "cascade", value_name = "FILE")]
    pub cascade: Option<PathBuf>,

    /// Recognition binding
    #[arg(long = "ocr-binding", value_enum)]
    pub ocr_binding: Option<OcrBinding>,

    /// Recognition endpoint URL for the remote binding
    #[arg(long = "ocr-url", value_name = "URL")]
    pub ocr_url: Option<String>,

    /// Request body layout for the remote binding (octet-stream, json-base64)
    #[arg(long = "wire-format", value_name = "FORMAT")]
    pub wire_format: Option<String>,

    /// Frame-count gate: act only on every Nth frame
    #[arg(long = "every-nth-frame", value_parser = clap::value_parser!(u64).range(1..))]
    pub every_nth_frame: Option<u64>,

    /// Time-interval gate in milliseconds between submissions
    #[arg(long = "min-interval-ms")]
    pub min_interval_ms: Option<u64>,

    /// Disable the in-flight gate and allow overlapping recognition requests
    #[arg(long = "allow-overlap")]
    pub allow_overlap: bool,

    /// Candidate handling when the detector returns multiple regions
    #[arg(long = "candidates", value_enum)]
    pub candidates: Option<CandidateMode>,

    /// Pre-enlarge percentage applied to plate crops before recognition
    #[arg(long = "pre-enlarge-percent", value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub pre_enlarge_percent: Option<u32>,

    /// Output directory for annotated detection frames
    #[arg(long = "dump-dir")]
    pub dump_dir: Option<PathBuf>,

    /// Image format for dumped frames when --dump-dir is set
    #[arg(long = "dump-format", value_enum)]
    pub dump_format: Option<DumpFormat>,

    /// Fixed region of interest as x,y,width,height (headless runs)
    #[arg(long = "roi", value_name = "X,Y,W,H")]
    pub roi: Option<String>,

    /// Print the list of available capture backends
    #[arg(long = "list-backends")]
    pub list_backends: bool,

    /// Video source: device index (device:N), file path, or stream URL
    pub source: Option<String>,
}

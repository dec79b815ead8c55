//! Frame acquisition.
//!
//! A [`FrameSource`] turns a camera, file, or network stream into an async
//! stream of grayscale frames. Backends are feature-gated; the mock backend
//! is always compiled in test builds and is the default for offline runs.

#[cfg(feature = "backend-gstreamer")]
pub mod gstreamer;
#[cfg(any(feature = "backend-mock", test))]
pub mod mock;

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;

use futures_core::Stream;
use futures_util::stream::unfold;
use tokio::sync::mpsc::{self, Sender};

use platewatch_types::{FrameResult, GrayImage, SourceError};

pub type FrameStream = Pin<Box<dyn Stream<Item = FrameResult<GrayImage>> + Send>>;

pub type DynFrameSource = Box<dyn FrameSource>;

pub trait FrameSource: Send + 'static {
    fn total_frames(&self) -> Option<u64> {
        None
    }

    fn into_stream(self: Box<Self>) -> FrameStream;
}

/// Bridges a blocking capture loop into an async stream with bounded
/// buffering. The producer runs on the blocking pool and observes
/// backpressure through the channel.
pub fn spawn_stream_from_channel(
    capacity: usize,
    task: impl FnOnce(Sender<FrameResult<GrayImage>>) + Send + 'static,
) -> FrameStream {
    let (tx, rx) = mpsc::channel(capacity);
    tokio::task::spawn_blocking(move || task(tx));
    let stream = unfold(rx, |mut receiver| async {
        receiver.recv().await.map(|item| (item, receiver))
    });
    Box::pin(stream)
}

/// Parsed form of the positional source argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Capture device by index, written `device:N` or `/dev/videoN`.
    Device(u32),
    /// Local video file.
    File(PathBuf),
    /// Network stream (rtsp, http, https).
    Url(String),
}

impl FromStr for SourceSpec {
    type Err = SourceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SourceError::InvalidSpec {
                spec: raw.to_string(),
                reason: "empty source".into(),
            });
        }
        if let Some(index) = trimmed.strip_prefix("device:") {
            let index = index.parse::<u32>().map_err(|_| SourceError::InvalidSpec {
                spec: raw.to_string(),
                reason: "device index must be a non-negative integer".into(),
            })?;
            return Ok(SourceSpec::Device(index));
        }
        if let Some(index) = trimmed.strip_prefix("/dev/video") {
            if let Ok(index) = index.parse::<u32>() {
                return Ok(SourceSpec::Device(index));
            }
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("rtsp://") || lower.starts_with("http://") || lower.starts_with("https://")
        {
            return Ok(SourceSpec::Url(trimmed.to_string()));
        }
        Ok(SourceSpec::File(PathBuf::from(trimmed)))
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Device(index) => write!(f, "device:{index}"),
            SourceSpec::File(path) => write!(f, "{}", path.display()),
            SourceSpec::Url(url) => f.write_str(url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mock,
    Gstreamer,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Mock => "mock",
            Backend::Gstreamer => "gstreamer",
        }
    }
}

impl FromStr for Backend {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Backend::Mock),
            "gstreamer" => Ok(Backend::Gstreamer),
            other => Err(SourceError::InvalidSpec {
                spec: other.to_string(),
                reason: "unknown backend".into(),
            }),
        }
    }
}

pub fn available_backends() -> Vec<Backend> {
    let mut backends = Vec::new();
    #[cfg(feature = "backend-gstreamer")]
    backends.push(Backend::Gstreamer);
    #[cfg(feature = "backend-mock")]
    backends.push(Backend::Mock);
    backends
}

/// Opens the requested source on a backend. `backend_override` pins a
/// specific backend; otherwise the first compiled-in backend that can open
/// the source wins.
pub fn open_source(
    spec: &SourceSpec,
    backend_override: Option<Backend>,
    channel_capacity: usize,
) -> Result<DynFrameSource, SourceError> {
    let candidates = match backend_override {
        Some(backend) => vec![backend],
        None => available_backends(),
    };
    if candidates.is_empty() {
        return Err(SourceError::open_failure(
            spec.to_string(),
            "no capture backend compiled in; rebuild with a backend feature such as \"backend-gstreamer\"",
        ));
    }

    let mut last_err = None;
    for backend in candidates {
        match open_on_backend(backend, spec, channel_capacity) {
            Ok(source) => {
                log::info!("opened {spec} on {} backend", backend.as_str());
                return Ok(source);
            }
            Err(err) => {
                log::warn!("{} backend cannot serve {spec}: {err}", backend.as_str());
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| SourceError::open_failure(spec.to_string(), "no backend")))
}

fn open_on_backend(
    backend: Backend,
    spec: &SourceSpec,
    channel_capacity: usize,
) -> Result<DynFrameSource, SourceError> {
    match backend {
        #[cfg(feature = "backend-mock")]
        Backend::Mock => Ok(Box::new(mock::MockSource::for_spec(spec, channel_capacity))),
        #[cfg(not(feature = "backend-mock"))]
        Backend::Mock => Err(SourceError::unsupported("mock")),
        #[cfg(feature = "backend-gstreamer")]
        Backend::Gstreamer => Ok(Box::new(gstreamer::GStreamerSource::open(
            spec,
            channel_capacity,
        )?)),
        #[cfg(not(feature = "backend-gstreamer"))]
        Backend::Gstreamer => Err(SourceError::unsupported("gstreamer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_specs() {
        assert_eq!("device:2".parse::<SourceSpec>().unwrap(), SourceSpec::Device(2));
        assert_eq!(
            "/dev/video0".parse::<SourceSpec>().unwrap(),
            SourceSpec::Device(0)
        );
    }

    #[test]
    fn parses_urls_and_files() {
        assert!(matches!(
            "rtsp://cam.local/stream".parse::<SourceSpec>().unwrap(),
            SourceSpec::Url(_)
        ));
        assert!(matches!(
            "clips/entrance.mp4".parse::<SourceSpec>().unwrap(),
            SourceSpec::File(_)
        ));
    }

    #[test]
    fn rejects_bad_device_index() {
        assert!("device:abc".parse::<SourceSpec>().is_err());
        assert!("   ".parse::<SourceSpec>().is_err());
    }
}

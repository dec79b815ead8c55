#![cfg(feature = "backend-gstreamer")]

//! GStreamer capture backend for devices, files, and network streams.

use std::time::Duration;

use gstreamer as gst;
use gstreamer::ClockTime;
use gstreamer::MessageView;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tokio::sync::mpsc::Sender;

use crate::source::{FrameSource, FrameStream, SourceSpec, spawn_stream_from_channel};
use platewatch_types::{FrameResult, GrayImage, SourceError};

const BACKEND_NAME: &str = "gstreamer";

pub struct GStreamerSource {
    spec: SourceSpec,
    channel_capacity: usize,
}

impl GStreamerSource {
    pub fn open(spec: &SourceSpec, channel_capacity: usize) -> Result<Self, SourceError> {
        if let SourceSpec::File(path) = spec
            && !path.exists()
        {
            return Err(SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input file {} does not exist", path.display()),
            )));
        }
        Ok(Self {
            spec: spec.clone(),
            channel_capacity: channel_capacity.max(1),
        })
    }

    fn run(&self, tx: Sender<FrameResult<GrayImage>>) -> Result<(), SourceError> {
        gst::init().map_err(|err| backend_error(err.to_string()))?;
        let pipeline = gst::Pipeline::new();
        let convert = make_element("videoconvert")?;
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", &"I420")
            .build();
        let appsink = gst_app::AppSink::builder()
            .caps(&caps)
            .drop(true)
            .max_buffers(8)
            .sync(false)
            .build();

        match &self.spec {
            SourceSpec::Device(index) => {
                let src = make_element("v4l2src")?;
                src.set_property("device", format!("/dev/video{index}"));
                pipeline
                    .add_many([&src, &convert, appsink.upcast_ref::<gst::Element>()])
                    .map_err(|err| backend_error(err.to_string()))?;
                gst::Element::link_many([&src, &convert, appsink.upcast_ref::<gst::Element>()])
                    .map_err(|err| backend_error(err.to_string()))?;
            }
            SourceSpec::File(path) => {
                let src = make_element("filesrc")?;
                src.set_property("location", path.to_string_lossy().as_ref());
                let decodebin = make_element("decodebin")?;
                pipeline
                    .add_many([
                        &src,
                        &decodebin,
                        &convert,
                        appsink.upcast_ref::<gst::Element>(),
                    ])
                    .map_err(|err| backend_error(err.to_string()))?;
                gst::Element::link_many([&src, &decodebin])
                    .map_err(|err| backend_error(err.to_string()))?;
                convert
                    .link(appsink.upcast_ref::<gst::Element>())
                    .map_err(|err| backend_error(err.to_string()))?;
                link_on_pad_added(&decodebin, &convert);
            }
            SourceSpec::Url(url) => {
                let src = make_element("uridecodebin")?;
                src.set_property("uri", url.as_str());
                pipeline
                    .add_many([&src, &convert, appsink.upcast_ref::<gst::Element>()])
                    .map_err(|err| backend_error(err.to_string()))?;
                convert
                    .link(appsink.upcast_ref::<gst::Element>())
                    .map_err(|err| backend_error(err.to_string()))?;
                link_on_pad_added(&src, &convert);
            }
        }

        let result = (|| {
            pipeline
                .set_state(gst::State::Playing)
                .map_err(|err| backend_error(format!("failed to set pipeline state: {err:?}")))?;

            let bus = pipeline
                .bus()
                .ok_or_else(|| backend_error("pipeline missing bus"))?;
            let mut frame_index: u64 = 0;
            loop {
                match appsink.pull_sample() {
                    Ok(sample) => {
                        drain_bus_errors(&bus)?;
                        let frame = frame_from_sample(&sample)?
                            .with_frame_index(Some(frame_index));
                        frame_index = frame_index.saturating_add(1);
                        if tx.blocking_send(Ok(frame)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        drain_bus_errors(&bus)?;
                        if appsink.is_eos() {
                            break;
                        }
                        return Err(backend_error(err.to_string()));
                    }
                }
            }
            Ok(())
        })();

        pipeline
            .set_state(gst::State::Null)
            .map_err(|err| backend_error(format!("failed to stop pipeline: {err:?}")))?;
        result
    }
}

fn make_element(name: &'static str) -> Result<gst::Element, SourceError> {
    gst::ElementFactory::make(name)
        .build()
        .map_err(|err| backend_error(format!("failed to create {name} element: {err}")))
}

fn link_on_pad_added(element: &gst::Element, convert: &gst::Element) {
    let convert = convert.clone();
    element.connect_pad_added(move |_element, pad| {
        let Some(sink_pad) = convert.static_pad("sink") else {
            return;
        };
        if sink_pad.is_linked() {
            return;
        }
        let _ = pad.link(&sink_pad);
    });
}

impl FrameSource for GStreamerSource {
    fn into_stream(self: Box<Self>) -> FrameStream {
        let source = *self;
        let capacity = source.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| {
            if let Err(err) = source.run(tx.clone()) {
                let _ = tx.blocking_send(Err(err));
            }
        })
    }
}

fn drain_bus_errors(bus: &gst::Bus) -> Result<(), SourceError> {
    while let Some(msg) =
        bus.timed_pop_filtered(ClockTime::from_mseconds(0), &[gst::MessageType::Error])
    {
        if let MessageView::Error(err) = msg.view() {
            return Err(backend_error(err.error().to_string()));
        }
    }
    Ok(())
}

/// Extracts the Y plane of an I420 sample as a grayscale frame.
fn frame_from_sample(sample: &gst::Sample) -> Result<GrayImage, SourceError> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| backend_error("appsink sample missing buffer"))?;
    let caps = sample
        .caps()
        .ok_or_else(|| backend_error("appsink sample missing caps"))?;
    let info =
        gst_video::VideoInfo::from_caps(&caps).map_err(|err| backend_error(err.to_string()))?;
    let map = buffer
        .map_readable()
        .map_err(|err| backend_error(err.to_string()))?;
    let stride = info.stride()[0] as usize;
    let height = info.height() as usize;
    let width = info.width() as u32;
    let plane_size = stride * height;
    let data = map.as_slice();
    if data.len() < plane_size {
        return Err(backend_error(format!(
            "incomplete luma plane: have {} expected {}",
            data.len(),
            plane_size
        )));
    }
    let mut plane = Vec::with_capacity(plane_size);
    plane.extend_from_slice(&data[..plane_size]);
    let timestamp = buffer.pts().map(|ts| Duration::from_nanos(ts.nseconds()));
    GrayImage::from_owned(width, info.height() as u32, stride, timestamp, plane)
        .map_err(|err| backend_error(err.to_string()))
}

fn backend_error(message: impl Into<String>) -> SourceError {
    SourceError::backend_failure(BACKEND_NAME, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_returns_error() {
        let spec = SourceSpec::File("/tmp/nonexistent-clip.mp4".into());
        assert!(GStreamerSource::open(&spec, 8).is_err());
    }
}

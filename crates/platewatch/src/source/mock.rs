use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::Sender;

use crate::source::{FrameSource, FrameStream, SourceSpec, spawn_stream_from_channel};
use platewatch_types::{FrameResult, GrayImage};

/// Synthetic source producing a fixed number of flat frames. Serves any spec,
/// which makes it the offline stand-in when no capture backend is available.
pub struct MockSource {
    width: u32,
    height: u32,
    frame_count: usize,
    frame_interval: Duration,
    channel_capacity: usize,
    scripted: Option<Vec<GrayImage>>,
}

impl MockSource {
    pub fn for_spec(_spec: &SourceSpec, channel_capacity: usize) -> Self {
        Self {
            width: 640,
            height: 360,
            frame_count: 120,
            frame_interval: Duration::from_millis(4),
            channel_capacity: channel_capacity.max(1),
            scripted: None,
        }
    }

    /// Replays the given frames in order, stamping indices and timestamps.
    /// Used by pipeline tests to feed known imagery.
    pub fn from_frames(frames: Vec<GrayImage>) -> Self {
        Self {
            width: 0,
            height: 0,
            frame_count: frames.len(),
            frame_interval: Duration::ZERO,
            channel_capacity: 8,
            scripted: Some(frames),
        }
    }

    /// Spaces emitted frames by `interval`, approximating a live capture
    /// rate instead of draining the script back-to-back.
    pub fn paced(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    fn emit_frames(self, tx: Sender<FrameResult<GrayImage>>) {
        match self.scripted {
            Some(frames) => {
                for (index, frame) in frames.into_iter().enumerate() {
                    let frame = frame
                        .with_frame_index(Some(index as u64))
                        .with_timestamp(Some(Duration::from_millis((index * 33) as u64)));
                    if tx.blocking_send(Ok(frame)).is_err() {
                        break;
                    }
                    if !self.frame_interval.is_zero() {
                        thread::sleep(self.frame_interval);
                    }
                }
            }
            None => {
                for index in 0..self.frame_count {
                    if tx.is_closed() {
                        break;
                    }
                    let mut data = vec![0u8; (self.width * self.height) as usize];
                    for (row, chunk) in data.chunks_mut(self.width as usize).enumerate() {
                        chunk.fill(((row + index) % 256) as u8);
                    }
                    let frame = GrayImage::from_pixels(self.width, self.height, data)
                        .map(|frame| {
                            frame
                                .with_frame_index(Some(index as u64))
                                .with_timestamp(Some(Duration::from_millis((index * 33) as u64)))
                        })
                        .map_err(|err| {
                            platewatch_types::SourceError::backend_failure("mock", err.to_string())
                        });
                    if tx.blocking_send(frame).is_err() {
                        break;
                    }
                    if !self.frame_interval.is_zero() {
                        thread::sleep(self.frame_interval);
                    }
                }
            }
        }
    }
}

impl FrameSource for MockSource {
    fn total_frames(&self) -> Option<u64> {
        Some(self.frame_count as u64)
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let capacity = self.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| {
            self.emit_frames(tx);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test(flavor = "multi_thread")]
    async fn scripted_frames_keep_order_and_indices() {
        let frames = vec![
            GrayImage::from_pixels(4, 4, vec![1u8; 16]).unwrap(),
            GrayImage::from_pixels(4, 4, vec![2u8; 16]).unwrap(),
        ];
        let source = Box::new(MockSource::from_frames(frames));
        let mut stream = source.into_stream();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.frame_index(), Some(0));
        assert_eq!(first.data()[0], 1);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.frame_index(), Some(1));
        assert_eq!(second.data()[0], 2);
        assert!(stream.next().await.is_none());
    }
}

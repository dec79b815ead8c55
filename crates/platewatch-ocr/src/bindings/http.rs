//! Remote recognition over HTTP.
//!
//! The crop is JPEG-encoded and POSTed to a recognition endpoint that
//! replies with a JSON plate list. Any transport or decode failure is logged
//! and reported as an empty result: a recognizer outage degrades detection
//! quality, it must not stop the frame loop.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use serde_json::json;

use crate::engine::RecognitionEngine;
use crate::error::OcrError;
use crate::response::PlateListResponse;
use crate::text::clean_plate_text;
use platewatch_types::{GrayImage, RecognitionResult};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/recognize";
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// Request body layout expected by the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Raw JPEG bytes with `application/octet-stream`.
    #[default]
    OctetStream,
    /// `{"image": "<base64 jpeg>"}` JSON body.
    JsonBase64,
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "octet-stream" => Ok(Self::OctetStream),
            "json-base64" => Ok(Self::JsonBase64),
            other => Err(format!(
                "unknown wire format '{other}' (expected octet-stream or json-base64)"
            )),
        }
    }
}

pub struct HttpEngine {
    client: reqwest::Client,
    url: String,
    wire: WireFormat,
    jpeg_quality: u8,
}

impl HttpEngine {
    pub fn new(url: impl Into<String>, wire: WireFormat, jpeg_quality: u8) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            wire,
            jpeg_quality,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_ENDPOINT, WireFormat::default(), DEFAULT_JPEG_QUALITY)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn health_url(&self) -> Option<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.url).ok()?;
        url.set_path("/health");
        url.set_query(None);
        Some(url)
    }

    async fn post_crop(&self, jpeg: Vec<u8>) -> Result<PlateListResponse, OcrError> {
        let request = match self.wire {
            WireFormat::OctetStream => self
                .client
                .post(&self.url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(jpeg),
            WireFormat::JsonBase64 => self
                .client
                .post(&self.url)
                .json(&json!({ "image": BASE64.encode(&jpeg) })),
        };
        let response = request
            .send()
            .await
            .map_err(|err| OcrError::transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(OcrError::backend(format!(
                "endpoint returned HTTP {status}"
            )));
        }
        response
            .json::<PlateListResponse>()
            .await
            .map_err(|err| OcrError::backend(format!("malformed response: {err}")))
    }
}

#[async_trait]
impl RecognitionEngine for HttpEngine {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn warm_up(&self) -> Result<(), OcrError> {
        let Some(health) = self.health_url() else {
            return Err(OcrError::backend(format!(
                "invalid endpoint url '{}'",
                self.url
            )));
        };
        match self.client.get(health).send().await {
            Ok(response) if response.status().is_success() => {
                log::info!("recognition endpoint {} is reachable", self.url);
            }
            Ok(response) => {
                log::warn!(
                    "recognition endpoint health probe returned HTTP {}",
                    response.status()
                );
            }
            Err(err) => {
                // the endpoint may come up after the pipeline starts
                log::warn!("recognition endpoint not reachable yet: {err}");
            }
        }
        Ok(())
    }

    async fn recognize(&self, crop: &GrayImage) -> Result<RecognitionResult, OcrError> {
        if crop.is_empty() {
            return Ok(RecognitionResult::empty());
        }
        let jpeg = match encode_jpeg(crop, self.jpeg_quality) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("dropping crop, jpeg encode failed: {err}");
                return Ok(RecognitionResult::empty());
            }
        };
        match self.post_crop(jpeg).await {
            Ok(parsed) => {
                let Some(candidate) = parsed.plates.into_iter().next() else {
                    return Ok(RecognitionResult::empty());
                };
                let text = clean_plate_text(&candidate.text);
                if text.is_empty() {
                    return Ok(RecognitionResult::empty());
                }
                Ok(RecognitionResult::new(text, candidate.confidence))
            }
            Err(err) => {
                log::warn!("recognition request failed: {err}");
                Ok(RecognitionResult::empty())
            }
        }
    }
}

fn encode_jpeg(crop: &GrayImage, quality: u8) -> Result<Vec<u8>, OcrError> {
    let packed = crop.to_packed_vec();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(&packed, crop.width(), crop.height(), image::ColorType::L8)
        .map_err(|err| OcrError::encode(err.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_valid_jpeg() {
        let crop = GrayImage::from_pixels(32, 16, vec![128u8; 32 * 16]).unwrap();
        let jpeg = encode_jpeg(&crop, DEFAULT_JPEG_QUALITY).unwrap();
        assert!(jpeg.starts_with(&[0xFF, 0xD8]), "missing jpeg magic");
    }

    #[test]
    fn wire_format_parses_from_cli_strings() {
        assert_eq!(
            "octet-stream".parse::<WireFormat>().unwrap(),
            WireFormat::OctetStream
        );
        assert_eq!(
            "json-base64".parse::<WireFormat>().unwrap(),
            WireFormat::JsonBase64
        );
        assert!("msgpack".parse::<WireFormat>().is_err());
    }

    #[test]
    fn health_url_replaces_the_path() {
        let engine = HttpEngine::with_defaults();
        let health = engine.health_url().unwrap();
        assert_eq!(health.as_str(), "http://127.0.0.1:5000/health");
    }

    #[tokio::test]
    async fn empty_crop_short_circuits() {
        let engine = HttpEngine::with_defaults();
        let result = engine.recognize(&GrayImage::empty()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_empty() {
        // nothing listens on this port
        let engine = HttpEngine::new(
            "http://127.0.0.1:1/recognize",
            WireFormat::OctetStream,
            DEFAULT_JPEG_QUALITY,
        );
        let crop = GrayImage::from_pixels(32, 16, vec![128u8; 32 * 16]).unwrap();
        let result = engine.recognize(&crop).await.unwrap();
        assert!(result.is_empty());
    }
}

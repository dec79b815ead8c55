//! Embedded recognition through the tesseract runtime.
//!
//! Unlike the remote binding, initialization failure here is fatal: if the
//! language data cannot be loaded there is nothing to degrade to, so
//! `warm_up` reports the error and the caller aborts startup.

use std::sync::Mutex;

use async_trait::async_trait;
use image::codecs::png::PngEncoder;
use image::ImageEncoder;
use leptess::LepTess;

use crate::engine::RecognitionEngine;
use crate::error::OcrError;
use crate::text::clean_plate_text;
use platewatch_types::{GrayImage, RecognitionResult};

pub struct TesseractEngine {
    inner: Mutex<LepTess>,
}

impl TesseractEngine {
    /// `datapath` of `None` uses the system tessdata location.
    pub fn new(datapath: Option<&str>, lang: &str) -> Result<Self, OcrError> {
        let mut tess = LepTess::new(datapath, lang)
            .map_err(|err| OcrError::backend(format!("tesseract init failed: {err}")))?;
        // plates are a single text line
        tess.set_variable(leptess::Variable::TesseditPagesegMode, "7")
            .map_err(|err| OcrError::backend(err.to_string()))?;
        Ok(Self {
            inner: Mutex::new(tess),
        })
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn recognize(&self, crop: &GrayImage) -> Result<RecognitionResult, OcrError> {
        if crop.is_empty() {
            return Ok(RecognitionResult::empty());
        }
        let png = encode_png(crop)?;
        let mut tess = self
            .inner
            .lock()
            .map_err(|_| OcrError::backend("tesseract state poisoned"))?;
        tess.set_image_from_mem(&png)
            .map_err(|err| OcrError::backend(err.to_string()))?;
        let raw = tess
            .get_utf8_text()
            .map_err(|err| OcrError::backend(err.to_string()))?;
        let confidence = tess.mean_text_conf().clamp(0, 100) as f32 / 100.0;
        let text = clean_plate_text(&raw);
        if text.is_empty() {
            return Ok(RecognitionResult::empty());
        }
        Ok(RecognitionResult::new(text, confidence))
    }
}

fn encode_png(crop: &GrayImage) -> Result<Vec<u8>, OcrError> {
    let packed = crop.to_packed_vec();
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(&packed, crop.width(), crop.height(), image::ColorType::L8)
        .map_err(|err| OcrError::encode(err.to_string()))?;
    Ok(out)
}

//! Frame annotation and dumping.
//!
//! Detected plates are drawn back onto a copy of the frame (bounding box
//! plus a text label in a 5x7 pixel font) and optionally written to disk as
//! JPEG or PNG for inspection.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::ImageEncoder;

use platewatch_types::{GrayImage, Region};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, ValueEnum)]
pub enum DumpFormat {
    #[default]
    Jpeg,
    Png,
}

impl DumpFormat {
    fn extension(&self) -> &'static str {
        match self {
            DumpFormat::Jpeg => "jpg",
            DumpFormat::Png => "png",
        }
    }
}

/// Packed grayscale copy of the frame with the plate outlined and labeled.
pub fn annotate(frame: &GrayImage, region: Region, text: &str) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let mut canvas = frame.to_packed_vec();
    if let Some(rect) = region.clamp_to(frame.width(), frame.height()) {
        draw_rect(&mut canvas, width, height, rect);
        // label above the box when there is room, inside it otherwise
        let label_y = rect.y.saturating_sub(10);
        draw_text(&mut canvas, width, height, rect.x as usize, label_y as usize, text);
    }
    canvas
}

pub struct FrameDump {
    dir: PathBuf,
    format: DumpFormat,
}

impl FrameDump {
    pub fn new(dir: impl Into<PathBuf>, format: DumpFormat) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, format })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the annotated frame; the file name carries the frame index and
    /// plate text.
    pub fn write(
        &self,
        frame: &GrayImage,
        region: Region,
        text: &str,
    ) -> std::io::Result<PathBuf> {
        let canvas = annotate(frame, region, text);
        let index = frame.frame_index().unwrap_or(0);
        let path = self
            .dir
            .join(format!("frame_{index:06}_{text}.{}", self.format.extension()));
        let mut bytes = Vec::new();
        let encode_result = match self.format {
            DumpFormat::Jpeg => JpegEncoder::new_with_quality(&mut bytes, 90).encode(
                &canvas,
                frame.width(),
                frame.height(),
                image::ColorType::L8,
            ),
            DumpFormat::Png => PngEncoder::new(&mut bytes).write_image(
                &canvas,
                frame.width(),
                frame.height(),
                image::ColorType::L8,
            ),
        };
        encode_result.map_err(|err| std::io::Error::other(err.to_string()))?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

const OUTLINE: u8 = 255;
const OUTLINE_THICKNESS: usize = 2;

fn draw_rect(canvas: &mut [u8], width: usize, height: usize, rect: Region) {
    let x0 = rect.x as usize;
    let y0 = rect.y as usize;
    let x1 = (rect.x + rect.width) as usize;
    let y1 = (rect.y + rect.height) as usize;
    for t in 0..OUTLINE_THICKNESS {
        for x in x0..x1.min(width) {
            set_pixel(canvas, width, height, x, y0 + t);
            set_pixel(canvas, width, height, x, y1.saturating_sub(1 + t));
        }
        for y in y0..y1.min(height) {
            set_pixel(canvas, width, height, x0 + t, y);
            set_pixel(canvas, width, height, x1.saturating_sub(1 + t), y);
        }
    }
}

fn set_pixel(canvas: &mut [u8], width: usize, height: usize, x: usize, y: usize) {
    if x < width && y < height {
        canvas[y * width + x] = OUTLINE;
    }
}

fn draw_text(canvas: &mut [u8], width: usize, height: usize, x: usize, y: usize, text: &str) {
    let mut cursor = x;
    for ch in text.chars() {
        let Some(glyph) = glyph_columns(ch) else {
            cursor += 6;
            continue;
        };
        for (col, bits) in glyph.iter().enumerate() {
            for row in 0..7 {
                if bits & (1 << row) != 0 {
                    set_pixel(canvas, width, height, cursor + col, y + row);
                }
            }
        }
        cursor += 6;
    }
}

/// Column-major 5x7 glyphs, bit 0 at the top.
fn glyph_columns(ch: char) -> Option<[u8; 5]> {
    let glyph = match ch.to_ascii_uppercase() {
        '0' => [0x3E, 0x51, 0x49, 0x45, 0x3E],
        '1' => [0x00, 0x42, 0x7F, 0x40, 0x00],
        '2' => [0x42, 0x61, 0x51, 0x49, 0x46],
        '3' => [0x21, 0x41, 0x45, 0x4B, 0x31],
        '4' => [0x18, 0x14, 0x12, 0x7F, 0x10],
        '5' => [0x27, 0x45, 0x45, 0x45, 0x39],
        '6' => [0x3C, 0x4A, 0x49, 0x49, 0x30],
        '7' => [0x01, 0x71, 0x09, 0x05, 0x03],
        '8' => [0x36, 0x49, 0x49, 0x49, 0x36],
        '9' => [0x06, 0x49, 0x49, 0x29, 0x1E],
        'A' => [0x7E, 0x11, 0x11, 0x11, 0x7E],
        'B' => [0x7F, 0x49, 0x49, 0x49, 0x36],
        'C' => [0x3E, 0x41, 0x41, 0x41, 0x22],
        'D' => [0x7F, 0x41, 0x41, 0x22, 0x1C],
        'E' => [0x7F, 0x49, 0x49, 0x49, 0x41],
        'F' => [0x7F, 0x09, 0x09, 0x09, 0x01],
        'G' => [0x3E, 0x41, 0x49, 0x49, 0x7A],
        'H' => [0x7F, 0x08, 0x08, 0x08, 0x7F],
        'I' => [0x00, 0x41, 0x7F, 0x41, 0x00],
        'J' => [0x20, 0x40, 0x41, 0x3F, 0x01],
        'K' => [0x7F, 0x08, 0x14, 0x22, 0x41],
        'L' => [0x7F, 0x40, 0x40, 0x40, 0x40],
        'M' => [0x7F, 0x02, 0x0C, 0x02, 0x7F],
        'N' => [0x7F, 0x04, 0x08, 0x10, 0x7F],
        'O' => [0x3E, 0x41, 0x41, 0x41, 0x3E],
        'P' => [0x7F, 0x09, 0x09, 0x09, 0x06],
        'Q' => [0x3E, 0x41, 0x51, 0x21, 0x5E],
        'R' => [0x7F, 0x09, 0x19, 0x29, 0x46],
        'S' => [0x46, 0x49, 0x49, 0x49, 0x31],
        'T' => [0x01, 0x01, 0x7F, 0x01, 0x01],
        'U' => [0x3F, 0x40, 0x40, 0x40, 0x3F],
        'V' => [0x1F, 0x20, 0x40, 0x20, 0x1F],
        'W' => [0x3F, 0x40, 0x38, 0x40, 0x3F],
        'X' => [0x63, 0x14, 0x08, 0x14, 0x63],
        'Y' => [0x07, 0x08, 0x70, 0x08, 0x07],
        'Z' => [0x61, 0x51, 0x49, 0x45, 0x43],
        _ => return None,
    };
    Some(glyph)
}

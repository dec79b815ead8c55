//! Recognition bindings for the platewatch workspace.
//!
//! Every binding implements [`RecognitionEngine`]: the pipeline hands it a
//! normalized plate crop and gets back cleaned text with a confidence, or an
//! empty result when nothing was read. Transport-level failures on the remote
//! binding degrade to empty results so a flaky recognizer never stalls the
//! frame loop.

mod bindings;
mod engine;
mod error;
mod response;
mod text;

pub use bindings::http::{DEFAULT_ENDPOINT, DEFAULT_JPEG_QUALITY, HttpEngine, WireFormat};
pub use bindings::stub::StubEngine;
#[cfg(feature = "binding-tesseract")]
pub use bindings::tesseract::TesseractEngine;
pub use engine::RecognitionEngine;
pub use error::OcrError;
pub use response::{PlateCandidate, PlateListResponse};
pub use text::clean_plate_text;

pub mod http;
pub mod stub;
#[cfg(feature = "binding-tesseract")]
pub mod tesseract;

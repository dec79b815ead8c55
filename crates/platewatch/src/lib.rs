//! License plate detection and recognition over a video stream.
//!
//! The binary wires these pieces together: a frame [`source`], the
//! [`pipeline`] controller, ROI selection state, submission gating, and the
//! per-run detection [`session`].

pub mod cli;
pub mod gate;
pub mod overlay;
pub mod pipeline;
pub mod roi;
pub mod session;
pub mod settings;
pub mod source;

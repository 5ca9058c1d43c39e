//! Damson Processing Library
//!
//! Derivative strategies for the asset pipeline: per-mime-family algorithms
//! that turn an original upload into thumbnails, extracted text, and probed
//! media metadata. Strategies are failure-isolated: a sub-step failure is
//! recorded into the output's error map and never aborts the processing job.

pub mod output;
pub mod strategy;
#[cfg(feature = "image")]
pub mod thumbnail;

#[cfg(feature = "image")]
pub mod image;
#[cfg(feature = "pdf")]
pub mod pdf;
#[cfg(feature = "video")]
pub mod video;

pub use output::{
    DerivativeOutput, PROBE_ERROR_KEY, PROCESSING_NOTE_KEY, TEXT_ERROR_KEY, THUMBNAIL_ERROR_KEY,
};
pub use strategy::{DerivativeStrategy, StrategyContext, StrategySet};

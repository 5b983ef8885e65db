//! Analysis module for Newsreel
//!
//! Provides alignment normalization between the row and columnar timing
//! formats, playback timelines over normalized alignment, and the FFT
//! frequency analyser behind every visualizer.

pub mod alignment;
mod spectrum;
mod timeline;

pub use alignment::{
    denormalize, normalize, normalize_columns, normalize_rows, validate, AlignmentRow,
    NormalizedAlignment, RawAlignment,
};
pub use spectrum::{FrequencyAnalyser, SpectrumError, DEFAULT_FFT_SIZE};
pub use timeline::{AlignmentTimeline, WordSpan};

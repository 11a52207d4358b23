//! song-styler Rust core library
//!
//! Turns a free-text prompt into two comma-joined music style strings
//! (include / exclude) by ranking a fixed descriptor vocabulary against a
//! sentence embedding of the prompt, and extracts scrubbable amplitude
//! envelopes from audio files for waveform display.

use thiserror::Error;

pub mod assembler;
pub mod audio;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod ranker;
pub mod styler;
pub mod threshold;
pub mod waveform;

pub use assembler::{assemble, joined_len};
pub use audio::{decode_audio, expand_audio_files, read_audio_file, DecodedAudio, SUPPORTED_EXTS};
pub use backend::{DummyBackend, EmbeddingBackend};
#[cfg(feature = "tract")]
pub use backend::TractBackend;
pub use catalog::{Catalog, DescriptorRecord, GroupKind, StackedEmbeddings, TagKind, VoiceType};
pub use config::StylerConfig;
pub use ranker::{rank, RankedEntry};
pub use styler::{char_counter, ScoredDescriptor, SongStyles, Styler};
pub use threshold::{select, Selection, Thresholds};
pub use waveform::{frequency_frame, render_ascii, time_domain_frame, AmplitudeEnvelope};

#[derive(Debug, Error)]
pub enum StylerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Descriptor catalog is empty")]
    EmptyCatalog,
    #[error("Invalid argument: {0}")]
    Invalid(String),
    #[error("Audio decode failed: {0}")]
    Decode(String),
    #[error("Other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StylerError>;

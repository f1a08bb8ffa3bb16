//! mediaops - Deduplicated, progress-tracked media operations
//!
//! Splits media files by chapters or fixed-length segments on background
//! tasks, shelling out to ffmpeg and ffprobe. Identical in-flight requests
//! share a single operation, and callers poll progress by operation id.

pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod operations;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

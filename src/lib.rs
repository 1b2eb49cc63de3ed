//! ffsqueeze - compress a video to a target file size.
//!
//! The engine drives FFmpeg through two-pass bitrate-controlled encodes,
//! probing hardware encoder availability at runtime with real trial encodes
//! and streaming progress events to whatever frontend hosts it.

pub mod config;
pub mod engine;

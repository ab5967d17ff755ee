pub mod analyzer;
pub mod config;
pub mod document;
pub mod notes;
pub mod pipeline;
pub mod render;
pub mod solfege;
pub mod summary;

/// Audio file extensions picked up when walking directories
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    // Native (hound, claxon)
    "wav", "flac",
    // ffmpeg fallback
    "mp3", "ogg", "m4a", "aac", "opus", "aif", "aiff",
];

/// Application name for XDG paths
pub const APP_NAME: &str = "lashir";

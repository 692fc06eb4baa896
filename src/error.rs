//! Error types for the `scenecut` crate.
//!
//! [`ScenecutError`] is the single `Err` type returned by every fallible
//! operation in the crate. Variants carry enough context to diagnose the
//! problem without needing to inspect logs.

use std::io::Error as IoError;
use std::path::PathBuf;

use thiserror::Error;

/// The unified error type for all `scenecut` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScenecutError {
    /// A stats CSV file could not be parsed (bad header, wrong column count, ...).
    #[error("Stats file is corrupt or malformed")]
    StatsFileCorrupt,

    /// The framerate recorded in a stats CSV file does not match the base
    /// timecode's framerate within tolerance.
    #[error(
        "Stats file framerate ({stats_file_fps}) does not match expected framerate \
         ({base_timecode_fps})"
    )]
    StatsFileFramerateMismatch {
        /// Framerate recorded in the stats file.
        stats_file_fps: f64,
        /// Framerate of the `base_timecode` passed to `load_from_csv`.
        base_timecode_fps: f64,
    },

    /// One or more video files could not be opened.
    #[error("Failed to open video file(s): {0:?}")]
    VideoOpenFailure(Vec<PathBuf>),

    /// A video's framerate could not be determined.
    #[error("Could not determine framerate for video file: {0:?}")]
    VideoFramerateUnavailable(PathBuf),

    /// Multiple input videos disagree on a stream parameter (resolution, fps, ...).
    #[error("Video parameter mismatch: {0:?}")]
    VideoParameterMismatch(Vec<(String, String, String, PathBuf)>),

    /// Attempted to register a metric name that is already registered.
    ///
    /// Non-fatal: callers are expected to swallow this when adding a second
    /// detector that happens to produce the same metric name.
    #[error("Metric already registered: {0}")]
    MetricAlreadyRegistered(String),

    /// A metric was read before being registered with the `StatsManager`.
    #[error("Metric not registered: {0}")]
    FrameMetricNotRegistered(String),

    /// A metric value was requested for a frame where it has not been set.
    #[error("No value for metric {metric:?} at frame {frame_index}")]
    FrameMetricMissing {
        /// The frame index that was queried.
        frame_index: usize,
        /// The metric name that was queried.
        metric: String,
    },

    /// Two `FrameTimecode`s with different framerates were combined or compared.
    #[error("Framerate mismatch: {lhs_fps} != {rhs_fps}")]
    FramerateMismatch {
        /// Framerate of the left-hand-side timecode.
        lhs_fps: f64,
        /// Framerate of the right-hand-side timecode.
        rhs_fps: f64,
    },

    /// An argument passed to a public API was invalid.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// `frame_skip` was nonzero while a `StatsManager` was attached to the `SceneManager`.
    #[error("frame_skip must be 0 when using a StatsManager")]
    FrameSkipWithStatsManager,

    /// `duration` and `end_time` were both specified to `detect_scenes`.
    #[error("duration and end_time cannot both be set")]
    DurationAndEndTimeBothSet,

    /// A detector requires a `StatsManager` but none is attached.
    #[error("Detector {0:?} requires a StatsManager but none was provided")]
    StatsManagerRequired(String),

    /// An I/O error occurred while reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `csv` crate while reading or writing a stats file.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An error from the `image` crate while resizing or encoding a frame.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Convenience alias for `Result<T, ScenecutError>`.
pub type Result<T> = std::result::Result<T, ScenecutError>;

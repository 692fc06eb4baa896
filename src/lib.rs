//! Detects scene boundaries in a decoded video frame sequence.
//!
//! The entry point is [`SceneManager::detect_scenes`], which pulls frames
//! from a [`FrameSource`], dispatches them to one or more detectors, and
//! produces a final scene list. [`ContentDetector`] is the dominant detector
//! implementation, driven by per-channel HSV deltas; [`StatsManager`] lets
//! detector output be cached to disk and reused across runs.
//!
//! ```no_run
//! use scenecut::{ContentDetector, SceneManager};
//! # use scenecut::frame_source::FrameSource;
//! # fn run(mut source: impl FrameSource) -> scenecut::Result<()> {
//! let mut manager = SceneManager::default();
//! manager.add_detector(Box::new(ContentDetector::new(27.0, 15)));
//! manager.detect_scenes(&mut source, None, None, 0, false, None)?;
//! for (start, end) in manager.get_scene_list() {
//!     println!("{start} -> {end}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod detector;
pub mod error;
pub mod frame_source;
pub mod save_images;
pub mod scene_manager;
pub mod stats_manager;
pub mod timecode;

#[cfg(feature = "devel")]
pub mod logging;

#[cfg(feature = "y4m-source")]
pub mod y4m_source;

#[cfg(feature = "ffmpeg-source")]
pub mod ffmpeg_source;

pub use detector::{ContentDetector, ContentDetectorWeights, SceneDetector, SparseSceneDetector};
pub use error::{Result, ScenecutError};
pub use frame_source::{Frame, FrameSource, InMemoryFrameSource};
pub use save_images::{save_images, ImageResize, SaveImagesOptions};
pub use scene_manager::{compute_downscale_factor, scenes_from_cuts, SceneManager, DEFAULT_MIN_WIDTH};
pub use stats_manager::{FrameMetricKey, StatsManager};
pub use timecode::{FrameTimecode, FPS_TOLERANCE};

#[cfg(feature = "y4m-source")]
pub use y4m_source::Y4mFrameSource;

#[cfg(feature = "ffmpeg-source")]
pub use ffmpeg_source::FfmpegFrameSource;

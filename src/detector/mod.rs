//! `SceneDetector`/`SparseSceneDetector`: the per-frame detector contract.
//!
//! Modeled as two distinct traits rather than one tagged-union trait, since
//! that matches the distilled spec's partitioned cut/event lists (see
//! SPEC_FULL.md §9) and lets [`crate::scene_manager::SceneManager`] keep
//! dense and sparse detectors in separate `Vec`s without any downcasting.
//!
//! A detector never holds its own reference to a [`StatsManager`]; the
//! manager is threaded through every call explicitly, which avoids the
//! aliasing problems of a stored back-pointer.

pub mod content;

pub use content::{ContentDetector, ContentDetectorWeights};

use crate::error::Result;
use crate::frame_source::Frame;
use crate::stats_manager::StatsManager;

/// A detector that emits individual cut points (scene boundaries).
pub trait SceneDetector {
    /// Process one frame, returning any cuts detected at or before
    /// `frame_index`.
    ///
    /// `frame` is `None` when the main loop only grabbed rather than decoded
    /// this frame index (every active detector already had its metrics
    /// cached). If a `StatsManager` is given and already has every metric in
    /// [`Self::get_metrics`] for `frame_index`, implementations should
    /// prefer the cached values over recomputing from `frame`; this is the
    /// only path available when `frame` is `None`.
    fn process_frame(
        &mut self,
        frame_index: usize,
        frame: Option<&Frame>,
        stats: Option<&mut StatsManager>,
    ) -> Result<Vec<usize>>;

    /// Called once after the main loop exits, to flush any cuts that can
    /// only be determined once the full frame range is known.
    fn post_process(
        &mut self,
        start_frame: usize,
        end_frame: usize,
        stats: Option<&mut StatsManager>,
    ) -> Result<Vec<usize>>;

    /// The metric names this detector reads/writes in a `StatsManager`.
    fn get_metrics(&self) -> Vec<&'static str>;

    /// Whether `add_detector` should allocate a `StatsManager` if the
    /// `SceneManager` does not already have one.
    fn stats_manager_required(&self) -> bool;

    /// Whether `frame_index` still needs to be decoded and processed, or
    /// whether every metric this detector needs is already cached.
    fn is_processing_required(&self, frame_index: usize, stats: Option<&StatsManager>) -> bool;
}

/// A detector that emits event ranges (e.g. motion, fades) rather than
/// individual cut points.
pub trait SparseSceneDetector {
    /// Process one frame, returning any `(start_frame, end_frame)` event
    /// ranges that concluded at or before `frame_index`.
    ///
    /// `frame` is `None` when the main loop only grabbed rather than decoded
    /// this frame index; see [`SceneDetector::process_frame`] for the cache
    /// implications.
    fn process_frame(
        &mut self,
        frame_index: usize,
        frame: Option<&Frame>,
        stats: Option<&mut StatsManager>,
    ) -> Result<Vec<(usize, usize)>>;

    /// Called once after the main loop exits, to flush any event still open
    /// at the end of the stream.
    fn post_process(
        &mut self,
        start_frame: usize,
        end_frame: usize,
        stats: Option<&mut StatsManager>,
    ) -> Result<Vec<(usize, usize)>>;

    /// The metric names this detector reads/writes in a `StatsManager`.
    fn get_metrics(&self) -> Vec<&'static str>;

    /// Whether `add_detector` should allocate a `StatsManager` if the
    /// `SceneManager` does not already have one.
    fn stats_manager_required(&self) -> bool;

    /// Whether `frame_index` still needs to be decoded and processed, or
    /// whether every metric this detector needs is already cached.
    fn is_processing_required(&self, frame_index: usize, stats: Option<&StatsManager>) -> bool;
}

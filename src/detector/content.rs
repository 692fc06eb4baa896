//! `ContentDetector`: the dominant, dense scene detector.
//!
//! Computes a per-frame perceptual-distance scalar from HSV channel means
//! plus an optional edge-change term, and emits a cut whenever that scalar
//! crosses a threshold at least `min_scene_len` frames after the last cut.

use std::collections::HashMap;

use super::SceneDetector;
use crate::error::{Result, ScenecutError};
use crate::frame_source::Frame;
use crate::stats_manager::StatsManager;

const METRIC_CONTENT_VAL: &str = "content_val";
const METRIC_DELTA_HUE: &str = "delta_hue";
const METRIC_DELTA_SAT: &str = "delta_sat";
const METRIC_DELTA_LUM: &str = "delta_lum";
const METRIC_DELTA_EDGES: &str = "delta_edges";

/// A fixed gradient-magnitude threshold above which a pixel is considered
/// an edge, standing in for the original's Canny low/high threshold pair.
const EDGE_MAGNITUDE_THRESHOLD: i32 = 60;

/// Relative weight of each channel's contribution to `content_val`.
///
/// Defaults give equal weight to the three HSV deltas and zero weight to
/// the edge-change term, which reproduces SPEC_FULL.md §4.4's
/// `(delta_hue + delta_sat + delta_val) / 3` formula when edge detection is
/// disabled.
#[derive(Debug, Clone, Copy)]
pub struct ContentDetectorWeights {
    /// Weight of the hue-channel delta.
    pub delta_hue: f64,
    /// Weight of the saturation-channel delta.
    pub delta_sat: f64,
    /// Weight of the value/luma-channel delta.
    pub delta_lum: f64,
    /// Weight of the edge-change term. Ignored unless edge detection is
    /// enabled.
    pub delta_edges: f64,
}

impl Default for ContentDetectorWeights {
    fn default() -> Self {
        Self { delta_hue: 1.0, delta_sat: 1.0, delta_lum: 1.0, delta_edges: 0.0 }
    }
}

#[derive(Debug, Clone)]
struct PreviousFrameState {
    hue_mean: f64,
    sat_mean: f64,
    val_mean: f64,
    edge_map: Option<Vec<bool>>,
}

/// Per-frame HSV-delta + optional edge-change scene-cut detector.
pub struct ContentDetector {
    threshold: f64,
    min_scene_len: usize,
    weights: ContentDetectorWeights,
    detect_edges: bool,
    last_frame: Option<PreviousFrameState>,
    last_cut_frame: Option<usize>,
    pending_deltas: Vec<(String, f64)>,
}

impl ContentDetector {
    /// Create a detector with the given cut threshold and minimum scene
    /// length (in frames), edge detection disabled.
    pub fn new(threshold: f64, min_scene_len: usize) -> Self {
        Self {
            threshold,
            min_scene_len,
            weights: ContentDetectorWeights::default(),
            detect_edges: false,
            last_frame: None,
            last_cut_frame: None,
            pending_deltas: Vec::new(),
        }
    }

    /// Enable the edge-change term with the given weight.
    pub fn with_edge_detection(mut self, weight: f64) -> Self {
        self.detect_edges = true;
        self.weights.delta_edges = weight;
        self
    }

    /// Override the default per-channel weights.
    pub fn with_weights(mut self, weights: ContentDetectorWeights) -> Self {
        self.weights = weights;
        self
    }

    fn compute_hsv_means(frame: &Frame) -> (f64, f64, f64) {
        let pixel_count = frame.width * frame.height;
        if pixel_count == 0 {
            return (0.0, 0.0, 0.0);
        }
        let (mut hue_sum, mut sat_sum, mut val_sum) = (0.0f64, 0.0f64, 0.0f64);
        for chunk in frame.data.chunks_exact(3) {
            let (b, g, r) = (chunk[0] as f64, chunk[1] as f64, chunk[2] as f64);
            let (h, s, v) = bgr_to_hsv(b, g, r);
            hue_sum += h;
            sat_sum += s;
            val_sum += v;
        }
        let n = pixel_count as f64;
        (hue_sum / n, sat_sum / n, val_sum / n)
    }

    fn compute_edge_map(frame: &Frame) -> Vec<bool> {
        let (w, h) = (frame.width, frame.height);
        let mut value_plane = vec![0i32; w * h];
        for (i, chunk) in frame.data.chunks_exact(3).enumerate() {
            let (b, g, r) = (chunk[0] as f64, chunk[1] as f64, chunk[2] as f64);
            let (_, _, v) = bgr_to_hsv(b, g, r);
            value_plane[i] = v as i32;
        }
        let mut edges = vec![false; w * h];
        if w < 3 || h < 3 {
            return edges;
        }
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let idx = |xx: usize, yy: usize| value_plane[yy * w + xx];
                let gx = (idx(x + 1, y - 1) + 2 * idx(x + 1, y) + idx(x + 1, y + 1))
                    - (idx(x - 1, y - 1) + 2 * idx(x - 1, y) + idx(x - 1, y + 1));
                let gy = (idx(x - 1, y + 1) + 2 * idx(x, y + 1) + idx(x + 1, y + 1))
                    - (idx(x - 1, y - 1) + 2 * idx(x, y - 1) + idx(x + 1, y - 1));
                let magnitude = ((gx * gx + gy * gy) as f64).sqrt() as i32;
                edges[y * w + x] = magnitude > EDGE_MAGNITUDE_THRESHOLD;
            }
        }
        edges
    }

    fn edge_change_fraction(prev: &[bool], current: &[bool]) -> f64 {
        if prev.is_empty() || prev.len() != current.len() {
            return 0.0;
        }
        let changed = prev.iter().zip(current.iter()).filter(|(a, b)| a != b).count();
        changed as f64 / prev.len() as f64
    }
}

impl SceneDetector for ContentDetector {
    fn process_frame(
        &mut self,
        frame_index: usize,
        frame: Option<&Frame>,
        stats: Option<&mut StatsManager>,
    ) -> Result<Vec<usize>> {
        let metrics = self.get_metrics();

        let content_val = match (frame, stats) {
            (_, Some(stats)) if stats.metrics_exist(frame_index, &metrics) => {
                stats.get_metrics(frame_index, &[METRIC_CONTENT_VAL])?[0]
            }
            (Some(frame), Some(stats)) => self.compute_and_store(frame_index, frame, stats)?,
            (Some(frame), None) => self.compute_and_store_without_cache(frame_index, frame),
            (None, _) => {
                return Err(ScenecutError::InvalidArgument(format!(
                    "ContentDetector needs a decoded frame or cached metrics at frame {frame_index}"
                )));
            }
        };

        self.decide_cut(frame_index, content_val)
    }

    fn post_process(
        &mut self,
        _start_frame: usize,
        _end_frame: usize,
        _stats: Option<&mut StatsManager>,
    ) -> Result<Vec<usize>> {
        // ContentDetector emits cuts synchronously per frame; nothing to
        // flush at end-of-stream.
        Ok(Vec::new())
    }

    fn get_metrics(&self) -> Vec<&'static str> {
        let mut metrics = vec![METRIC_CONTENT_VAL, METRIC_DELTA_HUE, METRIC_DELTA_SAT, METRIC_DELTA_LUM];
        if self.detect_edges {
            metrics.push(METRIC_DELTA_EDGES);
        }
        metrics
    }

    fn stats_manager_required(&self) -> bool {
        true
    }

    fn is_processing_required(&self, frame_index: usize, stats: Option<&StatsManager>) -> bool {
        match stats {
            Some(stats) => !stats.metrics_exist(frame_index, &self.get_metrics()),
            None => true,
        }
    }
}

impl ContentDetector {
    fn compute_and_store(
        &mut self,
        frame_index: usize,
        frame: &Frame,
        stats: &mut StatsManager,
    ) -> Result<f64> {
        let content_val = self.compute_and_store_without_cache(frame_index, frame);
        let mut values = HashMap::new();
        values.insert(METRIC_CONTENT_VAL.to_string(), content_val);
        for (name, value) in self.pending_deltas.drain(..) {
            values.insert(name, value);
        }
        stats.set_metrics(frame_index, &values)?;
        Ok(content_val)
    }

    fn compute_and_store_without_cache(&mut self, _frame_index: usize, frame: &Frame) -> f64 {
        let (hue_mean, sat_mean, val_mean) = Self::compute_hsv_means(frame);
        let edge_map = if self.detect_edges {
            Some(Self::compute_edge_map(frame))
        } else {
            None
        };

        let (delta_hue, delta_sat, delta_lum, delta_edges) = match &self.last_frame {
            Some(prev) => {
                let delta_hue = (hue_mean - prev.hue_mean).abs();
                let delta_sat = (sat_mean - prev.sat_mean).abs();
                let delta_lum = (val_mean - prev.val_mean).abs();
                let delta_edges = match (&prev.edge_map, &edge_map) {
                    (Some(prev_edges), Some(cur_edges)) => {
                        Self::edge_change_fraction(prev_edges, cur_edges)
                    }
                    _ => 0.0,
                };
                (delta_hue, delta_sat, delta_lum, delta_edges)
            }
            None => (0.0, 0.0, 0.0, 0.0),
        };

        self.pending_deltas.clear();
        self.pending_deltas.push((METRIC_DELTA_HUE.to_string(), delta_hue));
        self.pending_deltas.push((METRIC_DELTA_SAT.to_string(), delta_sat));
        self.pending_deltas.push((METRIC_DELTA_LUM.to_string(), delta_lum));
        if self.detect_edges {
            self.pending_deltas.push((METRIC_DELTA_EDGES.to_string(), delta_edges));
        }

        self.last_frame = Some(PreviousFrameState { hue_mean, sat_mean, val_mean, edge_map });

        let w = &self.weights;
        let weight_sum = w.delta_hue + w.delta_sat + w.delta_lum
            + if self.detect_edges { w.delta_edges } else { 0.0 };
        if weight_sum <= 0.0 {
            return 0.0;
        }
        let weighted = w.delta_hue * delta_hue
            + w.delta_sat * delta_sat
            + w.delta_lum * delta_lum
            + if self.detect_edges { w.delta_edges * delta_edges } else { 0.0 };
        weighted / weight_sum
    }

    fn decide_cut(&mut self, frame_index: usize, content_val: f64) -> Result<Vec<usize>> {
        let prev_cut = *self.last_cut_frame.get_or_insert(frame_index);
        if content_val >= self.threshold && frame_index.saturating_sub(prev_cut) >= self.min_scene_len {
            self.last_cut_frame = Some(frame_index);
            log::debug!("content detector cut at frame {frame_index} (content_val={content_val:.3})");
            return Ok(vec![frame_index]);
        }
        Ok(Vec::new())
    }
}

/// Convert a BGR888 pixel to OpenCV-scaled HSV: hue in `[0, 180)`, saturation
/// and value in `[0, 255]`.
fn bgr_to_hsv(b: f64, g: f64, r: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let v = max;
    let s = if max <= 0.0 { 0.0 } else { delta / max * 255.0 };
    let h = if delta <= 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * (((b - r) / delta) + 2.0)
    } else {
        60.0 * (((r - g) / delta) + 4.0)
    };
    (h / 2.0, s, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_source::{Frame, InMemoryFrameSource, FrameSource};

    fn flat_frame(width: usize, height: usize, color: [u8; 3]) -> Frame {
        let mut data = Vec::with_capacity(width * height * 3);
        for _ in 0..(width * height) {
            data.extend_from_slice(&color);
        }
        Frame::new(width, height, data)
    }

    #[test]
    fn flat_video_produces_no_cuts() {
        let mut detector = ContentDetector::new(27.0, 15);
        let mut stats = StatsManager::new();
        stats.register_metrics(&detector.get_metrics()).unwrap();
        let mut source = InMemoryFrameSource::new(30.0, 4, 4, 90, |_, w, h| flat_frame(w, h, [10, 10, 10]));
        let mut total_cuts = 0;
        let mut idx = 0;
        while let Some(frame) = source.read().unwrap() {
            total_cuts += detector.process_frame(idx, Some(&frame), Some(&mut stats)).unwrap().len();
            idx += 1;
        }
        assert_eq!(total_cuts, 0);
    }

    #[test]
    fn scenario1_cut_at_frame_120() {
        let mut detector = ContentDetector::new(27.0, 15);
        let mut stats = StatsManager::new();
        stats.register_metrics(&detector.get_metrics()).unwrap();
        let mut source = InMemoryFrameSource::new(30.0, 4, 4, 300, |i, w, h| {
            if i < 120 {
                flat_frame(w, h, [10, 10, 10])
            } else {
                flat_frame(w, h, [230, 230, 230])
            }
        });
        let mut cuts = Vec::new();
        let mut idx = 0;
        while let Some(frame) = source.read().unwrap() {
            cuts.extend(detector.process_frame(idx, Some(&frame), Some(&mut stats)).unwrap());
            idx += 1;
        }
        assert_eq!(cuts, vec![120]);
    }

    #[test]
    fn p8_min_scene_len_enforced() {
        let mut detector = ContentDetector::new(1.0, 15);
        let mut stats = StatsManager::new();
        stats.register_metrics(&detector.get_metrics()).unwrap();
        // Alternate between two very different colors every frame, which
        // without min_scene_len would trigger a cut on every single frame.
        let mut source = InMemoryFrameSource::new(30.0, 4, 4, 60, |i, w, h| {
            if i % 2 == 0 {
                flat_frame(w, h, [0, 0, 0])
            } else {
                flat_frame(w, h, [255, 255, 255])
            }
        });
        let mut cuts = Vec::new();
        let mut idx = 0;
        while let Some(frame) = source.read().unwrap() {
            cuts.extend(detector.process_frame(idx, Some(&frame), Some(&mut stats)).unwrap());
            idx += 1;
        }
        for pair in cuts.windows(2) {
            assert!(pair[1] - pair[0] >= 15);
        }
    }

    #[test]
    fn p5_cache_hit_skips_recompute_and_matches_first_run() {
        let gen = |i: usize, w: usize, h: usize| {
            if i < 10 {
                flat_frame(w, h, [10, 10, 10])
            } else {
                flat_frame(w, h, [230, 230, 230])
            }
        };

        let mut stats = StatsManager::new();
        let mut detector = ContentDetector::new(27.0, 2);
        stats.register_metrics(&detector.get_metrics()).unwrap();
        let mut source = InMemoryFrameSource::new(30.0, 4, 4, 20, gen);
        let mut first_run_cuts = Vec::new();
        let mut idx = 0;
        while let Some(frame) = source.read().unwrap() {
            first_run_cuts.extend(detector.process_frame(idx, Some(&frame), Some(&mut stats)).unwrap());
            idx += 1;
        }

        // Second run, same StatsManager, fresh detector instance (as if a
        // new SceneManager were constructed with the same cache).
        let mut detector2 = ContentDetector::new(27.0, 2);
        let mut source2 = InMemoryFrameSource::new(30.0, 4, 4, 20, gen);
        let mut second_run_cuts = Vec::new();
        let mut idx = 0;
        while let Some(frame) = source2.read().unwrap() {
            assert!(!detector2.is_processing_required(idx, Some(&stats)));
            second_run_cuts.extend(detector2.process_frame(idx, Some(&frame), Some(&mut stats)).unwrap());
            idx += 1;
        }

        assert_eq!(first_run_cuts, second_run_cuts);
    }

    #[test]
    fn cached_metrics_alone_still_decide_a_cut_without_a_frame() {
        let mut stats = StatsManager::new();
        let mut detector = ContentDetector::new(27.0, 2);
        stats.register_metrics(&detector.get_metrics()).unwrap();

        // Prime the cache for frames 0 and 1 the normal way, with a jump big
        // enough to cross the threshold at frame 1.
        let frame0 = flat_frame(4, 4, [10, 10, 10]);
        let frame1 = flat_frame(4, 4, [230, 230, 230]);
        detector.process_frame(0, Some(&frame0), Some(&mut stats)).unwrap();
        let cuts = detector.process_frame(1, Some(&frame1), Some(&mut stats)).unwrap();
        assert_eq!(cuts, vec![1]);

        // A fresh detector instance re-running over the same cache, as
        // `SceneManager` does when every active detector's metrics are
        // already cached for a frame, must see the same cut without ever
        // being handed a decoded frame.
        let mut detector2 = ContentDetector::new(27.0, 2);
        assert!(!detector2.is_processing_required(0, Some(&stats)));
        assert!(!detector2.is_processing_required(1, Some(&stats)));
        detector2.process_frame(0, None, Some(&mut stats)).unwrap();
        let cuts2 = detector2.process_frame(1, None, Some(&mut stats)).unwrap();
        assert_eq!(cuts2, vec![1]);
    }
}

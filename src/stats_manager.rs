//! `StatsManager`: a sparse `(frame_index, metric_name) -> f64` cache with
//! CSV persistence, letting detectors skip recomputation across runs.

use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Read, Write};

use crate::error::{Result, ScenecutError};
use crate::timecode::FrameTimecode;

/// Key identifying a single cached metric value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameMetricKey {
    /// The 0-based frame index the value was computed for.
    pub frame_index: usize,
    /// The metric name, as passed to [`StatsManager::register_metrics`].
    pub metric_name: String,
}

/// A sparse, keyed store of per-frame metric values, with CSV persistence.
///
/// `Clone` so that callers sharing metrics across more than one
/// `SceneManager` (e.g. re-running with a different threshold) can hand
/// each one its own copy rather than serialize access to a single instance.
#[derive(Debug, Default, Clone)]
pub struct StatsManager {
    registered_metrics: Vec<String>,
    // frame_index -> (metric_name -> value)
    values: BTreeMap<usize, HashMap<String, f64>>,
}

impl StatsManager {
    /// Create a new, empty `StatsManager`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a set of metric names as valid keys for [`Self::set_metrics`].
    ///
    /// If any name in `names` is already registered, no names are added and
    /// `MetricAlreadyRegistered` is returned (callers may swallow this to
    /// support adding the same detector type more than once).
    pub fn register_metrics(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            if self.registered_metrics.iter().any(|m| m == name) {
                return Err(ScenecutError::MetricAlreadyRegistered((*name).to_string()));
            }
        }
        for name in names {
            self.registered_metrics.push((*name).to_string());
        }
        Ok(())
    }

    /// True iff every metric in `names` has a stored value at `frame_index`.
    pub fn metrics_exist(&self, frame_index: usize, names: &[&str]) -> bool {
        match self.values.get(&frame_index) {
            Some(frame_values) => names.iter().all(|name| frame_values.contains_key(*name)),
            None => names.is_empty(),
        }
    }

    /// Fetch the stored values for `names` at `frame_index`.
    ///
    /// Returns `FrameMetricMissing` if any requested metric has no value at
    /// that frame; callers should check [`Self::metrics_exist`] first.
    pub fn get_metrics(&self, frame_index: usize, names: &[&str]) -> Result<Vec<f64>> {
        let frame_values = self.values.get(&frame_index);
        names
            .iter()
            .map(|name| {
                frame_values
                    .and_then(|values| values.get(*name))
                    .copied()
                    .ok_or_else(|| ScenecutError::FrameMetricMissing {
                        frame_index,
                        metric: (*name).to_string(),
                    })
            })
            .collect()
    }

    /// Store values for a set of registered metrics at `frame_index`.
    pub fn set_metrics(&mut self, frame_index: usize, metrics: &HashMap<String, f64>) -> Result<()> {
        for name in metrics.keys() {
            if !self.registered_metrics.iter().any(|m| m == name) {
                return Err(ScenecutError::FrameMetricNotRegistered(name.clone()));
            }
        }
        let entry = self.values.entry(frame_index).or_default();
        for (name, value) in metrics {
            entry.insert(name.clone(), *value);
        }
        Ok(())
    }

    /// Write the full stats table to `writer` as CSV.
    ///
    /// The first line is a `#framerate: <fps>` comment so that
    /// [`Self::load_from_csv`] can detect a framerate mismatch before parsing
    /// any data row.
    pub fn save_to_csv<W: Write>(&self, mut writer: W, base_timecode: &FrameTimecode) -> Result<()> {
        writeln!(writer, "#framerate: {}", base_timecode.fps())?;

        let mut csv_writer = csv::Writer::from_writer(writer);
        let mut header = vec!["Frame Number".to_string(), "Timecode (seconds)".to_string()];
        header.extend(self.registered_metrics.iter().cloned());
        csv_writer.write_record(&header)?;

        for (&frame_index, frame_values) in &self.values {
            if frame_values.is_empty() {
                continue;
            }
            let seconds = frame_index as f64 / base_timecode.fps();
            let mut row = vec![frame_index.to_string(), format!("{seconds:.3}")];
            for metric in &self.registered_metrics {
                row.push(
                    frame_values
                        .get(metric)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            csv_writer.write_record(&row)?;
        }
        csv_writer.flush()?;
        log::debug!("wrote stats for {} frames to csv", self.values.len());
        Ok(())
    }

    /// Load a stats table previously written by [`Self::save_to_csv`].
    ///
    /// Fails with `StatsFileCorrupt` on malformed input, or
    /// `StatsFileFramerateMismatch` if the recorded framerate differs from
    /// `base_timecode`'s by more than `1e-4`.
    pub fn load_from_csv<R: Read>(&mut self, reader: R, base_timecode: &FrameTimecode) -> Result<()> {
        let mut buf_reader = BufReader::new(reader);
        let mut comment_line = String::new();
        buf_reader
            .read_line(&mut comment_line)
            .map_err(|_| ScenecutError::StatsFileCorrupt)?;
        let comment_line = comment_line.trim();
        let fps_str = comment_line
            .strip_prefix("#framerate:")
            .ok_or(ScenecutError::StatsFileCorrupt)?
            .trim();
        let stats_file_fps: f64 = fps_str.parse().map_err(|_| ScenecutError::StatsFileCorrupt)?;
        if (stats_file_fps - base_timecode.fps()).abs() >= 1e-4 {
            return Err(ScenecutError::StatsFileFramerateMismatch {
                stats_file_fps,
                base_timecode_fps: base_timecode.fps(),
            });
        }

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(buf_reader);

        let headers = csv_reader
            .headers()
            .map_err(|_| ScenecutError::StatsFileCorrupt)?
            .clone();
        if headers.len() < 2 {
            return Err(ScenecutError::StatsFileCorrupt);
        }
        let metric_names: Vec<&str> = headers.iter().skip(2).collect();
        for name in &metric_names {
            if self.register_metrics(&[name]).is_err() {
                // Already registered: fine, we're merging into an existing manager.
            }
        }

        let mut loaded_frames = 0usize;
        for record in csv_reader.records() {
            let record = record.map_err(|_| ScenecutError::StatsFileCorrupt)?;
            if record.len() < 2 {
                return Err(ScenecutError::StatsFileCorrupt);
            }
            let frame_index: usize = record
                .get(0)
                .and_then(|s| s.parse().ok())
                .ok_or(ScenecutError::StatsFileCorrupt)?;
            let mut metrics = HashMap::new();
            for (i, name) in metric_names.iter().enumerate() {
                if let Some(field) = record.get(2 + i) {
                    if !field.is_empty() {
                        let value: f64 = field.parse().map_err(|_| ScenecutError::StatsFileCorrupt)?;
                        metrics.insert((*name).to_string(), value);
                    }
                }
            }
            self.set_metrics(frame_index, &metrics)?;
            loaded_frames += 1;
        }
        log::debug!("loaded stats for {loaded_frames} frames from csv");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_set_round_trip() {
        let mut mgr = StatsManager::new();
        mgr.register_metrics(&["content_val"]).unwrap();
        let mut values = HashMap::new();
        values.insert("content_val".to_string(), 12.5);
        mgr.set_metrics(0, &values).unwrap();
        assert!(mgr.metrics_exist(0, &["content_val"]));
        assert_eq!(mgr.get_metrics(0, &["content_val"]).unwrap(), vec![12.5]);
    }

    #[test]
    fn double_registration_is_reported() {
        let mut mgr = StatsManager::new();
        mgr.register_metrics(&["content_val"]).unwrap();
        assert!(mgr.register_metrics(&["content_val"]).is_err());
    }

    #[test]
    fn missing_metric_is_an_error() {
        let mgr = StatsManager::new();
        assert!(!mgr.metrics_exist(0, &["content_val"]));
        assert!(mgr.get_metrics(0, &["content_val"]).is_err());
    }

    #[test]
    fn set_metrics_requires_registration() {
        let mut mgr = StatsManager::new();
        let mut values = HashMap::new();
        values.insert("content_val".to_string(), 1.0);
        assert!(mgr.set_metrics(0, &values).is_err());
    }

    #[test]
    fn p4_csv_round_trip() {
        let mut mgr = StatsManager::new();
        mgr.register_metrics(&["content_val"]).unwrap();
        for (frame, value) in [(0usize, 12.5), (1, 13.0), (2, 40.0)] {
            let mut values = HashMap::new();
            values.insert("content_val".to_string(), value);
            mgr.set_metrics(frame, &values).unwrap();
        }
        let base_timecode = FrameTimecode::from_frames(0, 30.0).unwrap();
        let mut buf = Vec::new();
        mgr.save_to_csv(&mut buf, &base_timecode).unwrap();

        let mut reloaded = StatsManager::new();
        reloaded.load_from_csv(buf.as_slice(), &base_timecode).unwrap();
        for (frame, value) in [(0usize, 12.5), (1, 13.0), (2, 40.0)] {
            let got = reloaded.get_metrics(frame, &["content_val"]).unwrap()[0];
            assert!((got - value).abs() < 1e-6);
        }
    }

    #[test]
    fn p6_framerate_mismatch_on_load() {
        let mut mgr = StatsManager::new();
        mgr.register_metrics(&["content_val"]).unwrap();
        let mut values = HashMap::new();
        values.insert("content_val".to_string(), 1.0);
        mgr.set_metrics(0, &values).unwrap();

        let stored_fps = FrameTimecode::from_frames(0, 29.97).unwrap();
        let mut buf = Vec::new();
        mgr.save_to_csv(&mut buf, &stored_fps).unwrap();

        let base_timecode = FrameTimecode::from_frames(0, 30.0).unwrap();
        let mut reloaded = StatsManager::new();
        let err = reloaded
            .load_from_csv(buf.as_slice(), &base_timecode)
            .unwrap_err();
        match err {
            ScenecutError::StatsFileFramerateMismatch {
                stats_file_fps,
                base_timecode_fps,
            } => {
                assert!((stats_file_fps - 29.97).abs() < 1e-6);
                assert!((base_timecode_fps - 30.0).abs() < 1e-6);
            }
            other => panic!("expected framerate mismatch, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_file_is_rejected() {
        let base_timecode = FrameTimecode::from_frames(0, 30.0).unwrap();
        let mut mgr = StatsManager::new();
        assert!(mgr.load_from_csv("not a stats file\n".as_bytes(), &base_timecode).is_err());
    }
}

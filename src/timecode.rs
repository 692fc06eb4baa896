//! `FrameTimecode`: the (frame_index, fps) value type all cuts and scenes are
//! expressed in.
//!
//! Two timecodes can only be combined or strictly compared when their
//! framerates agree to within [`FPS_TOLERANCE`]. The `checked_*` methods
//! surface a framerate mismatch as a [`ScenecutError::FramerateMismatch`];
//! the `std::ops` impls and `PartialOrd`/`PartialEq` are the ergonomic,
//! non-fallible counterparts used once a framerate is already known to be
//! consistent (e.g. every timecode derived from the same `base_timecode`).

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

use crate::error::{Result, ScenecutError};

/// Maximum allowed difference between two framerates for them to be
/// considered equal.
pub const FPS_TOLERANCE: f64 = 1e-9;

/// An immutable (frame_index, fps) pair.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct FrameTimecode {
    frame_index: i64,
    fps: f64,
}

impl FrameTimecode {
    /// Construct a timecode directly from a frame index.
    pub fn from_frames(frame_index: i64, fps: f64) -> Result<Self> {
        if !(fps > 0.0) || !fps.is_finite() {
            return Err(ScenecutError::InvalidArgument(format!(
                "fps must be positive and finite, got {fps}"
            )));
        }
        if frame_index < 0 {
            return Err(ScenecutError::InvalidArgument(format!(
                "frame_index must be non-negative, got {frame_index}"
            )));
        }
        Ok(Self { frame_index, fps })
    }

    /// Construct a timecode from a number of seconds, rounding
    /// half-away-from-zero to the nearest frame.
    pub fn from_seconds(seconds: f64, fps: f64) -> Result<Self> {
        if !(fps > 0.0) || !fps.is_finite() {
            return Err(ScenecutError::InvalidArgument(format!(
                "fps must be positive and finite, got {fps}"
            )));
        }
        if seconds < 0.0 {
            return Err(ScenecutError::InvalidArgument(format!(
                "seconds must be non-negative, got {seconds}"
            )));
        }
        let frame_index = (seconds * fps).round() as i64;
        Self::from_frames(frame_index, fps)
    }

    /// Construct a timecode from one of the accepted string forms:
    /// `"HH:MM:SS"`, `"HH:MM:SS.mmm"`, `"<seconds>s"`, a bare integer
    /// (frames), or a bare real number (seconds).
    pub fn from_string(value: &str, fps: f64) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ScenecutError::InvalidArgument(
                "empty timecode string".to_string(),
            ));
        }
        if value.contains(':') {
            return Self::from_hms_string(value, fps);
        }
        if let Some(stripped) = value.strip_suffix('s') {
            let seconds: f64 = stripped.trim().parse().map_err(|_| {
                ScenecutError::InvalidArgument(format!("invalid seconds value: {value:?}"))
            })?;
            return Self::from_seconds(seconds, fps);
        }
        if let Ok(frames) = value.parse::<i64>() {
            return Self::from_frames(frames, fps);
        }
        // A bare real number without a trailing 's' or ':' is treated as
        // seconds, matching the distilled spec's "bare real -> seconds" rule
        // for the cases where the caller did not go through a typed numeric
        // constructor.
        let seconds: f64 = value
            .parse()
            .map_err(|_| ScenecutError::InvalidArgument(format!("invalid timecode: {value:?}")))?;
        Self::from_seconds(seconds, fps)
    }

    fn from_hms_string(value: &str, fps: f64) -> Result<Self> {
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() != 3 {
            return Err(ScenecutError::InvalidArgument(format!(
                "expected HH:MM:SS[.mmm], got {value:?}"
            )));
        }
        let hours: f64 = parts[0]
            .parse()
            .map_err(|_| ScenecutError::InvalidArgument(format!("invalid hours in {value:?}")))?;
        let minutes: f64 = parts[1].parse().map_err(|_| {
            ScenecutError::InvalidArgument(format!("invalid minutes in {value:?}"))
        })?;
        let seconds: f64 = parts[2].parse().map_err(|_| {
            ScenecutError::InvalidArgument(format!("invalid seconds in {value:?}"))
        })?;
        if hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
            return Err(ScenecutError::InvalidArgument(format!(
                "timecode components must be non-negative: {value:?}"
            )));
        }
        let total_seconds = hours * 3600.0 + minutes * 60.0 + seconds;
        Self::from_seconds(total_seconds, fps)
    }

    /// The 0-based frame index.
    pub fn get_frames(&self) -> i64 {
        self.frame_index
    }

    /// The timecode expressed in seconds.
    pub fn get_seconds(&self) -> f64 {
        self.frame_index as f64 / self.fps
    }

    /// The framerate this timecode is defined in.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Format as `HH:MM:SS.mmm`.
    pub fn get_timecode(&self) -> String {
        let total_seconds = self.get_seconds();
        let hours = (total_seconds / 3600.0).floor() as u64;
        let minutes = ((total_seconds - (hours as f64 * 3600.0)) / 60.0).floor() as u64;
        let seconds = total_seconds - (hours as f64 * 3600.0) - (minutes as f64 * 60.0);
        format!("{hours:02}:{minutes:02}:{seconds:06.3}")
    }

    /// Whether two framerates are equal to within [`FPS_TOLERANCE`].
    pub fn framerates_match(a: f64, b: f64) -> bool {
        (a - b).abs() < FPS_TOLERANCE
    }

    fn check_fps(&self, other_fps: f64) -> Result<()> {
        if !Self::framerates_match(self.fps, other_fps) {
            return Err(ScenecutError::FramerateMismatch {
                lhs_fps: self.fps,
                rhs_fps: other_fps,
            });
        }
        Ok(())
    }

    /// Add a frame-matched timecode, failing on a framerate mismatch.
    pub fn checked_add(&self, other: &FrameTimecode) -> Result<FrameTimecode> {
        self.check_fps(other.fps)?;
        FrameTimecode::from_frames(self.frame_index + other.frame_index, self.fps)
    }

    /// Subtract a frame-matched timecode, failing on a framerate mismatch or
    /// on a negative result.
    pub fn checked_sub(&self, other: &FrameTimecode) -> Result<FrameTimecode> {
        self.check_fps(other.fps)?;
        FrameTimecode::from_frames(self.frame_index - other.frame_index, self.fps)
    }

    /// Compare against another timecode, failing on a framerate mismatch.
    pub fn checked_cmp(&self, other: &FrameTimecode) -> Result<Ordering> {
        self.check_fps(other.fps)?;
        Ok(self.frame_index.cmp(&other.frame_index))
    }

    /// Add a raw frame count; always succeeds for a valid timecode.
    pub fn add_frames(&self, frames: i64) -> FrameTimecode {
        FrameTimecode::from_frames(self.frame_index + frames, self.fps)
            .expect("adding frames to a valid timecode cannot produce an invalid fps")
    }

    /// Add a raw number of seconds; always succeeds for a valid timecode.
    pub fn add_seconds(&self, seconds: f64) -> FrameTimecode {
        let delta_frames = (seconds * self.fps).round() as i64;
        self.add_frames(delta_frames)
    }
}

impl fmt::Display for FrameTimecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get_timecode())
    }
}

impl Add<FrameTimecode> for FrameTimecode {
    type Output = FrameTimecode;
    fn add(self, rhs: FrameTimecode) -> FrameTimecode {
        self.checked_add(&rhs)
            .expect("FrameTimecode addition requires matching framerates")
    }
}

impl Add<i64> for FrameTimecode {
    type Output = FrameTimecode;
    fn add(self, rhs: i64) -> FrameTimecode {
        self.add_frames(rhs)
    }
}

impl Add<f64> for FrameTimecode {
    type Output = FrameTimecode;
    fn add(self, rhs: f64) -> FrameTimecode {
        self.add_seconds(rhs)
    }
}

impl Sub<FrameTimecode> for FrameTimecode {
    type Output = FrameTimecode;
    fn sub(self, rhs: FrameTimecode) -> FrameTimecode {
        self.checked_sub(&rhs)
            .expect("FrameTimecode subtraction requires matching framerates and a non-negative result")
    }
}

impl Sub<i64> for FrameTimecode {
    type Output = FrameTimecode;
    fn sub(self, rhs: i64) -> FrameTimecode {
        self.add_frames(-rhs)
    }
}

impl Sub<f64> for FrameTimecode {
    type Output = FrameTimecode;
    fn sub(self, rhs: f64) -> FrameTimecode {
        self.add_seconds(-rhs)
    }
}

impl PartialEq for FrameTimecode {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.checked_cmp(other), Ok(Ordering::Equal))
    }
}

impl PartialOrd for FrameTimecode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.checked_cmp(other).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hms_with_fraction() {
        let tc = FrameTimecode::from_string("00:00:01.500", 10.0).unwrap();
        assert_eq!(tc.get_frames(), 15);
    }

    #[test]
    fn parses_bare_frames() {
        let tc = FrameTimecode::from_string("42", 30.0).unwrap();
        assert_eq!(tc.get_frames(), 42);
    }

    #[test]
    fn parses_seconds_suffix() {
        let tc = FrameTimecode::from_string("2.5s", 10.0).unwrap();
        assert_eq!(tc.get_frames(), 25);
    }

    #[test]
    fn p7_seconds_round_trip_over_common_framerates() {
        for fps in [10.0, 23.976, 29.97, 30.0, 60.0] {
            let tc = FrameTimecode::from_frames(0, fps).unwrap() + 1.5;
            assert_eq!(tc.get_frames(), (1.5 * fps).round() as i64);
        }
    }

    #[test]
    fn arithmetic_preserves_fps() {
        let a = FrameTimecode::from_frames(10, 30.0).unwrap();
        let b = FrameTimecode::from_frames(5, 30.0).unwrap();
        assert_eq!((a + b).get_frames(), 15);
        assert_eq!((a - b).get_frames(), 5);
    }

    #[test]
    fn mismatched_fps_add_fails() {
        let a = FrameTimecode::from_frames(10, 30.0).unwrap();
        let b = FrameTimecode::from_frames(5, 25.0).unwrap();
        assert!(a.checked_add(&b).is_err());
    }

    #[test]
    fn get_timecode_formats_hms() {
        let tc = FrameTimecode::from_frames(30 * 90 + 15, 30.0).unwrap();
        assert_eq!(tc.get_timecode(), "00:01:30.500");
    }

    #[test]
    fn negative_frame_index_rejected() {
        assert!(FrameTimecode::from_frames(-1, 30.0).is_err());
    }

    #[test]
    fn zero_fps_rejected() {
        assert!(FrameTimecode::from_frames(0, 0.0).is_err());
    }
}

//! `FrameSource`: the abstract pull interface the pipeline reads frames from.
//!
//! Video decoding itself is out of scope for this crate (see SPEC_FULL.md
//! §1); this module defines the contract plus an in-memory test double used
//! throughout the test suite and by callers who already have frames decoded
//! by some other means. Concrete real-world backends live in
//! [`crate::y4m_source`] (feature `y4m-source`) and
//! [`crate::ffmpeg_source`] (feature `ffmpeg-source`).

use crate::error::Result;
use crate::timecode::FrameTimecode;

/// A single decoded video frame.
///
/// Pixel data is stored BGR-ordered, row-major, with no padding between
/// rows (`stride == width * 3`). Frames are transient: consumers must not
/// retain the buffer past the iteration that produced it.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
    /// BGR24 pixel data, `height * width * 3` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    /// Construct a new frame, panicking if `data`'s length does not match
    /// `width * height * 3`.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width * height * 3,
            "frame data length must equal width * height * 3"
        );
        Self { width, height, data }
    }

    /// Fetch the BGR triple at `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let idx = (y * self.width + x) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Return a new frame sampled by taking every `factor`-th row and column
    /// (nearest-neighbor by stride; no interpolation), per SPEC_FULL.md §4.5
    /// step 3. A `factor` of 1 returns a clone of `self`.
    pub fn downscaled(&self, factor: usize) -> Frame {
        if factor <= 1 {
            return self.clone();
        }
        let new_width = (self.width + factor - 1) / factor;
        let new_height = (self.height + factor - 1) / factor;
        let mut data = Vec::with_capacity(new_width * new_height * 3);
        let mut y = 0;
        while y < self.height {
            let mut x = 0;
            while x < self.width {
                let px = self.pixel(x, y);
                data.extend_from_slice(&px);
                x += factor;
            }
            y += factor;
        }
        Frame { width: new_width, height: new_height, data }
    }
}

/// Abstract pull source of decoded video frames.
///
/// Implementations are exclusively borrowed by one [`crate::scene_manager::SceneManager::detect_scenes`]
/// call at a time.
pub trait FrameSource {
    /// Decode and return the next frame, advancing `frame_number`. Returns
    /// `Ok(None)` on end-of-stream.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Advance one frame without decoding it. Returns `Ok(false)` on
    /// end-of-stream.
    fn grab(&mut self) -> Result<bool>;

    /// Reposition to `timecode`. Not guaranteed to be frame-exact on all
    /// backends.
    fn seek(&mut self, timecode: FrameTimecode) -> Result<()>;

    /// Reposition to the start of the stream.
    fn reset(&mut self) -> Result<()>;

    /// The current 0-based frame position, incremented after each
    /// successful `read`/`grab`.
    fn frame_number(&self) -> usize;

    /// The current position as a [`FrameTimecode`].
    fn position(&self) -> FrameTimecode;

    /// Total stream duration as a [`FrameTimecode`].
    fn duration(&self) -> FrameTimecode;

    /// A zero-frame [`FrameTimecode`] carrying this source's framerate.
    fn base_timecode(&self) -> FrameTimecode;

    /// Frame dimensions as `(width, height)`.
    fn frame_size(&self) -> (usize, usize);

    /// Pixel aspect ratio (1.0 for square pixels).
    fn aspect_ratio(&self) -> f64;

    /// A human-readable name for this source (e.g. a file stem), used by
    /// [`crate::save_images::save_images`]'s `$VIDEO_NAME` template macro.
    fn name(&self) -> &str;
}

/// An in-memory [`FrameSource`] backed by a per-frame generator closure.
///
/// Used by tests and by any caller that already has frames in memory (e.g.
/// produced by some other decoder not covered by this crate).
pub struct InMemoryFrameSource<G>
where
    G: Fn(usize, usize, usize) -> Frame,
{
    name: String,
    fps: f64,
    width: usize,
    height: usize,
    total_frames: usize,
    aspect_ratio: f64,
    frame_number: usize,
    generator: G,
}

impl<G> InMemoryFrameSource<G>
where
    G: Fn(usize, usize, usize) -> Frame,
{
    /// Build a source of `total_frames` frames at `fps`, where each frame is
    /// produced on demand by `generator(frame_index, width, height)`.
    pub fn new(fps: f64, width: usize, height: usize, total_frames: usize, generator: G) -> Self {
        Self {
            name: "memory".to_string(),
            fps,
            width,
            height,
            total_frames,
            aspect_ratio: 1.0,
            frame_number: 0,
            generator,
        }
    }

    /// Override the reported `name()`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the reported `aspect_ratio()`.
    pub fn with_aspect_ratio(mut self, aspect_ratio: f64) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }
}

impl<G> FrameSource for InMemoryFrameSource<G>
where
    G: Fn(usize, usize, usize) -> Frame,
{
    fn read(&mut self) -> Result<Option<Frame>> {
        if self.frame_number >= self.total_frames {
            return Ok(None);
        }
        let frame = (self.generator)(self.frame_number, self.width, self.height);
        self.frame_number += 1;
        Ok(Some(frame))
    }

    fn grab(&mut self) -> Result<bool> {
        if self.frame_number >= self.total_frames {
            return Ok(false);
        }
        self.frame_number += 1;
        Ok(true)
    }

    fn seek(&mut self, timecode: FrameTimecode) -> Result<()> {
        self.frame_number = timecode.get_frames() as usize;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.frame_number = 0;
        Ok(())
    }

    fn frame_number(&self) -> usize {
        self.frame_number
    }

    fn position(&self) -> FrameTimecode {
        FrameTimecode::from_frames(self.frame_number as i64, self.fps).expect("valid position")
    }

    fn duration(&self) -> FrameTimecode {
        FrameTimecode::from_frames(self.total_frames as i64, self.fps).expect("valid duration")
    }

    fn base_timecode(&self) -> FrameTimecode {
        FrameTimecode::from_frames(0, self.fps).expect("valid base timecode")
    }

    fn frame_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }

    fn name(&self) -> &str {
        &self.name
    }
}

//! `Y4mFrameSource`: a [`FrameSource`] backed by `y4m::Decoder` over any
//! `Read` stream.
//!
//! Grounded in the teacher's own y4m integration: a thin wrapper around the
//! decoder that surfaces dimensions/framerate up front and converts each
//! decoded frame to BGR24 on demand.

use std::io::Read;

use crate::error::{Result, ScenecutError};
use crate::frame_source::{Frame, FrameSource};
use crate::timecode::FrameTimecode;

/// A [`FrameSource`] that decodes a YUV4MPEG2 stream via the `y4m` crate.
///
/// `seek` is best-effort and forward-only: y4m streams have no indexed
/// random access, so seeking backwards or resetting is not supported.
pub struct Y4mFrameSource<R: Read> {
    decoder: y4m::Decoder<R>,
    name: String,
    fps: f64,
    frame_number: usize,
    total_frames: Option<usize>,
}

impl<R: Read> Y4mFrameSource<R> {
    /// Wrap an already-open y4m stream.
    pub fn new(reader: R, name: impl Into<String>) -> Result<Self> {
        let decoder = y4m::decode(reader).map_err(|e| {
            ScenecutError::InvalidArgument(format!("failed to open y4m stream: {e}"))
        })?;
        let framerate = decoder.get_framerate();
        let fps = framerate.num as f64 / framerate.den as f64;
        Ok(Self { decoder, name: name.into(), fps, frame_number: 0, total_frames: None })
    }

    fn yuv_to_bgr_frame(&self, raw: &y4m::Frame<'_>) -> Frame {
        let (width, height) = (self.decoder.get_width(), self.decoder.get_height());
        let y_plane = raw.get_y_plane();
        let u_plane = raw.get_u_plane();
        let v_plane = raw.get_v_plane();
        let chroma_width = (width + 1) / 2;

        let mut data = Vec::with_capacity(width * height * 3);
        for row in 0..height {
            for col in 0..width {
                let y = y_plane[row * width + col] as f64;
                let chroma_idx = (row / 2) * chroma_width + col / 2;
                let u = u_plane[chroma_idx] as f64 - 128.0;
                let v = v_plane[chroma_idx] as f64 - 128.0;

                let r = y + 1.402 * v;
                let g = y - 0.344136 * u - 0.714136 * v;
                let b = y + 1.772 * u;
                data.push(b.clamp(0.0, 255.0) as u8);
                data.push(g.clamp(0.0, 255.0) as u8);
                data.push(r.clamp(0.0, 255.0) as u8);
            }
        }
        Frame::new(width, height, data)
    }
}

impl<R: Read> FrameSource for Y4mFrameSource<R> {
    fn read(&mut self) -> Result<Option<Frame>> {
        match self.decoder.read_frame() {
            Ok(raw) => {
                let frame = self.yuv_to_bgr_frame(&raw);
                self.frame_number += 1;
                Ok(Some(frame))
            }
            Err(y4m::Error::EOF) => Ok(None),
            Err(e) => Err(ScenecutError::InvalidArgument(format!("y4m decode error: {e}"))),
        }
    }

    fn grab(&mut self) -> Result<bool> {
        Ok(self.read()?.is_some())
    }

    fn seek(&mut self, timecode: FrameTimecode) -> Result<()> {
        // y4m has no indexed random access; forward-only streams can only
        // seek by grabbing frames until the target is reached.
        let target = timecode.get_frames() as usize;
        if target < self.frame_number {
            return Err(ScenecutError::InvalidArgument(
                "y4m source cannot seek backwards".to_string(),
            ));
        }
        log::debug!("y4m source: seek is best-effort (forward-only)");
        while self.frame_number < target {
            if !self.grab()? {
                break;
            }
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        Err(ScenecutError::InvalidArgument(
            "y4m source does not support reset; reopen the stream instead".to_string(),
        ))
    }

    fn frame_number(&self) -> usize {
        self.frame_number
    }

    fn position(&self) -> FrameTimecode {
        FrameTimecode::from_frames(self.frame_number as i64, self.fps).expect("valid position")
    }

    fn duration(&self) -> FrameTimecode {
        let total = self.total_frames.unwrap_or(self.frame_number);
        FrameTimecode::from_frames(total as i64, self.fps).expect("valid duration")
    }

    fn base_timecode(&self) -> FrameTimecode {
        FrameTimecode::from_frames(0, self.fps).expect("valid base timecode")
    }

    fn frame_size(&self) -> (usize, usize) {
        (self.decoder.get_width(), self.decoder.get_height())
    }

    fn aspect_ratio(&self) -> f64 {
        let par = self.decoder.get_pixel_aspect();
        if par.den == 0 {
            1.0
        } else {
            par.num as f64 / par.den as f64
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_test_stream(width: usize, height: usize, frames: &[[u8; 3]]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = y4m::encode(width, height, y4m::Ratio::new(30, 1))
                .write_header(&mut buf)
                .unwrap();
            for &[y, u, v] in frames {
                let y_plane = vec![y; width * height];
                let chroma_w = (width + 1) / 2;
                let chroma_h = (height + 1) / 2;
                let u_plane = vec![u; chroma_w * chroma_h];
                let v_plane = vec![v; chroma_w * chroma_h];
                let frame = y4m::Frame::new([&y_plane, &u_plane, &v_plane], None);
                encoder.write_frame(&frame).unwrap();
            }
        }
        buf
    }

    #[test]
    fn decodes_frames_and_reports_fps() {
        let bytes = encode_test_stream(4, 4, &[[128, 128, 128], [16, 128, 128]]);
        let mut source = Y4mFrameSource::new(bytes.as_slice(), "test").unwrap();
        assert_eq!(source.frame_size(), (4, 4));
        assert!((source.base_timecode().fps() - 30.0).abs() < 1e-6);

        let frame1 = source.read().unwrap().unwrap();
        assert_eq!(frame1.pixel(0, 0), [128, 128, 128]);
        let frame2 = source.read().unwrap().unwrap();
        assert!(frame2.pixel(0, 0)[0] < 128);
        assert!(source.read().unwrap().is_none());
        assert_eq!(source.frame_number(), 2);
    }
}

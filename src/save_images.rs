//! `save_images`: extract N representative still frames per scene.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ImageBuffer, Rgb};

use crate::error::{Result, ScenecutError};
use crate::frame_source::{Frame, FrameSource};
use crate::timecode::FrameTimecode;

/// How to resize an extracted frame before writing it out.
#[derive(Debug, Clone, Copy)]
pub enum ImageResize {
    /// Resize to an exact `(width, height)`, ignoring aspect ratio.
    Exact(u32, u32),
    /// Resize to the given height, preserving aspect ratio.
    Height(u32),
    /// Resize to the given width, preserving aspect ratio.
    Width(u32),
    /// Scale both dimensions by a uniform factor.
    Scale(f64),
}

/// Options controlling [`save_images`].
pub struct SaveImagesOptions<'a> {
    /// Number of sample images to extract per scene.
    pub num_images: usize,
    /// Directory to write images into.
    pub output_dir: &'a Path,
    /// Filename template supporting `$VIDEO_NAME`, `$SCENE_NUMBER`,
    /// `$IMAGE_NUMBER`, `$FRAME_NUMBER`.
    pub filename_template: &'a str,
    /// Number of frames to pull the first/last sample in from the scene
    /// boundary, rather than sampling exactly at the edge.
    pub margin: usize,
    /// Optional resize applied before encoding.
    pub resize: Option<ImageResize>,
}

impl Default for SaveImagesOptions<'_> {
    fn default() -> Self {
        Self {
            num_images: 3,
            output_dir: Path::new("."),
            filename_template: "$VIDEO_NAME-Scene-$SCENE_NUMBER-$IMAGE_NUMBER",
            margin: 1,
            resize: None,
        }
    }
}

/// For a scene `[start, end)` split into `num_images` equal buckets, return
/// the frame index sampled from the center of each bucket, except the first
/// bucket (clamped to `start + margin`) and the last (clamped to
/// `end - 1 - margin`).
fn sample_indices(start: i64, end: i64, num_images: usize, margin: i64) -> Vec<i64> {
    if num_images == 0 || end <= start {
        return Vec::new();
    }
    let scene_len = end - start;
    let mut indices = Vec::with_capacity(num_images);
    for i in 0..num_images {
        let bucket_start = start + (scene_len * i as i64) / num_images as i64;
        let bucket_end = start + (scene_len * (i as i64 + 1)) / num_images as i64;
        let bucket_end = bucket_end.max(bucket_start + 1);
        let center = bucket_start + (bucket_end - bucket_start) / 2;
        let frame = if i == 0 {
            (start + margin).min(end - 1)
        } else if i == num_images - 1 {
            (end - 1 - margin).max(start)
        } else {
            center
        };
        indices.push(frame.clamp(start, end - 1));
    }
    indices
}

fn render_filename(
    template: &str,
    video_name: &str,
    scene_number: usize,
    image_number: usize,
    frame_number: i64,
) -> String {
    template
        .replace("$VIDEO_NAME", video_name)
        .replace("$SCENE_NUMBER", &format!("{scene_number:03}"))
        .replace("$IMAGE_NUMBER", &format!("{image_number:02}"))
        .replace("$FRAME_NUMBER", &frame_number.to_string())
}

fn frame_to_image_buffer(frame: &Frame) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let mut rgb = Vec::with_capacity(frame.data.len());
    for chunk in frame.data.chunks_exact(3) {
        rgb.push(chunk[2]);
        rgb.push(chunk[1]);
        rgb.push(chunk[0]);
    }
    ImageBuffer::from_raw(frame.width as u32, frame.height as u32, rgb)
        .expect("frame buffer length already validated by Frame::new")
}

fn apply_resize(
    mut image: ImageBuffer<Rgb<u8>, Vec<u8>>,
    resize: ImageResize,
    aspect_ratio: f64,
) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    if (aspect_ratio - 1.0).abs() >= 0.01 {
        let corrected_width = (image.width() as f64 * aspect_ratio).round().max(1.0) as u32;
        image = image::imageops::resize(&image, corrected_width, image.height(), FilterType::Triangle);
    }
    let (w, h) = (image.width() as f64, image.height() as f64);
    let (target_w, target_h) = match resize {
        ImageResize::Exact(w, h) => (w, h),
        ImageResize::Height(target_h) => {
            let target_w = (w * (target_h as f64 / h)).round().max(1.0) as u32;
            (target_w, target_h)
        }
        ImageResize::Width(target_w) => {
            let target_h = (h * (target_w as f64 / w)).round().max(1.0) as u32;
            (target_w, target_h)
        }
        ImageResize::Scale(factor) => {
            ((w * factor).round().max(1.0) as u32, (h * factor).round().max(1.0) as u32)
        }
    };
    image::imageops::resize(&image, target_w, target_h, FilterType::Triangle)
}

/// Extract and write representative still frames for each scene in
/// `scene_list`, reading frames from `source` (which is repositioned with
/// `seek`/`reset` as needed).
///
/// Returns, per scene, the list of output file paths written in sample
/// order. A failure writing one scene's images surfaces immediately as
/// `ScenecutError::Io`/`ScenecutError::Image`; any images already written for
/// prior scenes remain on disk.
pub fn save_images<S: FrameSource>(
    source: &mut S,
    scene_list: &[(FrameTimecode, FrameTimecode)],
    options: &SaveImagesOptions<'_>,
) -> Result<Vec<Vec<PathBuf>>> {
    std::fs::create_dir_all(options.output_dir)?;

    let video_name = source.name().to_string();
    let aspect_ratio = source.aspect_ratio();
    let mut all_paths = Vec::with_capacity(scene_list.len());

    for (scene_number, (start, end)) in scene_list.iter().enumerate() {
        let indices = sample_indices(start.get_frames(), end.get_frames(), options.num_images, options.margin as i64);
        let mut scene_paths = Vec::with_capacity(indices.len());

        for (image_number, &frame_index) in indices.iter().enumerate() {
            source.seek(FrameTimecode::from_frames(frame_index, start.fps())?)?;
            let frame = source
                .read()?
                .ok_or_else(|| ScenecutError::InvalidArgument(format!(
                    "frame source exhausted before frame {frame_index}"
                )))?;

            let mut image_buffer = frame_to_image_buffer(&frame);
            if let Some(resize) = options.resize {
                image_buffer = apply_resize(image_buffer, resize, aspect_ratio);
            }

            let filename = render_filename(
                options.filename_template,
                &video_name,
                scene_number + 1,
                image_number + 1,
                frame_index,
            );
            let path = options.output_dir.join(format!("{filename}.jpg"));
            image_buffer.save(&path)?;
            scene_paths.push(path);
        }

        log::debug!("wrote {} image(s) for scene {}", scene_paths.len(), scene_number + 1);
        all_paths.push(scene_paths);
    }

    Ok(all_paths)
}

use std::path::Path;

use ffmpeg_next::Rescale;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::shared::SendError;
use crate::video::domain::frame_source::FrameSource;

/// Seeks and decodes individual frames via ffmpeg-next.
///
/// Each call to [`FrameSource::read_frame`] seeks to the nearest preceding
/// keyframe, then decodes forward until the requested presentation time.
pub struct FfmpegFrameSource {
    state: Option<OpenState>,
}

struct OpenState {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    time_base: ffmpeg_next::Rational,
    start_pts: i64,
    fps: f64,
    width: u32,
    height: u32,
}

// Safety: a source is owned by exactly one worker thread at a time.
// The raw pointers inside ffmpeg types are never shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    pub fn new() -> Self {
        Self { state: None }
    }
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, SendError> {
        ffmpeg_next::init()?;

        let input = ffmpeg_next::format::input(path)?;

        let (stream_index, time_base, start_pts, fps, stream_frames, decoder) = {
            let stream = input
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or("No video stream found")?;

            let codec_ctx =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
            let decoder = codec_ctx.decoder().video()?;

            let rate = stream.rate();
            let fps = if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            };

            (
                stream.index(),
                stream.time_base(),
                stream.start_time().max(0),
                fps,
                stream.frames(),
                decoder,
            )
        };

        let total_frames = if stream_frames > 0 {
            stream_frames as usize
        } else {
            estimate_frame_count(input.duration(), fps)
        };

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        let metadata = VideoMetadata {
            name: video_name(path),
            fps,
            total_frames,
            width,
            height,
        };

        self.state = Some(OpenState {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_pts,
            fps,
            width,
            height,
        });

        Ok(metadata)
    }

    fn read_frame(&mut self, frame_number: usize) -> Result<Frame, SendError> {
        let state = self
            .state
            .as_mut()
            .ok_or("FfmpegFrameSource: not opened")?;
        if state.fps <= 0.0 {
            return Err("FfmpegFrameSource: unknown frame rate, cannot seek".into());
        }

        let target_pts = state.start_pts
            + frame_to_pts(frame_number, state.fps, state.time_base);
        let position = target_pts.rescale(state.time_base, ffmpeg_next::rescale::TIME_BASE);

        state.input.seek(position, ..position)?;
        state.decoder.flush();

        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();

        for (stream, packet) in state.input.packets() {
            if stream.index() != state.stream_index {
                continue;
            }
            if state.decoder.send_packet(&packet).is_err() {
                continue;
            }
            while state.decoder.receive_frame(&mut decoded).is_ok() {
                if reached(&decoded, target_pts) {
                    return to_frame(
                        &mut state.scaler,
                        &decoded,
                        state.width,
                        state.height,
                        frame_number,
                    );
                }
            }
        }

        state.decoder.send_eof()?;
        while state.decoder.receive_frame(&mut decoded).is_ok() {
            if reached(&decoded, target_pts) {
                return to_frame(
                    &mut state.scaler,
                    &decoded,
                    state.width,
                    state.height,
                    frame_number,
                );
            }
        }

        Err(format!("Frame {frame_number} lies past the end of the stream").into())
    }

    fn close(&mut self) {
        self.state = None;
    }
}

/// Frames without a timestamp are accepted as-is.
fn reached(decoded: &ffmpeg_next::util::frame::video::Video, target_pts: i64) -> bool {
    decoded.timestamp().map_or(true, |ts| ts >= target_pts)
}

fn frame_to_pts(frame_number: usize, fps: f64, time_base: ffmpeg_next::Rational) -> i64 {
    let seconds = frame_number as f64 / fps;
    let ticks_per_second = time_base.denominator() as f64 / time_base.numerator().max(1) as f64;
    (seconds * ticks_per_second).round() as i64
}

fn estimate_frame_count(duration_av: i64, fps: f64) -> usize {
    if duration_av <= 0 || fps <= 0.0 {
        return 0;
    }
    let seconds = duration_av as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE);
    (seconds * fps).floor() as usize
}

fn video_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn to_frame(
    scaler: &mut ffmpeg_next::software::scaling::Context,
    decoded: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
    frame_number: usize,
) -> Result<Frame, SendError> {
    let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
    scaler.run(decoded, &mut rgb_frame)?;
    let pixels = extract_rgb_pixels(&rgb_frame, width, height);
    Ok(Frame::new(pixels, width, height, 3, frame_number))
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// stripping per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

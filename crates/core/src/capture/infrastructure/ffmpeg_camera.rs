use std::path::Path;

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::frame::Frame;

/// Live camera feed via ffmpeg-next (libavdevice + libavcodec).
///
/// `source` is a device path (`/dev/video0`), a stream URL or a video file.
/// With `input_format` set (e.g. `v4l2`), the matching libavdevice demuxer is
/// used instead of probing. Every decoded frame is converted to RGB24.
pub struct FfmpegCamera {
    source: String,
    input_format: Option<String>,
    stream: Option<OpenStream>,
    frame_index: usize,
}

struct OpenStream {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    draining: bool,
}

// Safety: FfmpegCamera is owned by the capture thread once started.
// The raw pointers inside ffmpeg types are never shared across threads.
unsafe impl Send for FfmpegCamera {}

impl FfmpegCamera {
    pub fn new(source: impl Into<String>, input_format: Option<String>) -> Self {
        Self {
            source: source.into(),
            input_format,
            stream: None,
            frame_index: 0,
        }
    }

    fn open_input(&self) -> Result<ffmpeg_next::format::context::Input, Box<dyn std::error::Error>> {
        let path = Path::new(&self.source);
        let Some(name) = self.input_format.as_deref() else {
            return Ok(ffmpeg_next::format::input(&path)?);
        };

        ffmpeg_next::device::register_all();
        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == name)
            .ok_or_else(|| format!("ffmpeg input format '{name}' is not available"))?;

        match ffmpeg_next::format::open_with(
            &path,
            &ffmpeg_next::format::Format::Input(format),
            ffmpeg_next::Dictionary::new(),
        )? {
            ffmpeg_next::format::context::Context::Input(ictx) => Ok(ictx),
            ffmpeg_next::format::context::Context::Output(_) => {
                Err(format!("{} opened as an output", self.source).into())
            }
        }
    }
}

impl FrameSource for FfmpegCamera {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.stream.is_some() {
            return Ok(());
        }
        ffmpeg_next::init()?;

        let ictx = self.open_input()?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

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

        log::info!("Camera {} opened at {width}x{height}", self.source);
        self.stream = Some(OpenStream {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            draining: false,
        });
        self.frame_index = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        let stream = self.stream.as_mut().ok_or("FfmpegCamera: not opened")?;

        loop {
            if let Some(pixels) = stream.try_receive()? {
                let frame = Frame::new(pixels, stream.width, stream.height, 3, self.frame_index);
                self.frame_index += 1;
                return Ok(frame);
            }
            if stream.draining {
                return Err(format!("camera stream {} ended", self.source).into());
            }

            match stream.ictx.packets().next() {
                Some((s, packet)) => {
                    if s.index() != stream.stream_index {
                        continue;
                    }
                    if let Err(e) = stream.decoder.send_packet(&packet) {
                        log::debug!("Dropping undecodable packet: {e}");
                    }
                }
                None => {
                    let _ = stream.decoder.send_eof();
                    stream.draining = true;
                }
            }
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Camera {} closed", self.source);
        }
    }
}

impl OpenStream {
    fn try_receive(&mut self) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut rgb_frame)?;
        Ok(Some(extract_rgb_pixels(&rgb_frame, self.width, self.height)))
    }
}

/// Copies pixel rows out of an ffmpeg frame, dropping the stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}

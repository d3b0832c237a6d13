//! FFmpeg reader using ffmpeg-next
//!
//! Container/codec reader for filesystem sources. Video times expressed at
//! the stream's nominal frame rate are frame numbers; any other rate is
//! converted through seconds. Audio is resampled to interleaved `f32`.

use std::collections::BTreeMap;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::format::context::Input as FormatContext;
use ffmpeg_next::media::Type as MediaType;
use ffmpeg_next::software::resampling::Context as ResamplerContext;
use ffmpeg_next::software::scaling::{Context as ScalerContext, Flags as ScalerFlags};
use ffmpeg_next::util::frame::audio::Audio as AudioFrameFFmpeg;
use ffmpeg_next::util::frame::video::Video as VideoFrameFFmpeg;
use ffmpeg_next::{Packet, Rational};

use super::audio_frame::AudioBuffer;
use super::config::{DecoderConfig, PixelFormat};
use super::frame::Image;
use super::info::{AudioTrack, CodecInfo, MediaInfo, VideoTrack};
use super::{Reader, ReaderPlugin};
use crate::error::{Error, Result};
use crate::options::OptionsMap;
use crate::path::MediaPath;
use crate::time::{TimePoint, TimeRange};
use crate::unit::{AudioUnit, VideoUnit};

/// Forward distance below which decoding on is cheaper than seeking
const SEQUENTIAL_WINDOW_US: i64 = 2_000_000;

/// Packets read for one request before giving up
const MAX_PACKETS: usize = 2000;

/// Next packet of `stream_index`, or `None` at end of stream
fn next_packet(input: &mut FormatContext, stream_index: usize) -> Option<Packet> {
    loop {
        let (stream, packet) = input.packets().next()?;
        if stream.index() == stream_index {
            return Some(packet);
        }
    }
}

/// Convert PTS to microseconds
fn pts_to_us(pts: i64, time_base: Rational) -> i64 {
    if time_base.denominator() == 0 {
        return pts;
    }
    (pts as i128 * 1_000_000 * time_base.numerator() as i128 / time_base.denominator() as i128) as i64
}

fn decode_error(what: &str, e: ffmpeg::Error) -> Error {
    Error::DecodeFailed(format!("{}: {}", what, e))
}

/// Convert our PixelFormat to FFmpeg format
fn pixel_format_to_ffmpeg(format: PixelFormat) -> ffmpeg::format::Pixel {
    match format {
        PixelFormat::Bgra => ffmpeg::format::Pixel::BGRA,
        PixelFormat::Nv12 => ffmpeg::format::Pixel::NV12,
        PixelFormat::Yuv420p => ffmpeg::format::Pixel::YUV420P,
    }
}

fn plane(frame: &VideoFrameFFmpeg, index: usize, rows: usize) -> &[u8] {
    let data = frame.data(index);
    let size = (frame.stride(index) * rows).min(data.len());
    &data[..size]
}

/// Copy the planes of a converted frame into a packed image
fn to_image(frame: &VideoFrameFFmpeg, format: PixelFormat) -> Image {
    let height = frame.height() as usize;
    let chroma = height.div_ceil(2);

    let data = match format {
        PixelFormat::Bgra => plane(frame, 0, height).to_vec(),
        PixelFormat::Nv12 => [plane(frame, 0, height), plane(frame, 1, chroma)].concat(),
        PixelFormat::Yuv420p => [
            plane(frame, 0, height),
            plane(frame, 1, chroma),
            plane(frame, 2, chroma),
        ]
        .concat(),
    };

    Image::new(
        data,
        frame.width(),
        frame.height(),
        frame.stride(0) as u32,
        format,
    )
}

/// Extracts f32 samples from a packed f32 frame
fn extract_samples(frame: &AudioFrameFFmpeg, channels: u32) -> Vec<f32> {
    let count = frame.samples() * channels as usize;
    frame
        .data(0)
        .chunks_exact(4)
        .take(count)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

struct VideoStream {
    index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<ScalerContext>,
    target_format: PixelFormat,
    time_base: Rational,
    /// Exact frame rate as `(numerator, denominator)`
    frame_rate: (i64, i64),
    /// Rounded frame rate; times at this rate are frame numbers
    nominal_rate: i64,
    /// End of the last returned frame, for sequential reads
    cursor_us: Option<i64>,
}

impl VideoStream {
    fn open(input: &FormatContext, index: usize, config: &DecoderConfig) -> Result<Self> {
        let stream = input
            .stream(index)
            .ok_or_else(|| Error::InvalidFormat(format!("Video stream {} not found", index)))?;
        let params = stream.parameters();
        let time_base = stream.time_base();

        let rate = stream.avg_frame_rate();
        let frame_rate = if rate.numerator() > 0 && rate.denominator() > 0 {
            (rate.numerator() as i64, rate.denominator() as i64)
        } else {
            (24, 1)
        };
        let nominal_rate = ((frame_rate.0 as f64 / frame_rate.1 as f64).round() as i64).max(1);

        let codec = ffmpeg::decoder::find(params.id()).ok_or_else(|| {
            Error::CodecNotSupported(format!("No decoder for codec: {:?}", params.id()))
        })?;
        log::info!("Using decoder: {} ({})", codec.name(), codec.description());

        let mut decoder_ctx = CodecContext::new_with_codec(codec);
        decoder_ctx
            .set_parameters(params)
            .map_err(|e| decode_error("Failed to set codec parameters", e))?;
        if config.thread_count > 0 {
            unsafe {
                (*decoder_ctx.as_mut_ptr()).thread_count = config.thread_count as i32;
            }
        }
        let decoder = decoder_ctx
            .decoder()
            .video()
            .map_err(|e| decode_error("Failed to open video decoder", e))?;

        let target = pixel_format_to_ffmpeg(config.output_pixel_format);
        let scaler = if decoder.format() != target {
            let scaler = ScalerContext::get(
                decoder.format(),
                decoder.width(),
                decoder.height(),
                target,
                decoder.width(),
                decoder.height(),
                ScalerFlags::BILINEAR,
            )
            .map_err(|e| decode_error("Failed to create scaler", e))?;
            log::debug!("Scaler initialized: {:?} -> {:?}", decoder.format(), target);
            Some(scaler)
        } else {
            None
        };

        Ok(Self {
            index,
            decoder,
            scaler,
            target_format: config.output_pixel_format,
            time_base,
            frame_rate,
            nominal_rate,
            cursor_us: None,
        })
    }

    fn frame_duration_us(&self) -> i64 {
        self.frame_rate.1 * 1_000_000 / self.frame_rate.0
    }

    fn target_us(&self, time: TimePoint) -> i64 {
        if time.rate() == self.nominal_rate {
            let (num, den) = self.frame_rate;
            (time.value() as i128 * den as i128 * 1_000_000 / num as i128) as i64
        } else {
            time.to_micros()
        }
    }

    /// Decode the frame covering `target_us`
    fn decode_at(&mut self, input: &mut FormatContext, time: TimePoint) -> Result<Image> {
        let target_us = self.target_us(time);
        let sequential = matches!(
            self.cursor_us,
            Some(cursor) if target_us >= cursor && target_us - cursor < SEQUENTIAL_WINDOW_US
        );
        if !sequential {
            input.seek(target_us, ..target_us).map_err(|e| {
                log::warn!("Seek to {} us failed: {}", target_us, e);
                Error::SeekFailed(time)
            })?;
            self.decoder.flush();
            self.cursor_us = None;
        }

        let frame_us = self.frame_duration_us();
        let mut packets = 0;
        let mut eof_sent = false;
        loop {
            let mut decoded = VideoFrameFFmpeg::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    // Timestamp must be read before scaling
                    let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
                    let pts_us = pts_to_us(pts, self.time_base);
                    if pts_us + frame_us <= target_us {
                        continue;
                    }
                    self.cursor_us = Some(pts_us + frame_us);
                    let image = match self.scaler.as_mut() {
                        Some(scaler) => {
                            let mut scaled = VideoFrameFFmpeg::empty();
                            scaler
                                .run(&decoded, &mut scaled)
                                .map_err(|e| decode_error("Failed to scale frame", e))?;
                            to_image(&scaled, self.target_format)
                        }
                        None => to_image(&decoded, self.target_format),
                    };
                    return Ok(image);
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(ffmpeg::Error::Eof) => {
                    self.cursor_us = None;
                    return Err(Error::TruncatedStream(format!("no frame at {}", time)));
                }
                Err(e) => return Err(decode_error("Failed to receive frame", e)),
            }

            if packets >= MAX_PACKETS {
                return Err(Error::DecodeFailed(format!(
                    "no frame at {} after {} packets",
                    time, packets
                )));
            }
            match next_packet(input, self.index) {
                Some(packet) => {
                    packets += 1;
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| decode_error("Failed to send packet", e))?;
                }
                None if !eof_sent => {
                    eof_sent = true;
                    let _ = self.decoder.send_eof();
                }
                None => {
                    self.cursor_us = None;
                    return Err(Error::TruncatedStream(format!("no frame at {}", time)));
                }
            }
        }
    }
}

struct AudioStream {
    index: usize,
    decoder: ffmpeg::decoder::Audio,
    resampler: ResamplerContext,
    time_base: Rational,
    channels: u32,
    sample_rate: u32,
}

impl AudioStream {
    fn open(input: &FormatContext, index: usize) -> Result<Self> {
        let stream = input
            .stream(index)
            .ok_or_else(|| Error::InvalidFormat(format!("Audio stream {} not found", index)))?;
        let time_base = stream.time_base();
        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().audio())
            .map_err(|e| decode_error("Failed to open audio decoder", e))?;

        // Anything beyond stereo is downmixed
        let (layout, channels) = match decoder.channels() {
            1 => (ffmpeg::ChannelLayout::MONO, 1),
            _ => (ffmpeg::ChannelLayout::STEREO, 2),
        };
        let sample_rate = decoder.rate();
        let resampler = ResamplerContext::get(
            decoder.format(),
            decoder.channel_layout(),
            sample_rate,
            ffmpeg::format::Sample::F32(ffmpeg::format::sample::Type::Packed),
            layout,
            sample_rate,
        )
        .map_err(|e| decode_error("Failed to create resampler", e))?;

        Ok(Self {
            index,
            decoder,
            resampler,
            time_base,
            channels,
            sample_rate,
        })
    }

    /// Decode exactly the samples of `range`; a short tail is padded with
    /// silence, a range past the end of the stream is an error.
    fn decode_range(&mut self, input: &mut FormatContext, range: TimeRange) -> Result<AudioBuffer> {
        let start_us = range.start().to_micros();
        let end_us = range.end().to_micros();
        let rate = self.sample_rate as i64;
        let channels = self.channels as usize;
        let wanted = ((end_us - start_us).max(0) as i128 * rate as i128 / 1_000_000) as usize * channels;

        input
            .seek(start_us, ..start_us)
            .map_err(|_| Error::SeekFailed(range.start()))?;
        self.decoder.flush();

        let mut samples: Vec<f32> = Vec::with_capacity(wanted);
        let mut packets = 0;
        let mut eof_sent = false;
        loop {
            let mut decoded = AudioFrameFFmpeg::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
                    let pts_us = pts_to_us(pts, self.time_base);
                    let mut resampled = AudioFrameFFmpeg::empty();
                    self.resampler
                        .run(&decoded, &mut resampled)
                        .map_err(|e| decode_error("Resampling failed", e))?;
                    let frame_samples = extract_samples(&resampled, self.channels);

                    let skip = if pts_us < start_us {
                        ((start_us - pts_us) * rate / 1_000_000) as usize * channels
                    } else {
                        0
                    };
                    samples.extend(frame_samples.into_iter().skip(skip));
                    if samples.len() >= wanted {
                        samples.truncate(wanted);
                        return Ok(AudioBuffer::new(samples, self.channels, self.sample_rate));
                    }
                    continue;
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(decode_error("Failed to receive audio frame", e)),
            }

            if packets >= MAX_PACKETS {
                return Err(Error::DecodeFailed(format!("no audio for {}", range)));
            }
            match next_packet(input, self.index) {
                Some(packet) => {
                    packets += 1;
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| decode_error("Failed to send audio packet", e))?;
                }
                None if !eof_sent => {
                    eof_sent = true;
                    let _ = self.decoder.send_eof();
                }
                None => break,
            }
        }

        if samples.is_empty() {
            return Err(Error::TruncatedStream(format!("no audio for {}", range)));
        }
        samples.resize(wanted, 0.0);
        Ok(AudioBuffer::new(samples, self.channels, self.sample_rate))
    }
}

/// Reader over one media file
pub struct FFmpegReader {
    input: FormatContext,
    video: Option<VideoStream>,
    audio: Option<AudioStream>,
}

// SAFETY: the reader is moved onto one worker thread and used only there;
// none of its FFmpeg contexts are shared with another thread.
unsafe impl Send for FFmpegReader {}

impl FFmpegReader {
    /// Open a file for reading
    pub fn open<P: AsRef<Path>>(path: P, config: &DecoderConfig) -> Result<Self> {
        let path_ref = path.as_ref();

        // Initialize FFmpeg (safe to call multiple times)
        ffmpeg::init().map_err(|e| Error::Io(format!("FFmpeg init failed: {}", e)))?;

        let input = ffmpeg::format::input(&path_ref).map_err(|e| {
            if e.to_string().contains("No such file") {
                Error::FileNotFound(path_ref.to_path_buf())
            } else {
                Error::InvalidFormat(e.to_string())
            }
        })?;
        log::debug!("Opened file: {:?}", path_ref);

        let video_index = input.streams().best(MediaType::Video).map(|s| s.index());
        let audio_index = input.streams().best(MediaType::Audio).map(|s| s.index());

        let video = video_index
            .map(|index| VideoStream::open(&input, index, config))
            .transpose()?;
        let audio = match audio_index.map(|index| AudioStream::open(&input, index)) {
            Some(Ok(audio)) => Some(audio),
            Some(Err(e)) => {
                // A broken audio track still leaves the video readable
                log::warn!("Audio disabled for {:?}: {}", path_ref, e);
                None
            }
            None => None,
        };

        if video.is_none() && audio.is_none() {
            return Err(Error::InvalidFormat(format!(
                "No video or audio stream in {}",
                path_ref.display()
            )));
        }

        Ok(Self {
            input,
            video,
            audio,
        })
    }

    fn duration_us(&self) -> i64 {
        self.input.duration() * 1_000_000 / ffmpeg::ffi::AV_TIME_BASE as i64
    }

    /// Map common pixel format codes to names
    fn pixel_format_name(params: &ffmpeg::codec::Parameters) -> String {
        let format = unsafe { (*params.as_ptr()).format };
        match format {
            0 => "yuv420p".to_string(),
            3 => "rgb24".to_string(),
            4 => "yuv422p".to_string(),
            5 => "yuv444p".to_string(),
            23 => "nv12".to_string(),
            28 => "bgra".to_string(),
            _ => format!("pix_fmt_{}", format),
        }
    }

    fn codec_info(id: ffmpeg::codec::Id) -> CodecInfo {
        match ffmpeg::decoder::find(id) {
            Some(codec) => CodecInfo {
                name: codec.name().to_string(),
                long_name: codec.description().to_string(),
            },
            None => CodecInfo::unknown(),
        }
    }
}

impl Reader for FFmpegReader {
    fn info(&mut self) -> Result<MediaInfo> {
        let mut video_tracks = Vec::new();
        let mut audio_tracks = Vec::new();

        for stream in self.input.streams() {
            let params = stream.parameters();
            match params.medium() {
                MediaType::Video => {
                    let rate = stream.avg_frame_rate();
                    let fps = if rate.denominator() > 0 {
                        rate.numerator() as f64 / rate.denominator() as f64
                    } else {
                        0.0
                    };
                    video_tracks.push(VideoTrack {
                        index: stream.index(),
                        codec: Self::codec_info(params.id()),
                        width: unsafe { (*params.as_ptr()).width } as u32,
                        height: unsafe { (*params.as_ptr()).height } as u32,
                        frame_rate: fps,
                        pixel_format: Self::pixel_format_name(&params),
                    });
                }
                MediaType::Audio => {
                    audio_tracks.push(AudioTrack {
                        index: stream.index(),
                        codec: Self::codec_info(params.id()),
                        sample_rate: unsafe { (*params.as_ptr()).sample_rate } as u32,
                        channels: unsafe { (*params.as_ptr()).ch_layout.nb_channels } as u32,
                        language_code: stream.metadata().get("language").map(|s| s.to_string()),
                    });
                }
                _ => {}
            }
        }

        let metadata: BTreeMap<String, String> = self
            .input
            .metadata()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let container_format = self
            .input
            .format()
            .name()
            .split(',')
            .next()
            .unwrap_or("unknown")
            .to_string();

        let duration_us = self.duration_us().max(0);
        let video_time = match &self.video {
            Some(video) => {
                let (num, den) = video.frame_rate;
                let frames = (duration_us as i128 * num as i128 / (den as i128 * 1_000_000)) as i64;
                TimeRange::new(
                    TimePoint::new(0, video.nominal_rate),
                    TimePoint::new(frames, video.nominal_rate),
                )
            }
            None => TimeRange::default(),
        };
        let audio_time = match &self.audio {
            Some(audio) => {
                let rate = audio.sample_rate as i64;
                TimeRange::new(
                    TimePoint::new(0, rate),
                    TimePoint::new(duration_us * rate / 1_000_000, rate),
                )
            }
            None => TimeRange::default(),
        };

        Ok(MediaInfo {
            video_time,
            audio_time,
            container_format,
            video_tracks,
            audio_tracks,
            metadata,
        })
    }

    fn decode_video(&mut self, time: TimePoint, _options: &OptionsMap) -> Result<VideoUnit> {
        let video = self
            .video
            .as_mut()
            .ok_or_else(|| Error::DecodeFailed("no video stream".to_string()))?;
        let image = video.decode_at(&mut self.input, time)?;
        Ok(VideoUnit::single(time, image))
    }

    fn decode_audio(&mut self, range: TimeRange, _options: &OptionsMap) -> Result<AudioUnit> {
        let audio = self
            .audio
            .as_mut()
            .ok_or_else(|| Error::DecodeFailed("no audio stream".to_string()))?;
        let buffer = audio.decode_range(&mut self.input, range)?;
        // The shared demuxer moved; the next video read must seek
        if let Some(video) = self.video.as_mut() {
            video.cursor_us = None;
        }
        Ok(AudioUnit::single(range.start().seconds(), buffer))
    }
}

/// Plugin opening common container formats through FFmpeg
#[derive(Debug, Default)]
pub struct FFmpegPlugin;

impl FFmpegPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl ReaderPlugin for FFmpegPlugin {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn extensions(&self) -> &[&str] {
        &[
            "mov", "mp4", "m4v", "mkv", "webm", "avi", "mxf", "mpg", "mpeg", "ts", "wav", "mp3",
            "aac", "m4a", "flac", "ogg",
        ]
    }

    fn open(&self, path: &MediaPath, init_options: &OptionsMap) -> Result<Box<dyn Reader>> {
        let file = path
            .as_path()
            .ok_or_else(|| Error::UnsupportedFormat(format!("{} is not a file", path)))?;
        let config = DecoderConfig::from_options(init_options);
        Ok(Box::new(FFmpegReader::open(file, &config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pts_conversion() {
        let time_base = Rational::new(1, 90000);
        // 90000 pts @ 1/90000 = 1 second = 1000000 us
        assert_eq!(pts_to_us(90000, time_base), 1_000_000);
        assert_eq!(pts_to_us(5, Rational::new(1, 0)), 5);
    }

    #[test]
    fn test_pixel_format_conversion() {
        assert_eq!(pixel_format_to_ffmpeg(PixelFormat::Bgra), ffmpeg::format::Pixel::BGRA);
        assert_eq!(pixel_format_to_ffmpeg(PixelFormat::Nv12), ffmpeg::format::Pixel::NV12);
    }

    #[test]
    fn test_memory_sources_rejected() {
        let plugin = FFmpegPlugin::new();
        let err = plugin
            .open(&MediaPath::memory("clip.mov", vec![0u8; 4]), &OptionsMap::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_open_garbage_file() {
        let file = tempfile::Builder::new().suffix(".mov").tempfile().unwrap();
        std::fs::write(file.path(), b"definitely not a movie").unwrap();
        let result = FFmpegReader::open(file.path(), &DecoderConfig::default());
        assert!(result.err().unwrap().is_open_error());
    }
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{AAC_HEADER_SIZE, AAC_PROBE_WINDOW, MPEG_HEADER_SIZE, MPEG_PROBE_WINDOW};

/// Elementary stream container carried to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// AAC in ADTS framing
    Aac,
    /// MPEG-1/2/2.5 audio, layers I-III
    Mpeg,
}

impl FrameFormat {
    pub const fn header_size(self) -> usize {
        match self {
            FrameFormat::Aac => AAC_HEADER_SIZE,
            FrameFormat::Mpeg => MPEG_HEADER_SIZE,
        }
    }

    pub const fn probe_window(self) -> usize {
        match self {
            FrameFormat::Aac => AAC_PROBE_WINDOW,
            FrameFormat::Mpeg => MPEG_PROBE_WINDOW,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            FrameFormat::Aac => "AAC",
            FrameFormat::Mpeg => "MPEG",
        }
    }

    pub const fn content_type(self) -> &'static str {
        match self {
            FrameFormat::Aac => "audio/aacp",
            FrameFormat::Mpeg => "audio/mpeg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MpegLayer {
    I,
    II,
    III,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    /// Advertised channel count; the stereo variants all collapse to 2
    pub const fn channels(self) -> u8 {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }
}

/// MPEG-only header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MpegFields {
    pub version: MpegVersion,
    pub layer: MpegLayer,
    pub channel_mode: ChannelMode,
    pub bitrate_kbps: u32,
    pub padding: bool,
    pub crc_present: bool,
}

/// AAC-only header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AacFields {
    pub profile: u8,
    pub channel_config: u8,
    pub protection_absent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderFields {
    Aac(AacFields),
    Mpeg(MpegFields),
}

/// One validated frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameHeader {
    pub format: FrameFormat,
    pub sample_rate: u32,
    /// Whole frame, header included
    pub frame_length: usize,
    pub samples_per_frame: u32,
    pub fields: HeaderFields,
}

impl FrameHeader {
    pub fn channels(&self) -> u8 {
        match self.fields {
            HeaderFields::Mpeg(m) => m.channel_mode.channels(),
            HeaderFields::Aac(a) => a.channel_config,
        }
    }

    pub fn bitrate_kbps(&self) -> Option<u32> {
        match self.fields {
            HeaderFields::Mpeg(m) => Some(m.bitrate_kbps),
            HeaderFields::Aac(_) => None,
        }
    }

    /// Bytes between the fixed header and the payload that belong to a CRC
    pub fn crc_len(&self) -> usize {
        match self.fields {
            HeaderFields::Aac(a) if !a.protection_absent => crate::constants::AAC_CRC_SIZE,
            _ => 0,
        }
    }
}

/// Stream description produced once per file by the probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreamParameters {
    pub format: FrameFormat,
    pub sample_rate: u32,
    pub samples_per_frame: u32,
    pub channels: u8,
    pub total_frames: u64,
    pub average_bitrate_kbps: f64,
    pub first_frame_offset: u64,
    pub file_size: u64,
    /// Last per-frame bitrate seen while walking MPEG files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_bitrate_kbps: Option<u32>,
}

impl StreamParameters {
    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 * self.samples_per_frame as f64 / self.sample_rate as f64
    }

    pub fn duration_ms(&self) -> i64 {
        (self.duration_secs() * 1000.0) as i64
    }

    /// Frames per delivery iteration, a little over one second of audio
    pub fn frames_per_batch(&self) -> usize {
        frames_per_batch(self.sample_rate, self.samples_per_frame)
    }

    pub fn advertised(&self) -> Advertised {
        Advertised {
            content_type: self.format.content_type(),
            bitrate_kbps: self.average_bitrate_kbps.round() as u32,
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }
}

pub fn frames_per_batch(sample_rate: u32, samples_per_frame: u32) -> usize {
    (sample_rate / samples_per_frame.max(1)) as usize + 1
}

/// Server software on the other end of the push connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServerFlavor {
    Icecast,
    Shoutcast,
}

/// Audio parameters announced in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advertised {
    pub content_type: &'static str,
    pub bitrate_kbps: u32,
    pub channels: u8,
    pub sample_rate: u32,
}

/// How the audio reaches the frame reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Read ADTS/MPEG files directly
    File,
    /// Pipe each file through the external encoder
    Transcode,
}

/// A source file handed over by the playlist collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub path: PathBuf,
    /// Used verbatim as stream metadata when present
    pub title: Option<String>,
}

impl Track {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), title: None }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Producer of tracks, e.g. a playlist
pub trait TrackSource {
    fn first(&mut self) -> Option<Track>;
    fn next(&mut self) -> Option<Track>;
}

/// Fixed list of tracks, optionally repeated forever
pub struct TrackList {
    tracks: Vec<Track>,
    cursor: usize,
    repeat: bool,
}

impl TrackList {
    pub fn new(tracks: Vec<Track>, repeat: bool) -> Self {
        Self { tracks, cursor: 0, repeat }
    }
}

impl TrackSource for TrackList {
    fn first(&mut self) -> Option<Track> {
        self.cursor = 0;
        self.tracks.first().cloned()
    }

    fn next(&mut self) -> Option<Track> {
        if self.tracks.is_empty() {
            return None;
        }
        self.cursor += 1;
        if self.cursor >= self.tracks.len() {
            if !self.repeat {
                return None;
            }
            self.cursor = 0;
        }
        self.tracks.get(self.cursor).cloned()
    }
}

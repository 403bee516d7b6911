//! Constants for ADTS/MPEG audio framing, pacing and the ingest protocols

/// ADTS constants
pub const AAC_HEADER_SIZE: usize = 7;
pub const AAC_CRC_SIZE: usize = 2;
pub const AAC_SAMPLES_PER_FRAME: u32 = 1024;
pub const AAC_MIN_FRAME_LENGTH: usize = 7;
pub const AAC_MAX_FRAME_LENGTH: usize = 5000;
pub const AAC_PROBE_WINDOW: usize = 50_000;

/// Sampling frequency index table; zero entries are invalid
pub const AAC_SAMPLE_RATES: [u32; 16] = [
    96000, 88200, 64000, 48000,
    44100, 32000, 24000, 22050,
    16000, 12000, 11025, 8000,
    7350, 0, 0, 0,
];

/// MPEG audio constants
pub const MPEG_HEADER_SIZE: usize = 4;
pub const MPEG_PROBE_WINDOW: usize = 100_000;

/// Bitrates in kbps, one row per (version, layer) family
pub const MPEG_BITRATES: [[u32; 15]; 5] = [
    // MPEG1 layer I
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    // MPEG1 layer II
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    // MPEG1 layer III
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    // MPEG2/2.5 layer I
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    // MPEG2/2.5 layer II & III
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

/// Sample rates, four entries per version (MPEG1, MPEG2, MPEG2.5)
pub const MPEG_SAMPLE_RATES: [u32; 12] = [
    44100, 48000, 32000, 0,
    22050, 24000, 16000, 0,
    11025, 12000, 8000, 0,
];

/// ID3v2 tag constants
pub const ID3_MAGIC: &[u8; 3] = b"ID3";
pub const ID3_HEADER_SIZE: usize = 10;
pub const ID3_FOOTER_SIZE: usize = 10;

/// Pacing constants (milliseconds)
pub const PACE_CATCH_UP_MS: i64 = 900;
pub const PACE_STEADY_MS: i64 = 975;
pub const PACE_SHED_MS: i64 = 1100;
pub const PACE_LOW_WATER_OFFSET_MS: i64 = 100;
pub const PROGRESS_LOG_AFTER_MS: i64 = 1500;

/// Encoder watchdog
pub const WATCHDOG_POLL_MS: u64 = 1000;
pub const WATCHDOG_STALL_MS: u64 = 8000;

/// Ingest protocol constants
pub const SHOUTCAST_ACK: &str = "OK2";
pub const ICECAST_OK_STATUS: &str = "200";
pub const MAX_RESPONSE_BYTES: usize = 1024;
pub const USER_AGENT: &str = concat!("streamcaster/", env!("CARGO_PKG_VERSION"));
pub const METADATA_USER_AGENT: &str = "(Mozilla Compatible)";

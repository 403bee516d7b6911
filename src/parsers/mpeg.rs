//! MPEG audio (MP1/MP2/MP3) frame header parser

use bitstream_io::{BigEndian, BitRead, BitReader};

use crate::constants::{MPEG_BITRATES, MPEG_HEADER_SIZE, MPEG_SAMPLE_RATES};
use crate::error::HeaderError;
use crate::types::{
    ChannelMode, FrameFormat, FrameHeader, HeaderFields, MpegFields, MpegLayer, MpegVersion,
};

struct RawMpeg {
    sync: u16,
    version: u8,
    layer: u8,
    protection_bit: bool,
    bitrate_index: u8,
    sample_rate_index: u8,
    padding: bool,
    channel_mode: u8,
}

fn read_raw(data: &[u8]) -> std::io::Result<RawMpeg> {
    let mut br = BitReader::endian(data, BigEndian);
    let sync = br.read::<11, u16>()?;
    let version = br.read::<2, u8>()?;
    let layer = br.read::<2, u8>()?;
    let protection_bit = br.read_bit()?;
    let bitrate_index = br.read::<4, u8>()?;
    let sample_rate_index = br.read::<2, u8>()?;
    let padding = br.read_bit()?;
    br.skip(1)?; // private bit
    let channel_mode = br.read::<2, u8>()?;
    Ok(RawMpeg {
        sync,
        version,
        layer,
        protection_bit,
        bitrate_index,
        sample_rate_index,
        padding,
        channel_mode,
    })
}

fn version_from_bits(bits: u8) -> Option<MpegVersion> {
    match bits {
        0b00 => Some(MpegVersion::Mpeg25),
        0b10 => Some(MpegVersion::Mpeg2),
        0b11 => Some(MpegVersion::Mpeg1),
        _ => None,
    }
}

fn layer_from_bits(bits: u8) -> Option<MpegLayer> {
    match bits {
        0b01 => Some(MpegLayer::III),
        0b10 => Some(MpegLayer::II),
        0b11 => Some(MpegLayer::I),
        _ => None,
    }
}

fn bitrate_kbps(version: MpegVersion, layer: MpegLayer, index: u8) -> u32 {
    let row = match (version, layer) {
        (MpegVersion::Mpeg1, MpegLayer::I) => 0,
        (MpegVersion::Mpeg1, MpegLayer::II) => 1,
        (MpegVersion::Mpeg1, MpegLayer::III) => 2,
        (_, MpegLayer::I) => 3,
        (_, _) => 4,
    };
    MPEG_BITRATES[row][index as usize]
}

fn sample_rate(version: MpegVersion, index: u8) -> u32 {
    let base = match version {
        MpegVersion::Mpeg1 => 0,
        MpegVersion::Mpeg2 => 4,
        MpegVersion::Mpeg25 => 8,
    };
    MPEG_SAMPLE_RATES[base + index as usize]
}

/// Samples carried by one frame of the given version/layer
pub fn mpeg_samples_per_frame(version: MpegVersion, layer: MpegLayer) -> u32 {
    match (version, layer) {
        (_, MpegLayer::I) => 384,
        (_, MpegLayer::II) => 1152,
        (MpegVersion::Mpeg1, MpegLayer::III) => 1152,
        (_, MpegLayer::III) => 576,
    }
}

/// Whole frame length in bytes; bitrate in bits per second
pub fn mpeg_frame_length(
    version: MpegVersion,
    layer: MpegLayer,
    bitrate: u32,
    sample_rate: u32,
    padding: bool,
) -> usize {
    let (bitrate, sample_rate, padding) = (bitrate as u64, sample_rate as u64, padding as u64);
    let len = match (version, layer) {
        (_, MpegLayer::I) => (12 * bitrate / sample_rate) * 4 + padding * 4,
        (_, MpegLayer::II) | (MpegVersion::Mpeg1, MpegLayer::III) => {
            144 * bitrate / sample_rate + padding
        }
        (_, MpegLayer::III) => 72 * bitrate / sample_rate + padding,
    };
    len as usize
}

/// Parse a 4-byte MPEG audio header
pub fn parse_mpeg_header(data: &[u8]) -> Result<FrameHeader, HeaderError> {
    if data.len() < MPEG_HEADER_SIZE {
        return Err(HeaderError::Truncated(data.len()));
    }
    let raw = read_raw(&data[..MPEG_HEADER_SIZE]).map_err(|_| HeaderError::Truncated(data.len()))?;

    if raw.sync != 0x7FF {
        return Err(HeaderError::BadSync);
    }
    let version = version_from_bits(raw.version).ok_or(HeaderError::ReservedVersion)?;
    let layer = layer_from_bits(raw.layer).ok_or(HeaderError::ReservedLayer)?;
    if raw.bitrate_index == 0 || raw.bitrate_index == 0x0F {
        return Err(HeaderError::BadBitrateIndex(raw.bitrate_index));
    }
    if raw.sample_rate_index == 3 {
        return Err(HeaderError::BadSampleRateIndex);
    }

    let bitrate_kbps = bitrate_kbps(version, layer, raw.bitrate_index);
    let sample_rate = sample_rate(version, raw.sample_rate_index);
    let frame_length =
        mpeg_frame_length(version, layer, bitrate_kbps * 1000, sample_rate, raw.padding);
    if frame_length == 0 {
        return Err(HeaderError::BadBitrateIndex(raw.bitrate_index));
    }

    let channel_mode = match raw.channel_mode {
        0 => ChannelMode::Stereo,
        1 => ChannelMode::JointStereo,
        2 => ChannelMode::DualChannel,
        _ => ChannelMode::Mono,
    };

    Ok(FrameHeader {
        format: FrameFormat::Mpeg,
        sample_rate,
        frame_length,
        samples_per_frame: mpeg_samples_per_frame(version, layer),
        fields: HeaderFields::Mpeg(MpegFields {
            version,
            layer,
            channel_mode,
            bitrate_kbps,
            padding: raw.padding,
            crc_present: !raw.protection_bit,
        }),
    })
}

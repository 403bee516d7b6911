//! Synthetic frames for unit tests

use crate::parsers::parse_mpeg_header;

pub fn adts_header(
    profile: u8,
    sf_index: u8,
    channels: u8,
    frame_length: u16,
    protection_absent: bool,
) -> [u8; 7] {
    [
        0xFF,
        0xF0 | protection_absent as u8,
        (profile << 6) | (sf_index << 2) | ((channels >> 2) & 0x01),
        ((channels & 0x03) << 6) | ((frame_length >> 11) & 0x03) as u8,
        ((frame_length >> 3) & 0xFF) as u8,
        (((frame_length & 0x07) as u8) << 5) | 0x1F,
        0xFC,
    ]
}

/// One LC stereo 44.1 kHz frame with a zero payload
pub fn adts_frame(frame_length: u16) -> Vec<u8> {
    let mut frame = adts_header(1, 4, 2, frame_length, true).to_vec();
    frame.resize(frame_length as usize, 0);
    frame
}

pub fn adts_stream(frames: usize, frame_length: u16) -> Vec<u8> {
    (0..frames).flat_map(|_| adts_frame(frame_length)).collect()
}

pub fn mpeg_header(
    version: u8,
    layer: u8,
    bitrate_index: u8,
    sample_rate_index: u8,
    padding: bool,
    channel_mode: u8,
) -> [u8; 4] {
    [
        0xFF,
        0xE0 | (version << 3) | (layer << 1) | 0x01,
        (bitrate_index << 4) | (sample_rate_index << 2) | ((padding as u8) << 1),
        channel_mode << 6,
    ]
}

/// MPEG1 layer III 128 kbps 44.1 kHz joint stereo frame (417 bytes)
pub fn mp3_frame() -> Vec<u8> {
    let header = mpeg_header(0b11, 0b01, 9, 0, false, 1);
    let len = parse_mpeg_header(&header).map(|h| h.frame_length).unwrap_or(4);
    let mut frame = header.to_vec();
    frame.resize(len, 0);
    frame
}

pub fn mp3_stream(frames: usize) -> Vec<u8> {
    (0..frames).flat_map(|_| mp3_frame()).collect()
}

//! Frame header parsers for the supported elementary streams
//!
//! Every parser is a pure function of the header bytes: it either returns a
//! fully validated [`FrameHeader`] or the first field that made it invalid.

mod aac;
mod id3;
mod mpeg;

pub use aac::{adts_sync_length, parse_adts_header};
pub use id3::{id3v2_tag_len, skip_id3v2_tags, syncsafe_u32};
pub use mpeg::{mpeg_frame_length, mpeg_samples_per_frame, parse_mpeg_header};

use std::io::{self, Read};

use crate::error::HeaderError;
use crate::types::{FrameFormat, FrameHeader};

/// Parse and validate one frame header of the given format
pub fn parse_header(format: FrameFormat, data: &[u8]) -> Result<FrameHeader, HeaderError> {
    match format {
        FrameFormat::Aac => parse_adts_header(data),
        FrameFormat::Mpeg => parse_mpeg_header(data),
    }
}

/// Frame length of a valid header, `None` for anything else
pub fn validate_header(format: FrameFormat, data: &[u8]) -> Option<usize> {
    parse_header(format, data).ok().map(|h| h.frame_length)
}

/// Frame length implied by a syncword match. ADTS carries its length
/// explicitly, so the remaining fields are left for [`parse_header`] to judge;
/// an MPEG length needs every field, so it takes a fully valid header.
pub fn sync_frame_length(format: FrameFormat, data: &[u8]) -> Option<usize> {
    match format {
        FrameFormat::Aac => adts_sync_length(data),
        FrameFormat::Mpeg => validate_header(format, data),
    }
}

/// Blocking read until `buf` is full or the reader ends
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

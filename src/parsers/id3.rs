//! ID3v2 tag detection, used to step over tags that precede ADTS data

use std::io::{self, Read, Seek, SeekFrom};

use super::read_up_to;
use crate::constants::{ID3_FOOTER_SIZE, ID3_HEADER_SIZE, ID3_MAGIC};

/// Decode a 4-byte syncsafe integer (7 significant bits per byte)
pub fn syncsafe_u32(bytes: [u8; 4]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, b| (acc << 7) | (*b & 0x7F) as u32)
}

/// Total length of the ID3v2 tag starting at `data`, header and footer included
pub fn id3v2_tag_len(data: &[u8]) -> Option<usize> {
    if data.len() < ID3_HEADER_SIZE || &data[..3] != ID3_MAGIC {
        return None;
    }
    let flags = data[5];
    let size = syncsafe_u32([data[6], data[7], data[8], data[9]]) as usize;
    let footer = if flags & 0x10 != 0 { ID3_FOOTER_SIZE } else { 0 };
    Some(ID3_HEADER_SIZE + size + footer)
}

/// Skip every consecutive ID3v2 tag from the current position.
/// Returns the absolute offset of the first byte after the tags.
pub fn skip_id3v2_tags<R: Read + Seek>(reader: &mut R) -> io::Result<u64> {
    let mut offset = reader.stream_position()?;
    loop {
        let mut header = [0u8; ID3_HEADER_SIZE];
        let n = read_up_to(reader, &mut header)?;
        match id3v2_tag_len(&header[..n]) {
            Some(len) => {
                offset += len as u64;
                reader.seek(SeekFrom::Start(offset))?;
            }
            None => {
                reader.seek(SeekFrom::Start(offset))?;
                return Ok(offset);
            }
        }
    }
}

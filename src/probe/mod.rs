//! Stream probe: locate the first real frame and measure the whole file

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::FormatError;
use crate::parsers::{parse_header, read_up_to, skip_id3v2_tags, sync_frame_length};
use crate::types::{FrameFormat, StreamParameters};

/// Probe `path` on the blocking pool
pub async fn probe(path: impl AsRef<Path>, format: FrameFormat) -> Result<StreamParameters, FormatError> {
    let path = path.as_ref().to_path_buf();
    let task_path = path.clone();
    tokio::task::spawn_blocking(move || probe_file(&task_path, format))
        .await
        .map_err(|e| FormatError::Unreadable {
            path,
            source: std::io::Error::other(e),
        })?
}

/// Find the first frame, check its fixed fields and count every frame
pub fn probe_file(path: &Path, format: FrameFormat) -> Result<StreamParameters, FormatError> {
    let unreadable = |source: std::io::Error| FormatError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let meta = std::fs::metadata(path).map_err(|_| FormatError::NotFound(path.to_path_buf()))?;
    if !meta.is_file() {
        return Err(FormatError::NotFound(path.to_path_buf()));
    }
    let file_size = meta.len();
    let mut reader = BufReader::new(File::open(path).map_err(unreadable)?);

    let data_start = match format {
        FrameFormat::Aac => skip_id3v2_tags(&mut reader).map_err(unreadable)?,
        FrameFormat::Mpeg => 0,
    };

    let window_size = format.probe_window();
    let mut window = Vec::with_capacity(window_size);
    (&mut reader)
        .take(window_size as u64)
        .read_to_end(&mut window)
        .map_err(unreadable)?;
    let window_reaches_eof = data_start + window.len() as u64 >= file_size;

    let relative = find_first_frame(format, &window, window_reaches_eof).ok_or(
        FormatError::NoFrameFound {
            format: format.name(),
            window: window_size,
        },
    )?;
    let first_frame_offset = data_start + relative as u64;
    debug!(path = %path.display(), offset = first_frame_offset, "first frame found");

    let first = parse_header(format, &window[relative..]).map_err(|source| {
        FormatError::InvalidFirstFrame {
            offset: first_frame_offset,
            source,
        }
    })?;

    reader
        .seek(SeekFrom::Start(first_frame_offset))
        .map_err(unreadable)?;
    let walk = walk_frames(&mut reader, format, first_frame_offset, file_size).map_err(unreadable)?;
    if walk.frames == 0 {
        return Err(FormatError::NoFrames);
    }

    let mut params = StreamParameters {
        format,
        sample_rate: first.sample_rate,
        samples_per_frame: first.samples_per_frame,
        channels: first.channels(),
        total_frames: walk.frames,
        average_bitrate_kbps: 0.0,
        first_frame_offset,
        file_size,
        last_bitrate_kbps: walk.last_bitrate_kbps,
    };
    let seconds = params.duration_secs();
    params.average_bitrate_kbps = (file_size - first_frame_offset) as f64 / seconds * 8.0 / 1000.0;

    debug!(
        path = %path.display(),
        format = format.name(),
        frames = params.total_frames,
        samplerate = params.sample_rate,
        channels = params.channels,
        spf = params.samples_per_frame,
        playtime_secs = seconds as u64,
        bitrate_kbps = params.average_bitrate_kbps as u64,
        "probed"
    );
    Ok(params)
}

/// Offset of the first sync confirmed by the frames that follow it.
/// AAC needs two confirming headers, MPEG one; a chain that ends exactly
/// at the end of the file also counts as confirmed. The candidate's own
/// fields are checked afterwards so a reserved value is reported as such.
fn find_first_frame(format: FrameFormat, window: &[u8], window_reaches_eof: bool) -> Option<usize> {
    let confirmations = match format {
        FrameFormat::Aac => 2,
        FrameFormat::Mpeg => 1,
    };
    (0..window.len())
        .filter(|&i| window[i] == 0xFF)
        .find(|&i| match sync_frame_length(format, &window[i..]) {
            Some(len) => confirmed(format, window, i + len, confirmations, window_reaches_eof),
            None => false,
        })
}

fn confirmed(
    format: FrameFormat,
    window: &[u8],
    mut pos: usize,
    confirmations: usize,
    window_reaches_eof: bool,
) -> bool {
    for _ in 0..confirmations {
        if pos == window.len() && window_reaches_eof {
            return true;
        }
        let Some(rest) = window.get(pos..) else {
            return false;
        };
        match sync_frame_length(format, rest) {
            Some(len) => pos += len,
            None => return false,
        }
    }
    true
}

struct Walk {
    frames: u64,
    last_bitrate_kbps: Option<u32>,
}

/// Count complete valid frames from the current position to end of file
fn walk_frames<R: Read + Seek>(
    reader: &mut BufReader<R>,
    format: FrameFormat,
    start: u64,
    file_size: u64,
) -> std::io::Result<Walk> {
    let header_size = format.header_size();
    let mut header = [0u8; 8];
    let header = &mut header[..header_size];
    let mut pos = start;
    let mut walk = Walk {
        frames: 0,
        last_bitrate_kbps: None,
    };

    loop {
        if read_up_to(reader, header)? < header_size {
            break;
        }
        pos += header_size as u64;

        let frame = match parse_header(format, header) {
            Ok(frame) => frame,
            Err(_) => {
                reader.seek_relative(1 - header_size as i64)?;
                pos -= header_size as u64 - 1;
                continue;
            }
        };

        let crc = frame.crc_len();
        let payload = frame.frame_length.saturating_sub(header_size + crc);
        let skip = (crc + payload) as u64;
        if pos + skip > file_size {
            break;
        }
        reader.seek_relative(skip as i64)?;
        pos += skip;

        walk.frames += 1;
        if let Some(bitrate) = frame.bitrate_kbps() {
            walk.last_bitrate_kbps = Some(bitrate);
        }
    }
    Ok(walk)
}

/// Existence and readability check used before handing a path to the encoder
pub fn check_readable(path: &Path) -> Result<PathBuf, FormatError> {
    let meta = std::fs::metadata(path).map_err(|_| FormatError::NotFound(path.to_path_buf()))?;
    if !meta.is_file() {
        return Err(FormatError::NotFound(path.to_path_buf()));
    }
    File::open(path).map_err(|source| FormatError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

//! Frame reader: pulls whole frames out of a byte source and resyncs on garbage
//!
//! A source is either seekable (a file), in which case a bad header is retried
//! one byte further by stepping the read position back, or forward-only (an
//! encoder pipe), in which case the already-read window is slid in memory.

use std::future::Future;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, ReadBuf};
use tracing::{debug, warn};

use crate::error::HeaderError;
use crate::parsers::parse_header;
use crate::stats::ReadStats;
use crate::types::{FrameFormat, FrameHeader};

/// Byte source a [`FrameReader`] can pull from
pub trait FrameSource: AsyncRead + Unpin + Send {
    /// Move the read position back by `n` bytes.
    /// Returns `false` when the source cannot seek.
    fn step_back(&mut self, n: u64) -> impl Future<Output = io::Result<bool>> + Send;

    /// Read into `buf` from `skip` bytes ahead without moving the read position.
    /// Returns the bytes read, or `None` when the source cannot seek.
    fn peek_ahead(
        &mut self,
        skip: u64,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<Option<usize>>> + Send;
}

/// File-like source that supports relative seeks
pub struct SeekableSource<R> {
    inner: R,
}

impl<R> SeekableSource<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R> AsyncRead for SeekableSource<R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<R> FrameSource for SeekableSource<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    async fn step_back(&mut self, n: u64) -> io::Result<bool> {
        self.inner.seek(SeekFrom::Current(-(n as i64))).await?;
        Ok(true)
    }

    async fn peek_ahead(&mut self, skip: u64, buf: &mut [u8]) -> io::Result<Option<usize>> {
        self.inner.seek(SeekFrom::Current(skip as i64)).await?;
        let n = read_full(&mut self.inner, buf).await?;
        self.inner
            .seek(SeekFrom::Current(-((skip + n as u64) as i64)))
            .await?;
        Ok(Some(n))
    }
}

/// Forward-only source such as a subprocess pipe
pub struct PipeSource<R> {
    inner: R,
}

impl<R> PipeSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R> AsyncRead for PipeSource<R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<R> FrameSource for PipeSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn step_back(&mut self, _n: u64) -> io::Result<bool> {
        Ok(false)
    }

    async fn peek_ahead(&mut self, _skip: u64, _buf: &mut [u8]) -> io::Result<Option<usize>> {
        Ok(None)
    }
}

/// Up to N complete frames, exclusively owned by the caller
#[derive(Debug, Clone, Default)]
pub struct FrameBatch {
    pub data: Bytes,
    /// Complete frames in `data`; a trailing partial frame is not counted
    pub frames: usize,
    pub first_header: Option<FrameHeader>,
    /// The source ended while filling this batch
    pub end_of_stream: bool,
}

impl FrameBatch {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub struct FrameReader<S> {
    source: S,
    format: FrameFormat,
    in_sync: bool,
    /// Absolute offset of the next byte to be consumed
    pos: u64,
    /// Window bytes a forward-only source has to replay
    carry: Vec<u8>,
    stats: ReadStats,
}

impl<S: FrameSource> FrameReader<S> {
    pub fn new(source: S, format: FrameFormat) -> Self {
        Self::with_offset(source, format, 0)
    }

    /// Reader over a source already positioned at `offset`
    pub fn with_offset(source: S, format: FrameFormat, offset: u64) -> Self {
        Self {
            source,
            format,
            in_sync: true,
            pos: offset,
            carry: Vec::with_capacity(format.header_size()),
            stats: ReadStats::default(),
        }
    }

    pub fn stats(&self) -> &ReadStats {
        &self.stats
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read up to `count` frames. Running out of input is not an error:
    /// the batch simply holds fewer frames, possibly plus a partial one.
    pub async fn read_frames(&mut self, count: usize) -> io::Result<FrameBatch> {
        let header_size = self.format.header_size();
        let mut out = BytesMut::with_capacity(count * 512);
        let mut window = [0u8; 8];
        let window = &mut window[..header_size];
        let mut batch = FrameBatch::default();

        while batch.frames < count {
            if !self.fill_window(window).await? {
                batch.end_of_stream = true;
                break;
            }

            let header = match parse_header(self.format, window) {
                Ok(header) => header,
                Err(reason) => {
                    self.lose_sync(window, reason).await?;
                    continue;
                }
            };
            let payload_len = header.frame_length.saturating_sub(header_size);

            if let Err(reason) = self.check_next_header(payload_len, header_size).await? {
                self.lose_sync(window, reason).await?;
                continue;
            }

            if !self.in_sync {
                debug!(
                    format = self.format.name(),
                    offset = self.pos - header_size as u64,
                    "resynced"
                );
                self.stats.resyncs += 1;
                self.in_sync = true;
            }

            out.extend_from_slice(window);

            // frame_length covers the optional CRC, which is read as payload prefix
            let start = out.len();
            out.resize(start + payload_len, 0);
            let n = read_full(&mut self.source, &mut out[start..]).await?;
            out.truncate(start + n);
            self.pos += n as u64;
            self.stats.bytes += (header_size + n) as u64;

            if n < payload_len {
                batch.end_of_stream = true;
                break;
            }
            batch.frames += 1;
            batch.first_header.get_or_insert(header);
        }

        self.stats.frames += batch.frames as u64;
        batch.data = out.freeze();
        Ok(batch)
    }

    /// Fill the header window from the carry, then the source.
    /// Returns `false` when the source ends before the window is full.
    async fn fill_window(&mut self, window: &mut [u8]) -> io::Result<bool> {
        let carried = self.carry.len().min(window.len());
        window[..carried].copy_from_slice(&self.carry[..carried]);
        self.carry.drain(..carried);

        let n = read_full(&mut self.source, &mut window[carried..]).await?;
        let filled = carried + n;
        self.pos += filled as u64;
        Ok(filled == window.len())
    }

    /// An 11-bit MPEG sync shows up in junk often enough that a seekable
    /// source also checks the header where the next frame should start.
    /// Hitting the end of the source there confirms the frame.
    async fn check_next_header(
        &mut self,
        payload_len: usize,
        header_size: usize,
    ) -> io::Result<Result<(), HeaderError>> {
        if self.format != FrameFormat::Mpeg {
            return Ok(Ok(()));
        }
        let mut next = [0u8; 8];
        let next = &mut next[..header_size];
        match self.source.peek_ahead(payload_len as u64, next).await? {
            Some(n) if n == header_size => Ok(parse_header(self.format, next).map(|_| ())),
            _ => Ok(Ok(())),
        }
    }

    async fn lose_sync(
        &mut self,
        window: &[u8],
        reason: HeaderError,
    ) -> io::Result<()> {
        let header_size = window.len();
        let window_start = self.pos - header_size as u64;
        self.stats.bad_headers += 1;

        let rewound = self.source.step_back(header_size as u64 - 1).await?;
        if self.in_sync {
            self.in_sync = false;
            self.stats.bad_runs += 1;
            if rewound {
                debug!(
                    format = self.format.name(),
                    offset = window_start,
                    %reason,
                    "bad frame, resyncing"
                );
            } else {
                warn!(
                    format = self.format.name(),
                    offset = window_start,
                    %reason,
                    "bad frame on forward-only stream, skipping ahead"
                );
            }
        }
        if !rewound {
            self.carry.extend_from_slice(&window[1..]);
        }
        self.pos -= header_size as u64 - 1;
        Ok(())
    }
}

/// Read until `buf` is full or the source ends
pub(crate) async fn read_full<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::{adts_frame, adts_header, adts_stream, mp3_stream};
    use std::io::Cursor;

    fn seekable(data: Vec<u8>) -> FrameReader<SeekableSource<Cursor<Vec<u8>>>> {
        FrameReader::new(SeekableSource::new(Cursor::new(data)), FrameFormat::Aac)
    }

    fn pipe(data: Vec<u8>) -> FrameReader<PipeSource<Cursor<Vec<u8>>>> {
        FrameReader::new(PipeSource::new(Cursor::new(data)), FrameFormat::Aac)
    }

    #[tokio::test]
    async fn one_garbage_byte_resyncs_once() {
        let mut data = vec![0x00];
        data.extend(adts_stream(10, 200));
        let mut reader = seekable(data);

        let batch = reader.read_frames(10).await.unwrap();
        assert_eq!(batch.frames, 10);
        assert_eq!(batch.data.len(), 2000);
        assert_eq!(&batch.data[..200], &adts_frame(200)[..]);

        let stats = reader.stats();
        assert_eq!(stats.bad_runs, 1);
        assert_eq!(stats.bad_headers, 1);
        assert_eq!(stats.resyncs, 1);
    }

    #[tokio::test]
    async fn pipe_source_slides_without_seeking() {
        let mut data = vec![0x00];
        data.extend(adts_stream(10, 200));
        let mut reader = pipe(data);

        let batch = reader.read_frames(10).await.unwrap();
        assert_eq!(batch.frames, 10);
        assert_eq!(batch.data.len(), 2000);
        assert_eq!(reader.stats().bad_runs, 1);
        assert_eq!(reader.stats().resyncs, 1);
        assert_eq!(reader.position(), 2001);
    }

    #[tokio::test]
    async fn garbage_run_counts_once() {
        let mut data = adts_stream(3, 150);
        data.extend_from_slice(&[0x00, 0x12, 0x34, 0x56, 0x78]);
        data.extend(adts_stream(3, 150));
        let mut reader = seekable(data.clone());
        let batch = reader.read_frames(6).await.unwrap();
        assert_eq!(batch.frames, 6);
        assert_eq!(reader.stats().bad_runs, 1);
        assert_eq!(reader.stats().bad_headers, 5);
        assert_eq!(reader.stats().resyncs, 1);

        let mut reader = pipe(data);
        let batch = reader.read_frames(6).await.unwrap();
        assert_eq!(batch.frames, 6);
        assert_eq!(reader.stats().bad_headers, 5);
    }

    #[tokio::test]
    async fn batches_continue_where_they_stopped() {
        let mut reader = seekable(adts_stream(10, 100));
        let first = reader.read_frames(4).await.unwrap();
        assert_eq!(first.frames, 4);
        assert!(!first.end_of_stream);
        let second = reader.read_frames(4).await.unwrap();
        assert_eq!(second.frames, 4);
        let last = reader.read_frames(4).await.unwrap();
        assert_eq!(last.frames, 2);
        assert!(last.end_of_stream);
        let empty = reader.read_frames(4).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(reader.stats().frames, 10);
        assert_eq!(reader.stats().bad_runs, 0);
    }

    #[tokio::test]
    async fn partial_trailing_frame_is_kept_but_not_counted() {
        let mut data = adts_stream(2, 200);
        data.extend_from_slice(&adts_frame(200)[..120]);
        let mut reader = seekable(data);
        let batch = reader.read_frames(5).await.unwrap();
        assert_eq!(batch.frames, 2);
        assert_eq!(batch.data.len(), 520);
        assert!(batch.end_of_stream);
    }

    #[tokio::test]
    async fn truncated_header_ends_cleanly() {
        let mut data = adts_stream(1, 64);
        data.extend_from_slice(&[0xFF, 0xF1, 0x50]);
        let mut reader = pipe(data);
        let batch = reader.read_frames(3).await.unwrap();
        assert_eq!(batch.frames, 1);
        assert_eq!(batch.data.len(), 64);
    }

    #[tokio::test]
    async fn crc_protected_frames_pass_whole() {
        let mut frame = adts_header(1, 4, 2, 300, false).to_vec();
        frame.resize(300, 0xAA);
        let data: Vec<u8> = frame.iter().chain(frame.iter()).copied().collect();
        let mut reader = seekable(data);
        let batch = reader.read_frames(2).await.unwrap();
        assert_eq!(batch.frames, 2);
        assert_eq!(batch.data.len(), 600);
        assert_eq!(batch.first_header.map(|h| h.crc_len()), Some(2));
    }

    #[tokio::test]
    async fn mpeg_frames() {
        let mut data = vec![0x00, 0x00];
        data.extend(mp3_stream(5));
        let mut reader =
            FrameReader::new(SeekableSource::new(Cursor::new(data)), FrameFormat::Mpeg);
        let batch = reader.read_frames(39).await.unwrap();
        assert_eq!(batch.frames, 5);
        assert_eq!(batch.data.len(), 5 * 417);
        assert_eq!(batch.first_header.map(|h| h.samples_per_frame), Some(1152));
        assert_eq!(reader.stats().resyncs, 1);
    }

    #[tokio::test]
    async fn mpeg_lookalike_needs_a_following_header() {
        let audio = mp3_stream(5);
        let mut data = vec![0xFF, 0xFB, 0x90, 0x40, 0x00, 0x00];
        data.extend_from_slice(&audio);
        let mut reader =
            FrameReader::new(SeekableSource::new(Cursor::new(data)), FrameFormat::Mpeg);

        let batch = reader.read_frames(10).await.unwrap();
        assert_eq!(batch.frames, 5);
        assert_eq!(batch.data, audio);
        assert!(batch.end_of_stream);
        assert_eq!(reader.stats().resyncs, 1);
        assert_eq!(reader.stats().bad_runs, 1);
        assert_eq!(reader.stats().bad_headers, 6);
    }
}

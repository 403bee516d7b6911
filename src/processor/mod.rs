//! File-mode delivery loop: read a batch, push it, pace

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{CastError, Result};
use crate::network::{Dialer, IngestSession};
use crate::pacer::Pacer;
use crate::reader::{FrameReader, SeekableSource};
use crate::stats::DeliveryStats;
use crate::types::StreamParameters;

/// Stream one probed file over a connected session at real-time rate
pub async fn deliver_file<D: Dialer>(
    session: &mut IngestSession<D>,
    path: &Path,
    params: &StreamParameters,
    target_buffer_ms: u64,
    abort: &CancellationToken,
) -> Result<DeliveryStats> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(params.first_frame_offset)).await?;
    let mut reader = FrameReader::with_offset(
        SeekableSource::new(file),
        params.format,
        params.first_frame_offset,
    );

    let batch_size = params.frames_per_batch();
    let mut pacer = Pacer::new(target_buffer_ms, params.sample_rate, params.samples_per_frame);
    info!(
        path = %path.display(),
        frames = params.total_frames,
        batch = batch_size,
        "streaming file"
    );

    while pacer.state().frames_sent < params.total_frames {
        let iteration_start = Instant::now();
        let batch = reader.read_frames(batch_size).await?;
        if batch.is_empty() {
            break;
        }

        session.send(&batch.data).await?;
        let decision = pacer.record(batch.frames, batch.data.len(), iteration_start);

        if abort.is_cancelled() {
            return Err(CastError::Aborted);
        }
        if batch.end_of_stream {
            break;
        }
        pacer.wait(decision.sleep, abort).await?;
    }

    debug!(
        sent = pacer.state().frames_sent,
        expected = params.total_frames,
        "file read complete"
    );
    pacer.drain(params.duration_ms(), abort).await?;

    let mut stats = *pacer.stats();
    stats.read = *reader.stats();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, StreamConfig};
    use crate::network::MemoryDialer;
    use crate::testdata::adts_stream;
    use crate::types::FrameFormat;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn connected(dialer: &MemoryDialer) -> (IngestSession<MemoryDialer>, tokio::task::JoinHandle<Vec<u8>>) {
        let mut server = dialer.accept(1 << 16);
        let mut session = IngestSession::new(dialer.clone(), ServerConfig::default(), StreamConfig::default());
        let peer = tokio::spawn(async move {
            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            while !request.ends_with(b"\r\n\r\n") {
                server.read_exact(&mut byte).await.unwrap();
                request.push(byte[0]);
            }
            server.write_all(b"HTTP/1.0 200 OK\r\n\r\n").await.unwrap();
            let mut audio = Vec::new();
            server.read_to_end(&mut audio).await.unwrap();
            audio
        });
        let advertised = crate::types::Advertised {
            content_type: "audio/aacp",
            bitrate_kbps: 64,
            channels: 2,
            sample_rate: 44100,
        };
        session.ensure_connected(&advertised).await.unwrap();
        (session, peer)
    }

    #[tokio::test(start_paused = true)]
    async fn streams_every_frame_after_the_offset() {
        let mut data = vec![0u8; 17];
        data.extend(adts_stream(100, 150));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        let params = crate::probe::probe(file.path(), FrameFormat::Aac).await.unwrap();
        assert_eq!(params.first_frame_offset, 17);

        let dialer = MemoryDialer::new();
        let (mut session, peer) = connected(&dialer).await;
        let abort = CancellationToken::new();
        let started = Instant::now();

        let stats = deliver_file(&mut session, file.path(), &params, 1000, &abort).await.unwrap();
        session.close().await;
        let audio = peer.await.unwrap();

        assert_eq!(stats.frames_sent, 100);
        assert_eq!(stats.read.resyncs, 0);
        assert_eq!(audio, data[17..]);
        // the final wait covers the nominal playtime
        assert!(started.elapsed().as_millis() as i64 >= params.duration_ms());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_after_the_current_send() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&adts_stream(500, 150)).unwrap();
        let params = crate::probe::probe(file.path(), FrameFormat::Aac).await.unwrap();

        let dialer = MemoryDialer::new();
        let (mut session, _peer) = connected(&dialer).await;
        let abort = CancellationToken::new();
        abort.cancel();

        let err = deliver_file(&mut session, file.path(), &params, 1000, &abort).await.unwrap_err();
        assert!(err.is_aborted());
    }
}

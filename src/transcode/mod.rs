//! Encoder subprocess supervision
//!
//! The encoder writes ADTS or MPEG frames to stdout, which feeds a forward-only
//! [`FrameReader`]. Stderr is forwarded to the log and a watchdog kills the
//! encoder when an iteration makes no progress for too long.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStdout, Command};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::EncoderConfig;
use crate::constants::{WATCHDOG_POLL_MS, WATCHDOG_STALL_MS};
use crate::error::{CastError, Result};
use crate::network::{Dialer, IngestSession};
use crate::pacer::Pacer;
use crate::reader::{FrameBatch, FrameReader, PipeSource};
use crate::stats::DeliveryStats;
use crate::types::{Advertised, FrameFormat, frames_per_batch};

/// Encoder command line for `input`
pub fn encoder_args(encoder: &EncoderConfig, format: FrameFormat, input: &Path) -> Vec<OsString> {
    fn push(args: &mut Vec<OsString>, items: &[&str]) {
        args.extend(items.iter().map(OsString::from));
    }

    let mut args: Vec<OsString> = vec!["-i".into(), input.into()];

    if encoder.reencode {
        match format {
            FrameFormat::Aac => push(
                &mut args,
                &["-c:a", "libfdk_aac", "-profile:a", encoder.aac_profile.encoder_name()],
            ),
            FrameFormat::Mpeg => push(&mut args, &["-c:a", "libmp3lame"]),
        }
        let bitrate = (encoder.bitrate_kbps * 1000).to_string();
        let sample_rate = encoder.sample_rate.to_string();
        let channels = encoder.channels.to_string();
        push(
            &mut args,
            &["-b:a", &bitrate, "-cutoff", "20000", "-ar", &sample_rate, "-ac", &channels],
        );
    } else {
        push(&mut args, &["-c:a", "copy"]);
    }

    match format {
        FrameFormat::Aac => push(&mut args, &["-f", "adts"]),
        FrameFormat::Mpeg => push(&mut args, &["-f", "mp3", "-write_xing", "0", "-id3v2_version", "0"]),
    }
    push(&mut args, &["-loglevel", "fatal", "-"]);
    args
}

/// Parameters announced to the server for encoder output
pub fn advertised(encoder: &EncoderConfig, format: FrameFormat) -> Advertised {
    Advertised {
        content_type: format.content_type(),
        bitrate_kbps: encoder.bitrate_kbps,
        channels: encoder.channels,
        sample_rate: encoder.sample_rate,
    }
}

/// Time of the last loop iteration start, readable from the watchdog
struct Heartbeat {
    base: Instant,
    last_ms: AtomicU64,
}

impl Heartbeat {
    fn new() -> Self {
        Self {
            base: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn beat(&self) {
        self.last_ms
            .store(self.base.elapsed().as_millis() as u64, Ordering::Release);
    }

    fn silent_ms(&self) -> u64 {
        (self.base.elapsed().as_millis() as u64).saturating_sub(self.last_ms.load(Ordering::Acquire))
    }
}

pub struct TranscodeSupervisor {
    encoder: EncoderConfig,
    format: FrameFormat,
    target_buffer_ms: u64,
    watchdog_poll: Duration,
    stall_after: Duration,
}

impl TranscodeSupervisor {
    pub fn new(encoder: EncoderConfig, format: FrameFormat, target_buffer_ms: u64) -> Self {
        Self {
            encoder,
            format,
            target_buffer_ms,
            watchdog_poll: Duration::from_millis(WATCHDOG_POLL_MS),
            stall_after: Duration::from_millis(WATCHDOG_STALL_MS),
        }
    }

    pub fn with_watchdog(mut self, poll: Duration, stall_after: Duration) -> Self {
        self.watchdog_poll = poll;
        self.stall_after = stall_after;
        self
    }

    pub fn advertised(&self) -> Advertised {
        advertised(&self.encoder, self.format)
    }

    /// Run one encoder session for `input` over a connected ingest session.
    /// The child is reaped and the helper tasks are gone when this returns.
    pub async fn stream<D: Dialer>(
        &self,
        session: &mut IngestSession<D>,
        input: &Path,
        abort: &CancellationToken,
    ) -> Result<DeliveryStats> {
        let args = encoder_args(&self.encoder, self.format, input);
        info!(
            encoder = %self.encoder.path.display(),
            input = %input.display(),
            reencode = self.encoder.reencode,
            bitrate_kbps = self.encoder.bitrate_kbps,
            sample_rate = self.encoder.sample_rate,
            "starting encoder"
        );

        let mut child = Command::new(&self.encoder.path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("missing encoder stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("missing encoder stderr"))?;

        let heartbeat = Arc::new(Heartbeat::new());
        let stalled = CancellationToken::new();
        let mut tasks = JoinSet::new();
        tasks.spawn(forward_stderr(stderr));
        tasks.spawn(watchdog(
            Arc::clone(&heartbeat),
            stalled.clone(),
            self.watchdog_poll,
            self.stall_after,
        ));

        let mut reader = FrameReader::new(PipeSource::new(stdout), self.format);
        let mut pacer = Pacer::new(self.target_buffer_ms, 0, 0);

        let outcome = tokio::select! {
            res = self.pump(&mut reader, session, &mut pacer, &heartbeat, abort) => res,
            _ = abort.cancelled() => Err(CastError::Aborted),
            _ = stalled.cancelled() => Err(CastError::StalledEncoder {
                silent_ms: heartbeat.silent_ms(),
            }),
        };

        if outcome.is_err() {
            debug!("killing encoder");
            let _ = child.start_kill();
        }
        match child.wait().await {
            Ok(status) => debug!(%status, "encoder exited"),
            Err(e) => error!(error = %e, "cannot reap encoder"),
        }
        tasks.shutdown().await;

        let mut stats = *pacer.stats();
        stats.read = *reader.stats();
        outcome.map(|()| stats)
    }

    async fn pump<D: Dialer>(
        &self,
        reader: &mut FrameReader<PipeSource<ChildStdout>>,
        session: &mut IngestSession<D>,
        pacer: &mut Pacer,
        heartbeat: &Heartbeat,
        abort: &CancellationToken,
    ) -> Result<()> {
        let mut batch_size = None;

        loop {
            heartbeat.beat();
            let iteration_start = Instant::now();

            let batch = match batch_size {
                Some(count) => reader.read_frames(count).await?,
                None => {
                    let first = reader.read_frames(1).await?;
                    let Some(header) = first.first_header else {
                        debug!(bytes = first.data.len(), "encoder produced no frame");
                        return Ok(());
                    };
                    let count = frames_per_batch(header.sample_rate, header.samples_per_frame);
                    debug!(
                        sample_rate = header.sample_rate,
                        spf = header.samples_per_frame,
                        batch = count,
                        "encoder output format"
                    );
                    pacer.set_timing(header.sample_rate, header.samples_per_frame);
                    batch_size = Some(count);
                    let rest = reader.read_frames(count - 1).await?;
                    pacer.start_session();
                    concat(first, rest)
                }
            };

            if batch.is_empty() {
                debug!("encoder output ended");
                return Ok(());
            }

            session.send(&batch.data).await?;
            let decision = pacer.record(batch.frames, batch.data.len(), iteration_start);

            if abort.is_cancelled() {
                return Err(CastError::Aborted);
            }
            if batch.end_of_stream {
                debug!("encoder output ended");
                return Ok(());
            }
            pacer.wait(decision.sleep, abort).await?;
        }
    }
}

fn concat(first: FrameBatch, rest: FrameBatch) -> FrameBatch {
    let mut data = BytesMut::with_capacity(first.data.len() + rest.data.len());
    data.extend_from_slice(&first.data);
    data.extend_from_slice(&rest.data);
    FrameBatch {
        data: data.freeze(),
        frames: first.frames + rest.frames,
        first_header: first.first_header.or(rest.first_header),
        end_of_stream: rest.end_of_stream,
    }
}

/// Log encoder stderr line by line. Lines need not be UTF-8; the pipe is
/// drained until EOF so the encoder never writes into a closed pipe.
async fn forward_stderr(stderr: impl AsyncRead + Unpin) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => return,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                debug!(line = %text.trim_end(), "encoder");
            }
            Err(e) => {
                debug!(error = %e, "encoder stderr closed");
                return;
            }
        }
    }
}

async fn watchdog(heartbeat: Arc<Heartbeat>, stalled: CancellationToken, poll: Duration, stall_after: Duration) {
    let limit = stall_after.as_millis() as u64;
    loop {
        tokio::time::sleep(poll).await;
        let silent = heartbeat.silent_ms();
        if silent > limit {
            error!(silent_ms = silent, "encoder stalled, killing");
            stalled.cancel();
            return;
        }
    }
}

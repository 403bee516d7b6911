//! Track loop, retry policy and signal handling

use std::path::PathBuf;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{CastError, Result};
use crate::metadata;
use crate::network::{Dialer, IngestSession, TcpDialer};
use crate::probe::{check_readable, probe};
use crate::processor::deliver_file;
use crate::report::TrackReport;
use crate::transcode::TranscodeSupervisor;
use crate::types::{Advertised, StreamMode, Track, TrackSource};

/// Cancel `abort` on Ctrl-C or SIGTERM
pub fn spawn_signal_listener(abort: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("stop requested");
        abort.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        warn!(error = %e, "cannot listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                }
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            ctrl_c_only().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_only().await;
}

async fn ctrl_c_only() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Plays tracks over one ingest session
pub struct Caster<D: Dialer = TcpDialer> {
    config: Config,
    session: IngestSession<D>,
    abort: CancellationToken,
    /// Metadata announcements still in flight
    background: JoinSet<()>,
    json_reports: bool,
}

impl<D: Dialer> Caster<D> {
    pub fn new(config: Config, dialer: D, abort: CancellationToken) -> Self {
        let session = IngestSession::new(dialer, config.server.clone(), config.stream.clone());
        Self {
            config,
            session,
            abort,
            background: JoinSet::new(),
            json_reports: false,
        }
    }

    pub fn with_json_reports(mut self, enabled: bool) -> Self {
        self.json_reports = enabled;
        self
    }

    /// Play tracks until the source runs dry, the user aborts or the retry
    /// budget is spent. A bad file is skipped; anything else retries the same
    /// track after the configured delay.
    pub async fn run<T: TrackSource>(&mut self, tracks: &mut T) -> Result<Vec<TrackReport>> {
        let mut reports = Vec::new();
        let Some(mut track) = tracks.first() else {
            warn!("nothing to play");
            return Ok(reports);
        };
        let mut retries = 0u32;

        let outcome = loop {
            match self.play(&track).await {
                Ok(report) => {
                    retries = 0;
                    report.log();
                    if self.json_reports {
                        println!("{}", report.to_json());
                    }
                    reports.push(report);
                    match tracks.next() {
                        Some(next) => track = next,
                        None => break Ok(()),
                    }
                }
                Err(CastError::Aborted) => {
                    info!("aborted by user");
                    break Ok(());
                }
                Err(e) => {
                    retries += 1;
                    error!(path = %track.path.display(), error = %e, attempt = retries, "error streaming");
                    if retries >= self.config.server.connect_attempts {
                        info!("no more retries");
                        break Err(e);
                    }
                    if e.is_format() {
                        match tracks.next() {
                            Some(next) => track = next,
                            None => break Err(e),
                        }
                    }

                    let delay = self.config.server.retry_delay();
                    info!(delay_secs = delay.as_secs(), "retrying");
                    tokio::select! {
                        _ = self.abort.cancelled() => {
                            info!("aborted by user");
                            break Ok(());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        self.shutdown().await;
        outcome.map(|()| reports)
    }

    /// Stream a single track
    pub async fn play(&mut self, track: &Track) -> Result<TrackReport> {
        if self.abort.is_cancelled() {
            return Err(CastError::Aborted);
        }
        let started = Instant::now();
        let stream = &self.config.stream;
        let (mode, format) = (stream.mode, stream.format);

        let result = match mode {
            StreamMode::File => {
                let params = probe(&track.path, format).await?;
                self.connect(&params.advertised()).await?;
                self.announce(track);
                deliver_file(
                    &mut self.session,
                    &track.path,
                    &params,
                    self.config.stream.buffer_ms,
                    &self.abort,
                )
                .await
                .map(|stats| (stats, Some(params)))
            }
            StreamMode::Transcode => {
                let path = check_readable(&track.path)?;
                let supervisor =
                    TranscodeSupervisor::new(self.config.encoder.clone(), format, stream.buffer_ms);
                self.connect(&supervisor.advertised()).await?;
                self.announce(track);
                supervisor
                    .stream(&mut self.session, &path, &self.abort)
                    .await
                    .map(|stats| (stats, None))
            }
        };

        match result {
            Ok((stats, params)) => Ok(TrackReport::new(
                &track.path,
                mode,
                format,
                params.as_ref(),
                stats,
                started.elapsed().as_millis() as i64,
            )),
            Err(e) => {
                self.session.close().await;
                Err(e)
            }
        }
    }

    /// Connect unless already up; a stop request ends a hanging dial or handshake
    async fn connect(&mut self, advertised: &Advertised) -> Result<()> {
        tokio::select! {
            res = self.session.ensure_connected(advertised) => Ok(res?),
            _ = self.abort.cancelled() => Err(CastError::Aborted),
        }
    }

    fn announce(&mut self, track: &Track) {
        if !self.config.stream.update_metadata {
            return;
        }
        while self.background.try_join_next().is_some() {}
        let encoder: PathBuf = self.config.encoder.path.clone();
        self.background
            .spawn(metadata::announce(self.session.notifier(), track.clone(), encoder));
    }

    /// Close the connection and drop pending background work
    pub async fn shutdown(&mut self) {
        self.background.shutdown().await;
        self.session.close().await;
    }
}

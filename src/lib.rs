// src/lib.rs
pub mod caster {
    use tokio_util::sync::CancellationToken;

    use crate::config::Config;
    use crate::network::TcpDialer;
    use crate::report::TrackReport;
    use crate::types::{Track, TrackList};

    pub use crate::core::{Caster, spawn_signal_listener};

    pub struct Options {
        pub config: Config,
        pub tracks: Vec<Track>,
        /// Start over after the last track
        pub repeat: bool,
        /// Print a JSON report after every track
        pub report_json: bool,
    }

    /// Async entry-point; returns when the tracks run out, on Ctrl-C/SIGTERM,
    /// or once the retry budget is spent
    pub async fn run(opts: Options) -> anyhow::Result<Vec<TrackReport>> {
        opts.config.validate()?;
        let abort = CancellationToken::new();
        let signals = spawn_signal_listener(abort.clone());

        let mut caster =
            Caster::new(opts.config, TcpDialer::default(), abort).with_json_reports(opts.report_json);
        let mut tracks = TrackList::new(opts.tracks, opts.repeat);
        let result = caster.run(&mut tracks).await;
        signals.abort();
        Ok(result?)
    }
}

pub mod config;
pub mod constants;
pub mod error;
pub mod metadata;
pub mod network;
pub mod pacer;
pub mod parsers;
pub mod probe;
pub mod processor;
pub mod reader;
pub mod report;
pub mod stats;
pub mod transcode;
pub mod types;
mod core;

#[cfg(test)]
mod testdata;

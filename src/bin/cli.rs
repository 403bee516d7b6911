use std::path::PathBuf;

use clap::Parser;
use streamcaster::caster::{Options, run};
use streamcaster::config::{AacProfile, Config};
use streamcaster::types::{FrameFormat, ServerFlavor, StreamMode, Track};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(version, about = "Stream AAC/MP3 audio to Icecast or Shoutcast in real time")]
struct Opt {
    /// Audio files, played in order
    #[clap(required = true)]
    inputs: Vec<PathBuf>,

    /// Stream title sent instead of the file's tags
    #[clap(long)]
    title: Option<String>,

    /// JSON config file; flags below override it
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(long, value_enum)]
    server: Option<ServerFlavor>,

    #[clap(long)]
    host: Option<String>,

    #[clap(long)]
    port: Option<u16>,

    #[clap(long)]
    mount: Option<String>,

    #[clap(long)]
    password: Option<String>,

    #[clap(long, value_enum)]
    mode: Option<StreamMode>,

    #[clap(long, value_enum)]
    format: Option<FrameFormat>,

    /// Target server-side buffer in milliseconds
    #[clap(long)]
    buffer_ms: Option<u64>,

    /// Encoder binary used in transcode mode
    #[clap(long)]
    encoder: Option<PathBuf>,

    #[clap(long, value_enum)]
    aac_profile: Option<AacProfile>,

    /// Encoder bitrate in kbps
    #[clap(long)]
    bitrate: Option<u32>,

    /// Don't send stream title updates
    #[clap(long, default_value_t = false)]
    no_metadata: bool,

    /// Start over after the last input
    #[clap(long = "loop", default_value_t = false)]
    repeat: bool,

    /// Print a JSON report for every finished track
    #[clap(long, default_value_t = false)]
    report_json: bool,

    /// Debug logging
    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    /// Warnings and errors only
    #[clap(short, long, default_value_t = false, conflicts_with = "verbose")]
    quiet: bool,
}

impl Opt {
    fn into_config(self) -> anyhow::Result<(Config, Vec<Track>, bool, bool)> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(flavor) = self.server {
            cfg.server.flavor = flavor;
        }
        if let Some(host) = self.host {
            cfg.server.host = host;
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(mount) = self.mount {
            cfg.server.mount = mount;
        }
        if let Some(password) = self.password {
            cfg.server.password = password;
        }
        if let Some(mode) = self.mode {
            cfg.stream.mode = mode;
        }
        if let Some(format) = self.format {
            cfg.stream.format = format;
        }
        if let Some(buffer_ms) = self.buffer_ms {
            cfg.stream.buffer_ms = buffer_ms;
        }
        if let Some(encoder) = self.encoder {
            cfg.encoder.path = encoder;
        }
        if let Some(profile) = self.aac_profile {
            cfg.encoder.aac_profile = profile;
        }
        if let Some(bitrate) = self.bitrate {
            cfg.encoder.bitrate_kbps = bitrate;
        }
        if self.no_metadata {
            cfg.stream.update_metadata = false;
        }

        let tracks = self
            .inputs
            .into_iter()
            .map(|path| match &self.title {
                Some(title) => Track::new(path).with_title(title.clone()),
                None => Track::new(path),
            })
            .collect();
        Ok((cfg, tracks, self.repeat, self.report_json))
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "streamcaster=debug,info"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    init_logging(opt.verbose, opt.quiet);

    let (config, tracks, repeat, report_json) = opt.into_config()?;
    let reports = run(Options {
        config,
        tracks,
        repeat,
        report_json,
    })
    .await?;
    tracing::info!(tracks = reports.len(), "done");
    Ok(())
}

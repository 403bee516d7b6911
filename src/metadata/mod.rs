//! Track tags and stream title updates

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::network::{Dialer, MetadataNotifier};
use crate::types::Track;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: String,
    pub title: String,
}

/// `Artist - Title`, the title alone without an artist, else `fallback`
pub fn format_song(artist: &str, title: &str, fallback: &str) -> String {
    let song = if artist.is_empty() {
        title.to_string()
    } else {
        format!("{artist} - {title}")
    };
    if song.is_empty() { fallback.to_string() } else { song }
}

/// Global section of an ffmetadata dump
pub fn parse_ffmetadata(text: &str) -> TrackTags {
    let mut lower = TrackTags::default();
    let mut upper = TrackTags::default();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with('[') {
            break;
        }
        if line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = split_entry(line) else {
            continue;
        };
        let value = unescape(value);
        match key {
            "artist" => lower.artist = value,
            "ARTIST" => upper.artist = value,
            "title" => lower.title = value,
            "TITLE" => upper.title = value,
            _ => {}
        }
    }

    TrackTags {
        artist: if lower.artist.is_empty() { upper.artist } else { lower.artist },
        title: if lower.title.is_empty() { upper.title } else { lower.title },
    }
}

/// Split at the first unescaped `=`
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '=' if !escaped => return Some((&line[..i], &line[i + 1..])),
            _ => escaped = false,
        }
    }
    None
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Ask the encoder to dump the file's tags
pub async fn read_tags(encoder: &Path, file: &Path) -> io::Result<TrackTags> {
    debug!(encoder = %encoder.display(), file = %file.display(), "reading tags");
    let output = Command::new(encoder)
        .arg("-i")
        .arg(file)
        .args(["-f", "ffmetadata", "-"])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;
    if !output.status.success() {
        return Err(io::Error::other(format!(
            "tag reader exited with {}",
            output.status
        )));
    }
    let tags = parse_ffmetadata(&String::from_utf8_lossy(&output.stdout));
    debug!(artist = %tags.artist, title = %tags.title, "tags");
    Ok(tags)
}

/// Background task announcing a new track: a given title is sent verbatim,
/// otherwise tags are read from the file first
pub async fn announce<D: Dialer>(notifier: MetadataNotifier<D>, track: Track, encoder: PathBuf) {
    let tags = match track.title {
        Some(title) => TrackTags {
            artist: String::new(),
            title,
        },
        None => match read_tags(&encoder, &track.path).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(file = %track.path.display(), error = %e, "cannot read tags");
                return;
            }
        },
    };
    if let Err(e) = notifier.update_metadata(&tags.artist, &tags.title).await {
        warn!(error = %e, "metadata update failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, StreamConfig};
    use crate::network::{IngestSession, MemoryDialer};
    use tokio::io::AsyncReadExt;

    #[test]
    fn song_text() {
        assert_eq!(format_song("Artist", "Title", "Radio"), "Artist - Title");
        assert_eq!(format_song("", "Title", "Radio"), "Title");
        assert_eq!(format_song("", "", "Radio"), "Radio");
    }

    #[test]
    fn ffmetadata_dump() {
        let dump = ";FFMETADATA1\n\
                    ARTIST=Upper Artist\n\
                    title=Tea \\= Coffee\n\
                    encoder=Lavf60.3.100\n\
                    [CHAPTER]\n\
                    title=Chapter one\n";
        let tags = parse_ffmetadata(dump);
        assert_eq!(tags.artist, "Upper Artist");
        assert_eq!(tags.title, "Tea = Coffee");
    }

    #[test]
    fn lowercase_keys_win() {
        let tags = parse_ffmetadata("artist=a\nARTIST=B\nTITLE=T\n");
        assert_eq!(tags, TrackTags { artist: "a".into(), title: "T".into() });
    }

    #[tokio::test]
    async fn given_title_skips_tag_reading() {
        let dialer = MemoryDialer::new();
        let mut server = dialer.accept(4096);
        let session = IngestSession::new(dialer.clone(), ServerConfig::default(), StreamConfig::default());

        let track = Track::new("/nonexistent.aac").with_title("Live Set");
        announce(session.notifier(), track, PathBuf::from("/nonexistent/ffmpeg")).await;

        let mut request = String::new();
        server.read_to_string(&mut request).await.unwrap();
        assert!(request.contains("&song=Live%20Set HTTP/1.0"));
    }

    #[tokio::test]
    async fn missing_encoder_sends_nothing() {
        let dialer = MemoryDialer::new();
        let session = IngestSession::new(dialer.clone(), ServerConfig::default(), StreamConfig::default());
        announce(session.notifier(), Track::new("/nonexistent.aac"), PathBuf::from("/nonexistent/ffmpeg")).await;
        assert!(dialer.dialed().is_empty());
    }
}

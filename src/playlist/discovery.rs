use std::{future::Future, path::PathBuf};

use futures::future;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::DiscoveryError;

use super::Track;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub const DEFAULT_MAX_CANDIDATES: u32 = 10;

/// Existence check for a candidate track name.
pub trait TrackProber: Send + Sync {
    /// Where `name` can be played from, or `None` when nothing playable is
    /// there. Failures to look are answered with `None` as well.
    fn probe(&self, name: &str) -> impl Future<Output = Option<PathBuf>> + Send;
}

/// Resolves candidate names against a directory of audio files.
#[derive(Debug, Clone)]
pub struct DirectoryProber {
    root: PathBuf,
}

impl DirectoryProber {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TrackProber for DirectoryProber {
    fn probe(&self, name: &str) -> impl Future<Output = Option<PathBuf>> + Send {
        let path = self.root.join(name);
        async move {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() && meta.len() > 0 => Some(path),
                _ => None,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoveryConfig {
    pub prefix: String,
    pub extension: String,
    /// Highest ordinal probed.
    pub max_candidates: u32,
    /// Well-known names probed after the numbered sequence.
    pub extra_names: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            prefix: "music".into(),
            extension: "mp3".into(),
            max_candidates: DEFAULT_MAX_CANDIDATES,
            extra_names: ["background", "ambient", "focus", "chill"]
                .iter()
                .map(|stem| format!("{stem}.mp3"))
                .collect(),
        }
    }
}

impl DiscoveryConfig {
    pub fn candidate_name(&self, ordinal: u32) -> String {
        format!("{}{}.{}", self.prefix, ordinal, self.extension)
    }
}

/// Runs the discovery pass.
///
/// All candidates are probed concurrently and joined before anything is
/// decided. Numbered hits are then taken in ordinal order up to the first gap
/// that follows a hit, so `{1, 3}` yields only track 1 while `{2, 3}` yields
/// both. Hits among the well-known names are appended in configured order.
pub async fn discover<P: TrackProber>(
    prober: &P,
    config: &DiscoveryConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Track>, DiscoveryError> {
    let numbered = (1..=config.max_candidates).map(move |ordinal| {
        let name = config.candidate_name(ordinal);
        async move {
            let hit = prober.probe(&name).await;
            (ordinal, name, hit)
        }
    });
    let extras = config.extra_names.iter().map(move |name| async move {
        let hit = prober.probe(name).await;
        (name.clone(), hit)
    });

    let probes = future::join(future::join_all(numbered), future::join_all(extras));
    let (mut numbered, extras) = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            log_debug!("track discovery cancelled");
            return Err(DiscoveryError::Cancelled);
        }
        results = probes => results,
    };

    numbered.sort_by_key(|(ordinal, _, _)| *ordinal);

    let mut tracks: Vec<Track> = Vec::new();
    for (ordinal, name, hit) in numbered {
        match hit {
            Some(location) => tracks.push(Track {
                name,
                ordinal: Some(ordinal),
                location,
            }),
            None if !tracks.is_empty() => break,
            None => {}
        }
    }

    for (name, hit) in extras {
        let Some(location) = hit else { continue };
        if tracks.iter().any(|track| track.location == location) {
            continue;
        }
        tracks.push(Track {
            name,
            ordinal: None,
            location,
        });
    }

    log_info!("discovered {} background track(s)", tracks.len());
    Ok(tracks)
}

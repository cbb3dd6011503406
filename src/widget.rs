//! Read side for the streaming overlay: generated-video listing and one-shot play requests.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// How long a play request overrides the newest video.
pub const PLAY_REQUEST_TTL: Duration = Duration::from_secs(8);

/// True for plain `.mp4` file names made of ASCII letters, digits, `-`, `_` and `.`.
///
/// Every path built from an externally supplied name must pass this first.
pub fn is_safe_video_filename(filename: &str) -> bool {
    if filename.is_empty() {
        return false;
    }
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return false;
    }
    if !filename.to_ascii_lowercase().ends_with(".mp4") {
        return false;
    }
    filename
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// A generated video on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoEntry {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub created: DateTime<Local>,
}

/// Safe `.mp4` files in `dir`, newest first. A missing directory is empty.
pub fn list_videos(dir: &Path) -> Result<Vec<VideoEntry>, WidgetError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut videos = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let filename = entry.file_name().to_string_lossy().into_owned();
        if !is_safe_video_filename(&filename) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(created) = metadata.modified().or_else(|_| metadata.created()) else {
            continue;
        };

        videos.push(VideoEntry {
            filename,
            path: entry.path(),
            size: metadata.len(),
            created: created.into(),
        });
    }

    videos.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.filename.cmp(&a.filename)));
    Ok(videos)
}

/// An operator's request to show a specific clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayRequest {
    pub filename: String,
    pub timestamp: DateTime<Utc>,
}

/// The clip the overlay should show right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetVideo {
    pub filename: String,
    pub url: String,
    pub created: DateTime<Local>,
    pub size: u64,
    /// Served because of a play request rather than because it is the newest.
    pub requested: bool,
    pub total_videos: usize,
}

impl WidgetVideo {
    fn from_entry(entry: &VideoEntry, requested: bool, total_videos: usize) -> Self {
        Self {
            filename: entry.filename.clone(),
            url: format!("/videos/{}", entry.filename),
            created: entry.created,
            size: entry.size,
            requested,
            total_videos,
        }
    }
}

pub struct Widget {
    videos_dir: PathBuf,
    play_request: Mutex<Option<PlayRequest>>,
}

impl Widget {
    pub fn new(videos_dir: impl Into<PathBuf>) -> Self {
        Self {
            videos_dir: videos_dir.into(),
            play_request: Mutex::new(None),
        }
    }

    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }

    pub fn list_videos(&self) -> Vec<VideoEntry> {
        list_videos(&self.videos_dir).unwrap_or_else(|e| {
            log::error!("Error listing videos: {}", e);
            Vec::new()
        })
    }

    /// Ask the overlay to show `filename` for the next [`PLAY_REQUEST_TTL`].
    pub fn request_play(&self, filename: &str) -> Result<PlayRequest, WidgetError> {
        self.resolve(filename)?;
        let request = PlayRequest {
            filename: filename.to_string(),
            timestamp: Utc::now(),
        };
        *self
            .play_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request.clone());
        log::info!("Play requested: {}", filename);
        Ok(request)
    }

    pub fn latest_video(&self) -> Option<WidgetVideo> {
        self.latest_video_at(Utc::now())
    }

    /// The requested clip while its request is live, otherwise the newest clip.
    ///
    /// An expired request is cleared. A live one is left in place so several overlay
    /// clients can all pick it up.
    pub fn latest_video_at(&self, now: DateTime<Utc>) -> Option<WidgetVideo> {
        let videos = self.list_videos();

        let requested = {
            let mut slot = self.play_request.lock().unwrap_or_else(PoisonError::into_inner);
            let expired = slot.as_ref().is_some_and(|req| {
                now.signed_duration_since(req.timestamp)
                    .to_std()
                    .is_ok_and(|age| age > PLAY_REQUEST_TTL)
            });
            if expired {
                *slot = None;
            }
            slot.as_ref().map(|req| req.filename.clone())
        };

        if let Some(filename) = requested {
            if let Some(entry) = videos.iter().find(|v| v.filename == filename) {
                return Some(WidgetVideo::from_entry(entry, true, videos.len()));
            }
        }

        videos
            .first()
            .map(|entry| WidgetVideo::from_entry(entry, false, videos.len()))
    }

    /// Absolute path for a safe, existing video file.
    pub fn resolve_video_path(&self, filename: &str) -> Option<PathBuf> {
        match self.resolve(filename) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Cannot serve video {:?}: {}", filename, e);
                None
            }
        }
    }

    fn resolve(&self, filename: &str) -> Result<PathBuf, WidgetError> {
        if !is_safe_video_filename(filename) {
            return Err(WidgetError::UnsafeFilename(filename.to_string()));
        }
        let path = self.videos_dir.join(filename);
        if !path.is_file() {
            return Err(WidgetError::NotFound(filename.to_string()));
        }
        Ok(std::fs::canonicalize(&path)?)
    }
}

/// Errors from the widget's file access.
#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    #[error("Unsafe video filename: {0}")]
    UnsafeFilename(String),

    #[error("Video file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

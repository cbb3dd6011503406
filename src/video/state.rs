//! Live state of the most recent video generation.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::client::ProgressUpdate;
use crate::donation::DonationSnapshot;

/// Lifecycle status of a generation attempt.
///
/// The API reports `queued`, `waiting`, `active` and `generating` while a job runs; the
/// generator itself sets the rest. Any status string the API invents maps to `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenerationStatus {
    #[default]
    Idle,
    Starting,
    Queued,
    Waiting,
    Active,
    Generating,
    Completed,
    Downloading,
    Done,
    Timeout,
    Error,
    Other(String),
}

impl GenerationStatus {
    /// Parse a status string case-insensitively.
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "idle" => Self::Idle,
            "starting" => Self::Starting,
            "queued" => Self::Queued,
            "waiting" => Self::Waiting,
            "active" => Self::Active,
            "generating" => Self::Generating,
            "completed" => Self::Completed,
            "downloading" => Self::Downloading,
            "done" => Self::Done,
            "timeout" => Self::Timeout,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Queued => "queued",
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Downloading => "downloading",
            Self::Done => "done",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::Other(s) => s,
        }
    }

    /// Rough progress percentage shown by the overlay UI.
    pub fn progress(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Starting => 5,
            Self::Queued => 10,
            Self::Waiting => 15,
            Self::Active => 30,
            Self::Generating => 70,
            Self::Completed => 85,
            Self::Downloading => 90,
            Self::Done | Self::Timeout | Self::Error => 100,
            Self::Other(_) => 50,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Timeout | Self::Error)
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for GenerationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Progress percentage for a raw status string.
pub fn progress_for_status(status: &str) -> u8 {
    GenerationStatus::parse(status).progress()
}

/// The single record describing the latest generation attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationState {
    pub status: GenerationStatus,
    pub active: bool,
    pub generation_id: Option<String>,
    pub elapsed_secs: Option<u64>,
    pub video_url: Option<String>,
    pub video_path: Option<PathBuf>,
    pub error: Option<String>,
    pub donor: Option<String>,
    pub message: Option<String>,
    pub amount_converted: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl GenerationState {
    /// Fresh state for a new attempt; replaces whatever came before.
    pub fn starting(donation: &DonationSnapshot, amount_converted: f64) -> Self {
        Self {
            status: GenerationStatus::Starting,
            active: true,
            donor: Some(donation.username.clone()),
            message: Some(donation.message.clone()),
            amount_converted: Some(amount_converted),
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Merge a client progress report. Fields absent from the report are kept.
    pub fn apply(&mut self, update: &ProgressUpdate) {
        self.status = GenerationStatus::parse(&update.status);
        if update.elapsed_secs.is_some() {
            self.elapsed_secs = update.elapsed_secs;
        }
        if let Some(url) = &update.video_url {
            self.video_url = Some(url.clone());
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = GenerationStatus::Error;
        self.active = false;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn finish(&mut self, video_path: PathBuf) {
        self.status = GenerationStatus::Done;
        self.active = false;
        self.video_path = Some(video_path);
        self.finished_at = Some(Utc::now());
    }

    pub fn progress(&self) -> u8 {
        self.status.progress()
    }
}

/// State plus the derived progress percentage, as served to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationProgress {
    #[serde(flatten)]
    pub state: GenerationState,
    pub progress: u8,
}

impl From<GenerationState> for GenerationProgress {
    fn from(state: GenerationState) -> Self {
        let progress = state.progress();
        Self { state, progress }
    }
}

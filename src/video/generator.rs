//! VideoGenerator - turns a qualifying donation into one downloaded celebration clip.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::client::{AimlClient, GenerationOptions, ProgressUpdate, VideoApiError};
use super::prompt::{build_prompt, PromptSource};
use super::state::{GenerationProgress, GenerationState, GenerationStatus};
use crate::config::{Config, Settings};
use crate::donation::DonationSnapshot;
use crate::poller::CelebrationHandler;
use crate::widget::{self, VideoEntry};

/// Orchestrates a single generation attempt per call: prompt, start, wait, download.
///
/// There is no retry at any stage. The shared [`GenerationState`] describes the most
/// recent attempt and is overwritten by the next one.
pub struct VideoGenerator {
    client: Option<AimlClient>,
    settings: Settings,
    videos_dir: PathBuf,
    default_options: GenerationOptions,
    generation_count: AtomicU64,
    state: Mutex<GenerationState>,
    latest_video: Mutex<Option<PathBuf>>,
}

impl VideoGenerator {
    /// A generator without a client refuses every request.
    pub fn new(client: Option<AimlClient>, settings: Settings, videos_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            settings,
            videos_dir: videos_dir.into(),
            default_options: GenerationOptions::default(),
            generation_count: AtomicU64::new(0),
            state: Mutex::new(GenerationState::default()),
            latest_video: Mutex::new(None),
        }
    }

    /// Build the client and default options from the `[video]` section.
    pub fn from_config(config: &Config, settings: Settings) -> Self {
        let video = &config.video;
        let client = match video.api_key.as_deref() {
            Some(key) => match AimlClient::with_base_url(key.to_string(), video.api_base.clone()) {
                Ok(client) => Some(
                    client.with_model(video.model.clone()).with_poll_settings(
                        Duration::from_secs(video.poll_interval_secs.max(1)),
                        Duration::from_secs(video.max_wait_secs),
                    ),
                ),
                Err(e) => {
                    log::error!("Failed to create AIML client: {}", e);
                    None
                }
            },
            None => {
                log::warn!("AIML API key not configured; video generation disabled");
                None
            }
        };

        let options = GenerationOptions {
            resolution: video.resolution.clone(),
            duration: video.duration,
            negative_prompt: video.negative_prompt.clone(),
            seed: video.seed,
            enhance_prompt: Some(video.enhance_prompt),
            generate_audio: Some(video.generate_audio),
        };

        Self::new(client, settings, video.videos_dir.clone()).with_default_options(options)
    }

    pub fn with_default_options(mut self, options: GenerationOptions) -> Self {
        self.default_options = options;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.client.is_some()
    }

    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }

    pub fn set_system_prompt(&self, prompt: impl Into<String>) {
        self.settings.set_system_prompt(prompt);
    }

    /// The exact prompt that would be sent for this donation.
    pub fn build_prompt(
        &self,
        donation: &DonationSnapshot,
        amount_converted: f64,
        custom_prompt: Option<&str>,
    ) -> (String, PromptSource) {
        build_prompt(
            custom_prompt,
            &donation.message,
            || self.settings.video_prompt_template(amount_converted),
            &self.settings.system_prompt(),
        )
    }

    /// Generate a clip with the default options. Returns the local path on success.
    pub async fn generate(
        &self,
        donation: &DonationSnapshot,
        amount_converted: f64,
        custom_prompt: Option<&str>,
    ) -> Option<PathBuf> {
        let options = self.default_options.clone();
        self.generate_with_options(donation, amount_converted, custom_prompt, &options)
            .await
    }

    pub async fn generate_with_options(
        &self,
        donation: &DonationSnapshot,
        amount_converted: f64,
        custom_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Option<PathBuf> {
        let Some(client) = &self.client else {
            log::error!("{} is required for video generation", crate::config::AIML_API_KEY_ENV);
            return None;
        };

        match self
            .try_generate(client, donation, amount_converted, custom_prompt, options)
            .await
        {
            Ok(path) => {
                log::info!("Video successfully generated and saved: {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::error!("Video generation for {} failed: {}", donation.username, e);
                self.update_state(|state| state.fail(e.to_string()));
                None
            }
        }
    }

    async fn try_generate(
        &self,
        client: &AimlClient,
        donation: &DonationSnapshot,
        amount_converted: f64,
        custom_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<PathBuf, VideoApiError> {
        let count = self.generation_count.fetch_add(1, Ordering::SeqCst) + 1;
        let filename = format!("celebration_{}_{}.mp4", chrono::Utc::now().timestamp(), count);
        debug_assert!(widget::is_safe_video_filename(&filename));
        let video_path = self.videos_dir.join(&filename);

        log::info!(
            "Generating video for {:.2} {} donation from {}",
            amount_converted,
            self.settings.reference_currency(),
            donation.username
        );
        self.update_state(|state| *state = GenerationState::starting(donation, amount_converted));

        let (prompt, source) = self.build_prompt(donation, amount_converted, custom_prompt);
        log::info!("Prompt source: {:?} ({} chars)", source, prompt.chars().count());

        let generation_id = client.start_generation(&prompt, options).await?;
        self.update_state(|state| {
            state.generation_id = Some(generation_id.clone());
            if state.status == GenerationStatus::Starting {
                state.status = GenerationStatus::Queued;
            }
        });

        let on_progress = |update: &ProgressUpdate| self.on_progress(update);
        let video_url = client.wait_for_completion(&generation_id, &on_progress).await?;

        self.update_state(|state| {
            state.status = GenerationStatus::Downloading;
            state.video_url = Some(video_url.clone());
        });
        let path = client.download_video(&video_url, &video_path).await?;

        *self
            .latest_video
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(path.clone());
        self.update_state(|state| state.finish(path.clone()));
        Ok(path)
    }

    /// Merge a progress report from the client into the shared state.
    pub fn on_progress(&self, update: &ProgressUpdate) {
        self.update_state(|state| state.apply(update));
    }

    /// Current state plus its progress percentage.
    pub fn generation_status(&self) -> GenerationProgress {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .into()
    }

    pub fn latest_video_path(&self) -> Option<PathBuf> {
        self.latest_video
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Generated clips on disk, newest first.
    pub fn list_generated_videos(&self) -> Vec<VideoEntry> {
        match widget::list_videos(&self.videos_dir) {
            Ok(videos) => videos,
            Err(e) => {
                log::error!("Error listing videos: {}", e);
                Vec::new()
            }
        }
    }

    fn update_state(&self, f: impl FnOnce(&mut GenerationState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}

#[async_trait]
impl CelebrationHandler for VideoGenerator {
    async fn celebrate(&self, donation: &DonationSnapshot) -> Option<PathBuf> {
        self.generate(donation, donation.amount_converted, None).await
    }
}

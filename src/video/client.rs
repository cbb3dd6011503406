//! AimlClient - handles communication with the AIML text-to-video API (Veo3).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

/// The environment variable name for the AIML API key.
pub const AIML_API_KEY_ENV: &str = crate::config::AIML_API_KEY_ENV;

/// Default base URL for the AIML API.
pub const AIML_API_BASE_URL: &str = "https://api.aimlapi.com/v2";

/// Default model for video generation.
pub const DEFAULT_MODEL: &str = "google/veo3";

/// Endpoint used both to start a job (POST) and to poll it (GET).
const GENERATION_PATH: &str = "generate/video/google/generation";

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the final asset download (60 seconds).
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default polling interval for status checks (10 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default upper bound on waiting for a job (1000 seconds).
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1000);

/// Statuses that mean the job is still running.
const IN_PROGRESS_STATUSES: &[&str] = &["queued", "waiting", "active", "generating"];

/// Validate a prompt before sending to the API.
pub fn validate_prompt(prompt: &str) -> Result<(), VideoApiError> {
    if prompt.trim().is_empty() {
        return Err(VideoApiError::EmptyPrompt);
    }
    Ok(())
}

/// Optional generation parameters passed through to the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationOptions {
    /// "720P" or "1080P".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Clip length in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhance_prompt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_audio: Option<bool>,
}

/// Request body for video generation.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(flatten)]
    options: &'a GenerationOptions,
}

/// Response from starting a generation.
#[derive(Debug, Deserialize)]
struct StartResponse {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

/// Response from the status polling endpoint.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    video: Option<VideoOutput>,
}

/// Video output from a completed generation.
#[derive(Debug, Deserialize)]
struct VideoOutput {
    #[serde(default)]
    url: Option<String>,
}

/// Status of a generation job as reported by one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Still running; carries the lower-cased API status.
    InProgress(String),
    /// Finished. The URL is absent if the API omitted it.
    Completed { video_url: Option<String> },
    /// Any other status is a failure.
    Failed(String),
}

/// Progress report passed to the caller while waiting for a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub status: String,
    pub elapsed_secs: Option<u64>,
    pub video_url: Option<String>,
    pub error: Option<String>,
}

impl ProgressUpdate {
    fn status(status: impl Into<String>, elapsed_secs: Option<u64>) -> Self {
        Self {
            status: status.into(),
            elapsed_secs,
            ..Self::default()
        }
    }
}

/// Client for communicating with the AIML API.
pub struct AimlClient {
    api_key: String,
    base_url: String,
    model: String,
    http_client: reqwest::Client,
    poll_interval: Duration,
    max_wait: Duration,
}

impl AimlClient {
    /// Create a new AimlClient by reading the API key from `AIMLAPI_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `VideoApiError::MissingApiKey` if the variable is not set.
    pub fn new() -> Result<Self, VideoApiError> {
        let api_key = std::env::var(AIML_API_KEY_ENV).map_err(|_| VideoApiError::MissingApiKey)?;
        Self::with_api_key(api_key)
    }

    /// Create a new AimlClient with an explicit API key.
    pub fn with_api_key(api_key: String) -> Result<Self, VideoApiError> {
        Self::with_base_url(api_key, AIML_API_BASE_URL.to_string())
    }

    /// Create a new AimlClient with a custom base URL.
    ///
    /// Useful for testing against a mock server.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, VideoApiError> {
        if api_key.trim().is_empty() {
            return Err(VideoApiError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        })
    }

    /// Use a different model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the status polling cadence and the overall wait limit.
    pub fn with_poll_settings(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    fn generation_url(&self) -> String {
        format!("{}/{}", self.base_url, GENERATION_PATH)
    }

    /// Start a video generation job and return its generation ID.
    ///
    /// # Errors
    ///
    /// Returns `VideoApiError::EmptyPrompt` for a blank prompt,
    /// `VideoApiError::ApiError` for any HTTP status >= 400,
    /// `VideoApiError::MissingGenerationId` if the response has no `id`,
    /// or `VideoApiError::HttpError` if the request fails.
    pub async fn start_generation(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, VideoApiError> {
        validate_prompt(prompt)?;

        let request_body = GenerateRequest {
            model: &self.model,
            prompt,
            options,
        };

        log::info!("Starting {} video generation", self.model);
        log::debug!("Generation options: {:?}", options);

        let response = self
            .http_client
            .post(self.generation_url())
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VideoApiError::ApiError(format!(
                "Generation request failed with status {}: {}",
                status, error_text
            )));
        }

        let start: StartResponse = response.json().await?;
        let generation_id = match start.id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => id,
            Some(serde_json::Value::Number(id)) => id.to_string(),
            _ => return Err(VideoApiError::MissingGenerationId),
        };

        log::info!("Video generation started, ID: {}", generation_id);
        Ok(generation_id)
    }

    /// Check a generation's status once.
    pub async fn poll_status(&self, generation_id: &str) -> Result<JobStatus, VideoApiError> {
        let response = self
            .http_client
            .get(self.generation_url())
            .query(&[("generation_id", generation_id)])
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VideoApiError::ApiError(format!(
                "Status check failed with status {}: {}",
                status, error_text
            )));
        }

        let status_response: StatusResponse = response.json().await?;
        let job_status = status_response
            .status
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if IN_PROGRESS_STATUSES.contains(&job_status.as_str()) {
            Ok(JobStatus::InProgress(job_status))
        } else if job_status == "completed" {
            Ok(JobStatus::Completed {
                video_url: status_response
                    .video
                    .and_then(|v| v.url)
                    .filter(|url| !url.is_empty()),
            })
        } else {
            Ok(JobStatus::Failed(job_status))
        }
    }

    /// Poll until the job reaches a terminal status and return the video URL.
    ///
    /// `on_progress` sees every polled status with the elapsed seconds, then a
    /// `completed` report carrying the URL, or an `error` / `timeout` report when the
    /// wait ends without one. A callback that panics is the caller's problem.
    pub async fn wait_for_completion(
        &self,
        generation_id: &str,
        on_progress: &(dyn Fn(&ProgressUpdate) + Send + Sync),
    ) -> Result<String, VideoApiError> {
        use tokio::time::Instant;

        log::info!("Waiting for video generation to complete: {}", generation_id);
        let start_time = Instant::now();

        loop {
            let elapsed = start_time.elapsed();
            if elapsed >= self.max_wait {
                log::error!("Video generation timed out after {:?}", self.max_wait);
                on_progress(&ProgressUpdate::status("timeout", Some(elapsed.as_secs())));
                return Err(VideoApiError::Timeout(self.max_wait));
            }
            let elapsed_secs = Some(elapsed.as_secs());

            let job_status = match self.poll_status(generation_id).await {
                Ok(status) => status,
                Err(e) => {
                    log::error!("Error polling generation status: {}", e);
                    on_progress(&ProgressUpdate {
                        error: Some(e.to_string()),
                        ..ProgressUpdate::status("error", elapsed_secs)
                    });
                    return Err(e);
                }
            };

            match job_status {
                JobStatus::InProgress(status) => {
                    log::info!("Status: {} (elapsed: {:?})", status, elapsed_secs);
                    on_progress(&ProgressUpdate::status(status, elapsed_secs));
                    tokio::time::sleep(self.poll_interval).await;
                }
                JobStatus::Completed {
                    video_url: Some(video_url),
                } => {
                    log::info!("Video generation completed: {}", video_url);
                    on_progress(&ProgressUpdate {
                        video_url: Some(video_url.clone()),
                        ..ProgressUpdate::status("completed", elapsed_secs)
                    });
                    return Ok(video_url);
                }
                JobStatus::Completed { video_url: None } => {
                    log::error!("No video URL in completed response");
                    on_progress(&ProgressUpdate {
                        error: Some("no_video_url".to_string()),
                        ..ProgressUpdate::status("error", elapsed_secs)
                    });
                    return Err(VideoApiError::MissingVideoUrl);
                }
                JobStatus::Failed(status) => {
                    log::error!("Video generation failed with status: {}", status);
                    on_progress(&ProgressUpdate::status(status.clone(), elapsed_secs));
                    return Err(VideoApiError::GenerationFailed(status));
                }
            }
        }
    }

    /// Download a video file from a URL to disk.
    ///
    /// Streams the body to disk without loading the whole video into memory. The API
    /// key is only attached when the URL points back at the API host.
    pub async fn download_video(&self, url: &str, dest: &Path) -> Result<PathBuf, VideoApiError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        log::info!("Downloading video from: {}", url);
        let mut request = self.http_client.get(url).timeout(DOWNLOAD_TIMEOUT);
        if url.starts_with(&self.base_url) {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VideoApiError::ApiError(format!(
                "Video download failed with status {}: {}",
                status, error_text
            )));
        }

        // Stream into a sibling `.part` file; only a complete download gets the real name.
        let partial = partial_path(dest);
        if let Err(e) = stream_to_file(response, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        tokio::fs::rename(&partial, dest).await?;

        let size = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
        log::info!("Video downloaded to: {} ({} bytes)", dest.display(), size);
        Ok(dest.to_path_buf())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<(), VideoApiError> {
    use futures_util::StreamExt;

    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Errors that can occur during AIML API operations.
#[derive(Debug, thiserror::Error)]
pub enum VideoApiError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation failed with status: {0}")]
    GenerationFailed(String),

    #[error("Generation completed but no video URL in response")]
    MissingVideoUrl,

    #[error("No generation ID in response")]
    MissingGenerationId,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Empty prompt")]
    EmptyPrompt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_api_key_creates_client() {
        let client = AimlClient::with_api_key("test-api-key".to_string()).unwrap();
        assert_eq!(client.api_key(), "test-api-key");
        assert_eq!(client.base_url(), AIML_API_BASE_URL);
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert_eq!(client.max_wait(), DEFAULT_MAX_WAIT);
    }

    #[test]
    fn test_empty_api_key_returns_error() {
        assert!(matches!(
            AimlClient::with_api_key("".to_string()),
            Err(VideoApiError::MissingApiKey)
        ));
        assert!(matches!(
            AimlClient::with_base_url("  ".to_string(), "http://x".to_string()),
            Err(VideoApiError::MissingApiKey)
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client =
            AimlClient::with_base_url("k".to_string(), "http://localhost:1234/v2/".to_string())
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234/v2");
        assert_eq!(
            client.generation_url(),
            "http://localhost:1234/v2/generate/video/google/generation"
        );
    }

    #[test]
    fn test_validate_prompt() {
        assert!(validate_prompt("fireworks").is_ok());
        assert!(matches!(validate_prompt("   "), Err(VideoApiError::EmptyPrompt)));
    }

    #[test]
    fn test_request_body_skips_unset_options() {
        let options = GenerationOptions {
            resolution: Some("720P".to_string()),
            generate_audio: Some(false),
            ..GenerationOptions::default()
        };
        let body = serde_json::to_value(GenerateRequest {
            model: DEFAULT_MODEL,
            prompt: "confetti",
            options: &options,
        })
        .unwrap();

        assert_eq!(body["model"], "google/veo3");
        assert_eq!(body["prompt"], "confetti");
        assert_eq!(body["resolution"], "720P");
        assert_eq!(body["generate_audio"], false);
        assert!(body.get("seed").is_none());
        assert!(body.get("duration").is_none());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(VideoApiError::MissingApiKey.to_string(), "API key not configured");
        assert_eq!(
            VideoApiError::GenerationFailed("failed".to_string()).to_string(),
            "Generation failed with status: failed"
        );
        assert_eq!(
            VideoApiError::Timeout(Duration::from_secs(5)).to_string(),
            "Generation timed out after 5s"
        );
    }
}

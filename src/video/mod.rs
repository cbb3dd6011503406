//! Celebration video generation through the AIML text-to-video API.
//!
//! Prompts are built from the donation (or an amount-tiered template), sent to the API,
//! polled until the job finishes, and the resulting clip is downloaded into the videos
//! directory where the widget picks it up.

mod client;
mod generator;
pub mod prompt;
mod state;

pub use client::{
    validate_prompt, AimlClient, GenerationOptions, JobStatus, ProgressUpdate, VideoApiError,
    AIML_API_BASE_URL, AIML_API_KEY_ENV, DEFAULT_MAX_WAIT, DEFAULT_MODEL, DEFAULT_POLL_INTERVAL,
};
pub use generator::VideoGenerator;
pub use prompt::{build_prompt, default_tiers, tiered_prompt, PromptSource, PromptTier};
pub use state::{progress_for_status, GenerationProgress, GenerationState, GenerationStatus};

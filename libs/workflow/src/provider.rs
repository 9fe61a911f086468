//! # External Collaborator Seams
//!
//! Traits for the AI completion provider and the image preprocessor. The
//! engine treats both as black boxes; production implementations sit behind
//! HTTP, tests use scripted doubles.
//!
//! Provider calls are always wrapped in [`bounded`]: the engine never
//! blocks unboundedly on a remote service.

use crate::entity::PreprocessingConfig;
use crate::error::WorkflowError;
use async_trait::async_trait;
use config::constants::PROVIDER_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// =============================================================================
// PAYLOADS
// =============================================================================

/// An image ready to be sent to a vision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// Storage id of the image.
    pub image_id: String,
    /// Data URL (base64) bounded to the model's accepted size.
    pub data_url: String,
}

/// Options for one completion call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    /// Ask the provider for a JSON-only response where supported.
    pub json_mode: bool,
}

/// A provider completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    /// Model that actually served the request.
    pub model: String,
    pub tokens_used: Option<u32>,
    pub finish_reason: Option<String>,
}

// =============================================================================
// AI PROVIDER
// =============================================================================

/// Chat-completion provider accepting text and image inputs.
///
/// The cancellation token is the engine's best-effort abort signal for
/// in-flight requests; implementations should stop work when it trips but
/// the engine does not assume the remote side actually does.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Text-only completion.
    async fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        options: CallOptions,
        cancel: &CancellationToken,
    ) -> Result<Completion, WorkflowError>;

    /// Completion over one or more images plus a text prompt.
    async fn analyze_images(
        &self,
        model: &str,
        images: &[ImagePayload],
        prompt: &str,
        options: CallOptions,
        cancel: &CancellationToken,
    ) -> Result<Completion, WorkflowError>;

    /// Compare two images (original first, candidate second).
    async fn compare_images(
        &self,
        model: &str,
        original: &ImagePayload,
        candidate: &ImagePayload,
        prompt: &str,
        options: CallOptions,
        cancel: &CancellationToken,
    ) -> Result<Completion, WorkflowError> {
        let pair = [original.clone(), candidate.clone()];
        self.analyze_images(model, &pair, prompt, options, cancel)
            .await
    }
}

// =============================================================================
// IMAGE PREPROCESSOR
// =============================================================================

/// Resizes/normalizes stored images into bounded-size model payloads.
#[async_trait]
pub trait ImagePreprocessor: Send + Sync {
    /// Normalize a stored image per the given options, storing the result
    /// and returning the payload for it.
    async fn preprocess(
        &self,
        image_id: &str,
        options: &PreprocessingConfig,
    ) -> Result<ImagePayload, WorkflowError>;

    /// Load an already-stored image as a payload without reprocessing.
    async fn load(&self, image_id: &str) -> Result<ImagePayload, WorkflowError>;
}

// =============================================================================
// TIMEOUT
// =============================================================================

/// Bound a provider call to the engine's timeout.
pub async fn bounded<T, F>(future: F) -> Result<T, WorkflowError>
where
    F: Future<Output = Result<T, WorkflowError>>,
{
    match tokio::time::timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS), future).await {
        Ok(result) => result,
        Err(_) => Err(WorkflowError::ProviderTimeout(PROVIDER_TIMEOUT_SECS)),
    }
}

// =============================================================================
// TESTS
// =============================================================================

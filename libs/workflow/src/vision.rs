//! # Vision-to-Code Pipeline
//!
//! The concrete workflow: images in, OpenSCAD code out.
//!
//! ```text
//! preprocess → vision analysis → [review] → code generation → [review]
//!            → render + verify loop (bounded) → finalize
//! ```
//!
//! Bracketed stages are inflection points: the pipeline suspends and a
//! later external call resumes it via [`Pipeline::resume_from`] with the
//! persisted state blob as context. Verification needs a render of the
//! generated code; when none is available the pipeline requests a
//! screenshot from the client and suspends until one is provided.

use crate::analysis::{
    parse_verification_report, parse_vision_analysis, strip_code_fences, VerificationReport,
    VisionAnalysis,
};
use crate::entity::{
    InflectionAction, InflectionOption, ModelRole, ModelTier, OptionVariant, StepType,
};
use crate::error::WorkflowError;
use crate::event::{ScreenshotPurpose, WorkflowEvent};
use crate::provider::{bounded, AiProvider, CallOptions, ImagePayload, ImagePreprocessor};
use crate::runner::{
    InflectionPointRequest, Pipeline, StepMeta, StepOutcome, StepRunner,
};
use async_trait::async_trait;
use config::constants::{
    CODE_GENERATION_MAX_TOKENS, VERIFICATION_MAX_TOKENS, VISION_ANALYSIS_MAX_TOKENS,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

// Step names double as resume dispatch keys.
const STEP_PREPROCESS: &str = "preprocess_images";
const STEP_ANALYSIS: &str = "vision_analysis";
const STEP_ANALYSIS_REVIEW: &str = "analysis_review";
const STEP_CODE_GENERATION: &str = "code_generation";
const STEP_CODE_REVIEW: &str = "code_review";
const STEP_VERIFICATION: &str = "verification";
const STEP_VERIFICATION_REVIEW: &str = "verification_review";

/// Marker comment identifying pipeline-generated code.
const GENERATION_MARKER: &str = "Generated by the vision-to-code pipeline";

/// Library include every generated model must carry.
const LIBRARY_INCLUDE: &str = "include <BOSL2/std.scad>";

// =============================================================================
// PIPELINE STATE
// =============================================================================

/// The pipeline-owned state blob, persisted in `Workflow::state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionState {
    /// Storage ids of the user's input images.
    pub original_image_ids: Vec<String>,
    /// Preprocessed variants, when preprocessing ran.
    pub enhanced_image_ids: Option<Vec<String>>,
    /// Structured description from the vision step.
    pub analysis: Option<VisionAnalysis>,
    /// Latest generated code.
    pub code: Option<String>,
    /// Render screenshots provided by the client, oldest first.
    pub render_image_ids: Vec<String>,
    /// Latest comparison report.
    pub verification: Option<VerificationReport>,
    /// Completed comparison passes.
    pub verification_attempts: u32,
}

impl VisionState {
    /// Initial state for a set of input images.
    pub fn for_images(image_ids: Vec<String>) -> Self {
        Self {
            original_image_ids: image_ids,
            ..Self::default()
        }
    }

    /// The image ids vision calls should use: preprocessed when available.
    fn effective_image_ids(&self) -> Vec<String> {
        self.enhanced_image_ids
            .clone()
            .unwrap_or_else(|| self.original_image_ids.clone())
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Serialized step output for code-producing steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeneratedCode {
    code: String,
}

/// The vision-to-code workflow implementation.
pub struct VisionToCodePipeline {
    runner: StepRunner,
    provider: std::sync::Arc<dyn AiProvider>,
    images: std::sync::Arc<dyn ImagePreprocessor>,
}

impl VisionToCodePipeline {
    pub fn new(
        runner: StepRunner,
        provider: std::sync::Arc<dyn AiProvider>,
        images: std::sync::Arc<dyn ImagePreprocessor>,
    ) -> Self {
        Self {
            runner,
            provider,
            images,
        }
    }

    /// The underlying runner, for orchestration (resolving inflection
    /// points, cancellation).
    pub fn runner(&self) -> &StepRunner {
        &self.runner
    }

    /// Mutable runner access.
    pub fn runner_mut(&mut self) -> &mut StepRunner {
        &mut self.runner
    }

    /// Deserialize the typed state from the workflow's blob.
    fn state(&self) -> VisionState {
        serde_json::from_value(self.runner.workflow().state.clone()).unwrap_or_default()
    }

    /// Persist the typed state back into the workflow's blob.
    async fn save_state(&mut self, state: &VisionState) -> Result<(), WorkflowError> {
        self.runner.update_state(serde_json::to_value(state)?).await
    }

    fn inflection_points_enabled(&self) -> bool {
        self.runner.config().inflection_points.enabled
    }

    fn verification_enabled(&self) -> bool {
        self.runner.config().verification.enabled
    }

    // =========================================================================
    // MAIN FLOW
    // =========================================================================

    async fn run(&mut self) -> Result<(), WorkflowError> {
        self.runner.begin().await?;

        self.preprocess_images().await?;

        let analysis = self.vision_analysis(None).await?;
        if self.inflection_points_enabled() {
            return self.present_analysis_review(&analysis).await;
        }
        self.continue_with_code_generation().await
    }

    /// Shared tail of the flow after an accepted analysis.
    async fn continue_with_code_generation(&mut self) -> Result<(), WorkflowError> {
        let analysis = self.state().analysis.unwrap_or_default();
        let code = self.generate_code(&analysis, &[], None).await?;
        if self.inflection_points_enabled() {
            return self.present_code_review(&code).await;
        }
        if self.verification_enabled() {
            return self.run_verification(code).await;
        }
        self.runner.complete_workflow().await
    }

    /// Map a flow result to the workflow's terminal handling: cancellation
    /// is already recorded, any other error fails the workflow visibly.
    async fn seal(&mut self, result: Result<(), WorkflowError>) -> Result<(), WorkflowError> {
        match result {
            Ok(()) => Ok(()),
            Err(WorkflowError::Cancelled) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                self.runner
                    .fail_workflow(
                        &message,
                        true,
                        vec!["retry".to_string(), "use_different_model".to_string()],
                    )
                    .await?;
                Ok(())
            }
        }
    }

    // =========================================================================
    // STEP 1: PREPROCESS
    // =========================================================================

    async fn preprocess_images(&mut self) -> Result<(), WorkflowError> {
        let state = self.state();
        let options = self.runner.config().preprocessing.clone();

        if !options.enabled {
            return self
                .runner
                .skip_step(STEP_PREPROCESS, "preprocessing disabled")
                .await;
        }

        let ids = state.original_image_ids.clone();
        let images = self.images.clone();
        let input = json!({ "image_ids": &ids, "options": &options });

        let enhanced: Vec<String> = self
            .runner
            .run_step(STEP_PREPROCESS, StepType::Preprocessing, input, |ctx| async move {
                let total = ids.len().max(1);
                let mut out = Vec::with_capacity(ids.len());
                for (i, id) in ids.iter().enumerate() {
                    ctx.progress(
                        (30 + (i + 1) * 60 / total) as u8,
                        &format!("Processing image {} of {}", i + 1, total),
                    );
                    let payload = images.preprocess(id, &options).await?;
                    out.push(payload.image_id);
                }
                ctx.progress(100, "Image preprocessing complete");
                Ok(StepOutcome::of(out))
            })
            .await?;

        let mut state = self.state();
        state.enhanced_image_ids = Some(enhanced);
        self.save_state(&state).await
    }

    // =========================================================================
    // STEP 2: VISION ANALYSIS
    // =========================================================================

    async fn vision_analysis(
        &mut self,
        feedback: Option<&str>,
    ) -> Result<VisionAnalysis, WorkflowError> {
        let state = self.state();
        let image_ids = state.effective_image_ids();
        let model = self
            .runner
            .config()
            .models
            .model_for(ModelRole::Vision)
            .to_string();
        let prompt_version = self.runner.config().prompts.version.clone();
        let prompt = vision_prompt(feedback);

        let provider = self.provider.clone();
        let images = self.images.clone();
        let call_model = model.clone();
        let input = json!({ "image_ids": &image_ids, "model": &model });

        let analysis: VisionAnalysis = self
            .runner
            .run_step(STEP_ANALYSIS, StepType::AiCall, input, |ctx| async move {
                ctx.progress(20, "Fetching images");
                let mut payloads = Vec::with_capacity(image_ids.len());
                for id in &image_ids {
                    payloads.push(images.load(id).await?);
                }

                ctx.progress(50, "Analyzing images with vision model");
                let completion = bounded(provider.analyze_images(
                    &call_model,
                    &payloads,
                    &prompt,
                    CallOptions {
                        system_prompt: Some(VISION_SYSTEM_PROMPT.to_string()),
                        max_tokens: VISION_ANALYSIS_MAX_TOKENS,
                        temperature: None,
                        json_mode: true,
                    },
                    &ctx.cancel,
                ))
                .await?;

                ctx.progress(80, "Parsing structured description");
                let analysis = parse_vision_analysis(&completion.content);
                Ok(StepOutcome::with_meta(
                    analysis,
                    StepMeta {
                        model_used: Some(completion.model),
                        prompt_version: Some(prompt_version),
                        tokens_used: completion.tokens_used,
                    },
                ))
            })
            .await?;

        let mut state = self.state();
        state.analysis = Some(analysis.clone());
        self.save_state(&state).await?;
        Ok(analysis)
    }

    // =========================================================================
    // STEP 3: ANALYSIS REVIEW
    // =========================================================================

    async fn present_analysis_review(
        &mut self,
        analysis: &VisionAnalysis,
    ) -> Result<(), WorkflowError> {
        let state = self.state();
        let mut step = self
            .runner
            .start_step(
                STEP_ANALYSIS_REVIEW,
                StepType::InflectionPoint,
                json!({ "analysis": analysis }),
            )
            .await?;

        let options = vec![
            InflectionOption::new("proceed", "Looks Good", InflectionAction::Proceed)
                .describe("Proceed to code generation with this analysis")
                .with_variant(OptionVariant::Primary),
            InflectionOption::new(
                "modify",
                "Make Changes",
                InflectionAction::Modify {
                    requires_feedback: true,
                },
            )
            .describe("Provide feedback to adjust the analysis")
            .with_variant(OptionVariant::Outline),
            InflectionOption::new(
                "retry_best",
                "Try Better Model",
                InflectionAction::UseDifferentModel {
                    model_tier: ModelTier::Best,
                },
            )
            .describe("Re-analyze with a more powerful model")
            .with_variant(OptionVariant::Outline),
            InflectionOption::new("cancel", "Cancel", InflectionAction::Cancel)
                .describe("Stop the workflow")
                .with_variant(OptionVariant::Destructive),
        ];

        self.runner
            .request_inflection_point(
                &mut step,
                InflectionPointRequest {
                    title: "Review Image Analysis".to_string(),
                    description: Some(
                        "The vision model extracted the following description. \
                         Review it before code is generated."
                            .to_string(),
                    ),
                    context: json!({
                        "images": image_labels(&state.original_image_ids),
                        "analysis": analysis,
                        "metadata": {
                            "confidence": analysis.confidence,
                            "image_type": analysis.image_type,
                        },
                    }),
                    options,
                },
            )
            .await?;
        Ok(())
    }

    async fn handle_analysis_choice(
        &mut self,
        choice: &str,
        feedback: Option<&str>,
    ) -> Result<(), WorkflowError> {
        match choice {
            "proceed" => self.continue_with_code_generation().await,
            "modify" => {
                let analysis = self.vision_analysis(feedback).await?;
                self.present_analysis_review(&analysis).await
            }
            "retry_best" => {
                let mut state = self.state();
                state.verification_attempts = 0;
                self.save_state(&state).await?;
                self.runner.config_mut().models.tier = ModelTier::Best;

                let analysis = self.vision_analysis(None).await?;
                self.present_analysis_review(&analysis).await
            }
            "cancel" => {
                self.runner
                    .cancel_workflow(Some("User cancelled after analysis review".to_string()))
                    .await
            }
            other => Err(WorkflowError::UnknownChoice(other.to_string())),
        }
    }

    // =========================================================================
    // STEP 4: CODE GENERATION
    // =========================================================================

    async fn generate_code(
        &mut self,
        analysis: &VisionAnalysis,
        discrepancies: &[String],
        user_feedback: Option<&str>,
    ) -> Result<String, WorkflowError> {
        let state = self.state();
        let models = &self.runner.config().models;
        // A vision-capable model sees the original images alongside the
        // structured description; that is what makes the output match.
        let model = models
            .code_generation
            .clone()
            .unwrap_or_else(|| models.model_for(ModelRole::Vision).to_string());
        let prompt_version = self.runner.config().prompts.version.clone();

        let with_feedback = !discrepancies.is_empty() || user_feedback.is_some();
        let prompt = code_prompt(analysis, discrepancies, user_feedback)?;
        let system_prompt = if with_feedback {
            feedback_system_prompt(discrepancies, user_feedback)
        } else {
            CODE_SYSTEM_PROMPT.to_string()
        };

        let image_ids = state.effective_image_ids();
        let provider = self.provider.clone();
        let images = self.images.clone();
        let call_model = model.clone();
        let description = analysis.description.chars().take(100).collect::<String>();
        let input = json!({
            "model": &model,
            "image_ids": &image_ids,
            "has_feedback": with_feedback,
            "discrepancy_count": discrepancies.len(),
        });

        let generated: GeneratedCode = self
            .runner
            .run_step(STEP_CODE_GENERATION, StepType::AiCall, input, |ctx| async move {
                ctx.progress(20, "Fetching images for code generation");
                let mut payloads: Vec<ImagePayload> = Vec::new();
                for id in &image_ids {
                    match images.load(id).await {
                        Ok(payload) => payloads.push(payload),
                        // A missing image degrades to text-only generation.
                        Err(e) => {
                            warn!(image = %id, error = %e, "image unavailable for code generation")
                        }
                    }
                }

                ctx.progress(40, "Generating code");
                let options = CallOptions {
                    system_prompt: Some(system_prompt),
                    max_tokens: CODE_GENERATION_MAX_TOKENS,
                    temperature: Some(if with_feedback { 0.4 } else { 0.3 }),
                    json_mode: false,
                };
                let completion = if payloads.is_empty() {
                    bounded(provider.generate_text(&call_model, &prompt, options, &ctx.cancel))
                        .await?
                } else {
                    bounded(provider.analyze_images(
                        &call_model,
                        &payloads,
                        &prompt,
                        options,
                        &ctx.cancel,
                    ))
                    .await?
                };

                ctx.progress(80, "Cleaning generated code");
                let code =
                    clean_generated_code(&completion.content, &description, &completion.model);
                Ok(StepOutcome::with_meta(
                    GeneratedCode { code },
                    StepMeta {
                        model_used: Some(completion.model),
                        prompt_version: Some(prompt_version),
                        tokens_used: completion.tokens_used,
                    },
                ))
            })
            .await?;

        let mut state = self.state();
        state.code = Some(generated.code.clone());
        self.save_state(&state).await?;
        Ok(generated.code)
    }

    // =========================================================================
    // STEP 5: CODE REVIEW
    // =========================================================================

    async fn present_code_review(&mut self, code: &str) -> Result<(), WorkflowError> {
        let state = self.state();
        let mut step = self
            .runner
            .start_step(
                STEP_CODE_REVIEW,
                StepType::InflectionPoint,
                json!({ "code": code }),
            )
            .await?;

        let options = vec![
            InflectionOption::new(
                "proceed",
                "Use This Code",
                InflectionAction::ProceedWithCode {
                    code: code.to_string(),
                },
            )
            .describe("Accept the generated code and proceed")
            .with_variant(OptionVariant::Primary),
            InflectionOption::new("verify", "Verify First", InflectionAction::Verify)
                .describe("Render and compare with the original image")
                .with_variant(OptionVariant::Outline),
            InflectionOption::new(
                "modify",
                "Make Changes",
                InflectionAction::Modify {
                    requires_feedback: true,
                },
            )
            .describe("Provide feedback to adjust the code")
            .with_variant(OptionVariant::Outline),
            InflectionOption::new(
                "restart",
                "Start Over",
                InflectionAction::Restart {
                    from_step: Some(STEP_ANALYSIS.to_string()),
                },
            )
            .describe("Re-analyze the image from scratch")
            .with_variant(OptionVariant::Outline),
        ];

        self.runner
            .request_inflection_point(
                &mut step,
                InflectionPointRequest {
                    title: "Review Generated Code".to_string(),
                    description: Some(
                        "Code has been generated from the image analysis. \
                         Review it before proceeding."
                            .to_string(),
                    ),
                    context: json!({
                        "preview_code": code,
                        "images": image_labels(&state.original_image_ids),
                    }),
                    options,
                },
            )
            .await?;
        Ok(())
    }

    async fn handle_code_choice(
        &mut self,
        choice: &str,
        feedback: Option<&str>,
    ) -> Result<(), WorkflowError> {
        let state = self.state();
        match choice {
            "proceed" => {
                if self.verification_enabled() {
                    let code = state.code.unwrap_or_default();
                    self.run_verification(code).await
                } else {
                    self.runner.complete_workflow().await
                }
            }
            "verify" => {
                let code = state.code.unwrap_or_default();
                self.run_verification(code).await
            }
            "modify" => {
                let analysis = state.analysis.unwrap_or_default();
                let code = self.generate_code(&analysis, &[], feedback).await?;
                self.present_code_review(&code).await
            }
            "restart" => {
                let mut state = self.state();
                state.analysis = None;
                state.code = None;
                state.verification = None;
                state.verification_attempts = 0;
                self.save_state(&state).await?;
                self.run().await
            }
            other => Err(WorkflowError::UnknownChoice(other.to_string())),
        }
    }

    // =========================================================================
    // STEP 6: VERIFICATION LOOP
    // =========================================================================

    async fn run_verification(&mut self, code: String) -> Result<(), WorkflowError> {
        let mut code = code;
        loop {
            let state = self.state();
            let max_iterations = self.runner.config().verification.max_iterations;

            let mut step = self
                .runner
                .start_step(
                    STEP_VERIFICATION,
                    StepType::Verification,
                    json!({
                        "code": &code,
                        "iteration": state.verification_attempts + 1,
                        "max_iterations": max_iterations,
                    }),
                )
                .await?;

            // A render of the generated code comes from the client; without
            // one the workflow suspends until a screenshot is provided.
            let render_id = match state.render_image_ids.last() {
                Some(id) => id.clone(),
                None => {
                    info!(workflow = %self.runner.workflow().id, "requesting render screenshot");
                    self.runner.suspend().await?;
                    // Persistence first; the event may be lost, the status not.
                    self.runner.events().emit(WorkflowEvent::ScreenshotRequested {
                        workflow_id: self.runner.workflow().id,
                        step_id: step.id,
                        purpose: ScreenshotPurpose::Verification,
                        code: Some(code.clone()),
                    });
                    return Ok(());
                }
            };

            let report = match self.compare_images(&step_original_id(&state), &render_id).await {
                Ok(report) => report,
                Err(e) => {
                    let message = e.to_string();
                    self.runner.fail_step(&mut step, &message).await?;
                    return Err(WorkflowError::StepFailed {
                        step: STEP_VERIFICATION.to_string(),
                        message,
                    });
                }
            };

            let mut state = self.state();
            state.verification = Some(report.clone());
            state.verification_attempts += 1;
            let attempts = state.verification_attempts;
            self.save_state(&state).await?;

            self.runner
                .complete_step(&mut step, serde_json::to_value(&report)?, StepMeta::default())
                .await?;

            if self.inflection_points_enabled() {
                return self.present_verification_review(&report, &code).await;
            }

            // Loop back to code generation with corrective feedback, up to
            // the configured bound.
            if report.is_poor() && attempts < max_iterations {
                let analysis = self.state().analysis.unwrap_or_default();
                code = self
                    .generate_code(&analysis, &report.discrepancies, None)
                    .await?;
                continue;
            }

            return self.runner.complete_workflow().await;
        }
    }

    /// One comparison call: original image vs latest render.
    async fn compare_images(
        &self,
        original_id: &str,
        render_id: &str,
    ) -> Result<VerificationReport, WorkflowError> {
        let model = self
            .runner
            .config()
            .models
            .model_for(ModelRole::Verification)
            .to_string();

        let original = self.images.load(original_id).await?;
        let render = self.images.load(render_id).await?;
        let cancel = self.runner.cancellation_token();

        let completion = bounded(self.provider.compare_images(
            &model,
            &original,
            &render,
            VERIFICATION_PROMPT,
            CallOptions {
                system_prompt: Some(VERIFICATION_SYSTEM_PROMPT.to_string()),
                max_tokens: VERIFICATION_MAX_TOKENS,
                temperature: None,
                json_mode: true,
            },
            &cancel,
        ))
        .await?;

        Ok(parse_verification_report(&completion.content))
    }

    async fn present_verification_review(
        &mut self,
        report: &VerificationReport,
        code: &str,
    ) -> Result<(), WorkflowError> {
        let state = self.state();
        let mut step = self
            .runner
            .start_step(
                STEP_VERIFICATION_REVIEW,
                StepType::InflectionPoint,
                json!({ "report": report }),
            )
            .await?;

        let is_poor = report.is_poor();
        let is_fair = report.is_fair();
        let score = report.similarity_score;

        let mut options = Vec::new();
        if !is_poor {
            options.push(
                InflectionOption::new(
                    "accept",
                    "Accept",
                    InflectionAction::ProceedWithCode {
                        code: code.to_string(),
                    },
                )
                .describe(format!("Match quality: {:?} ({}%)", report.match_quality, score))
                .with_variant(if report.recommendation
                    == crate::analysis::Recommendation::Proceed
                {
                    OptionVariant::Primary
                } else {
                    OptionVariant::Outline
                }),
            );
        }
        options.push(
            InflectionOption::new(
                "improve",
                "Improve",
                InflectionAction::Modify {
                    requires_feedback: false,
                },
            )
            .describe("Regenerate code with better guidance")
            .with_variant(if is_poor || is_fair {
                OptionVariant::Primary
            } else {
                OptionVariant::Outline
            }),
        );
        options.push(
            InflectionOption::new(
                "feedback",
                "Give Feedback",
                InflectionAction::Modify {
                    requires_feedback: true,
                },
            )
            .describe("Provide specific instructions")
            .with_variant(OptionVariant::Outline),
        );
        if is_poor {
            options.push(
                InflectionOption::new(
                    "accept",
                    "Accept Anyway",
                    InflectionAction::ProceedWithCode {
                        code: code.to_string(),
                    },
                )
                .describe(format!("Match is poor ({}%) - not recommended", score))
                .with_variant(OptionVariant::Destructive),
            );
        }

        let description = if is_poor {
            format!(
                "The generated model does not match the original image well \
                 ({}% similarity). Regenerating with better guidance is recommended.",
                score
            )
        } else if is_fair {
            format!(
                "The generated model partially matches the original image \
                 ({}% similarity). Some adjustments may be needed.",
                score
            )
        } else {
            format!(
                "The generated model matches the original image well ({}% similarity).",
                score
            )
        };

        self.runner
            .request_inflection_point(
                &mut step,
                InflectionPointRequest {
                    title: if is_poor {
                        "Poor Match - Review Required".to_string()
                    } else {
                        "Verification Results".to_string()
                    },
                    description: Some(description),
                    context: json!({
                        "comparison": {
                            "before": { "image_id": state.original_image_ids.first(), "label": "Original" },
                            "after": { "image_id": state.render_image_ids.last(), "label": "Generated" },
                        },
                        "verification": report,
                        "preview_code": code,
                    }),
                    options,
                },
            )
            .await?;
        Ok(())
    }

    async fn handle_verification_choice(
        &mut self,
        choice: &str,
        feedback: Option<&str>,
    ) -> Result<(), WorkflowError> {
        let state = self.state();
        match choice {
            "accept" => self.runner.complete_workflow().await,
            "improve" => {
                let analysis = state.analysis.unwrap_or_default();
                let discrepancies = state
                    .verification
                    .map(|v| v.discrepancies)
                    .unwrap_or_default();
                let code = self.generate_code(&analysis, &discrepancies, None).await?;
                self.run_verification(code).await
            }
            "feedback" => {
                let analysis = state.analysis.unwrap_or_default();
                let discrepancies = state
                    .verification
                    .map(|v| v.discrepancies)
                    .unwrap_or_default();
                let code = self
                    .generate_code(&analysis, &discrepancies, feedback)
                    .await?;
                self.run_verification(code).await
            }
            other => Err(WorkflowError::UnknownChoice(other.to_string())),
        }
    }
}

// =============================================================================
// PIPELINE TRAIT
// =============================================================================

#[async_trait]
impl Pipeline for VisionToCodePipeline {
    async fn execute(&mut self) -> Result<(), WorkflowError> {
        let result = self.run().await;
        self.seal(result).await
    }

    async fn resume_from(
        &mut self,
        step_name: &str,
        choice: &str,
        feedback: Option<&str>,
    ) -> Result<(), WorkflowError> {
        info!(step = step_name, choice, "resuming pipeline");
        let result = match step_name {
            STEP_ANALYSIS_REVIEW => self.handle_analysis_choice(choice, feedback).await,
            STEP_CODE_REVIEW => self.handle_code_choice(choice, feedback).await,
            STEP_VERIFICATION_REVIEW => self.handle_verification_choice(choice, feedback).await,
            STEP_VERIFICATION if choice == "screenshot_provided" => {
                match self.state().code {
                    Some(code) => self.run_verification(code).await,
                    None => Err(WorkflowError::UnknownResumeStep(
                        "verification without generated code".to_string(),
                    )),
                }
            }
            other => Err(WorkflowError::UnknownResumeStep(other.to_string())),
        };
        self.seal(result).await
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// UI labels for context images.
fn image_labels(image_ids: &[String]) -> Vec<serde_json::Value> {
    image_ids
        .iter()
        .enumerate()
        .map(|(i, id)| json!({ "id": id, "label": format!("Image {}", i + 1) }))
        .collect()
}

/// The original image a comparison runs against.
fn step_original_id(state: &VisionState) -> String {
    state
        .original_image_ids
        .first()
        .cloned()
        .unwrap_or_default()
}

/// Normalize a raw completion into shippable model code.
fn clean_generated_code(raw: &str, description: &str, model: &str) -> String {
    let mut code = strip_code_fences(raw).to_string();

    if !code.contains(LIBRARY_INCLUDE) {
        code = format!("{}\n\n{}", LIBRARY_INCLUDE, code);
    }
    if !code.contains(GENERATION_MARKER) {
        code = format!(
            "// {}\n// Based on: {}\n// Model: {}\n\n{}",
            GENERATION_MARKER, description, model, code
        );
    }
    code
}

// =============================================================================
// PROMPTS
// =============================================================================

const VISION_SYSTEM_PROMPT: &str = "\
You are an expert CAD engineer with strong spatial reasoning. Analyze the \
image(s) for 3D modeling with OpenSCAD and the BOSL2 library.

Instructions:
1. Interpret perspective, depth cues, and symmetry carefully
2. Ignore branding, logos, text, and decals - model geometry only
3. Estimate all dimensions in millimeters
4. Map visual shapes to BOSL2 primitives (cuboid, cyl, prismoid, tube)

Return ONLY valid JSON matching the schema in the prompt. No markdown.";

const CODE_SYSTEM_PROMPT: &str = "\
You are an expert OpenSCAD programmer. Generate code that visually matches \
the object in the image.

Priorities, in order: overall silhouette, structural features, proportions, \
edge treatment. Ignore branding, colors, and items resting on the object.

Rules:
1. Start with 'include <BOSL2/std.scad>'
2. Keep rounding below min(x,y,z)/2; omit rounding on parts thinner than 5mm
3. Use parametric variables at the top and one module per major component
4. Use BOSL2 primitives and positioning (anchor=BOTTOM, up(), right())

Output pure OpenSCAD code only. No markdown, no explanations.";

const VERIFICATION_SYSTEM_PROMPT: &str = "\
You are comparing an original reference image (first) with a 3D rendered \
model (second). Compare geometry only: ignore colors, materials, branding, \
lighting, and background.

Weigh: silhouette 40%, structural features 30%, proportions 20%, edge \
treatment 10%.

Return ONLY valid JSON matching the schema in the prompt.";

const VERIFICATION_PROMPT: &str = "\
Compare the two images and return JSON with fields: match_quality \
(excellent|good|fair|poor), discrepancies (array of strings), recommendation \
(proceed|minor_adjustment|major_revision), similarity_score (0-100), details \
(proportions_match, features_match, dimensions_match booleans).";

/// Vision analysis prompt, with optional user feedback folded in.
fn vision_prompt(feedback: Option<&str>) -> String {
    let mut prompt = String::from(
        "Describe the object for parametric CAD modeling. Return JSON with \
         fields: image_type (technical_drawing|sketch|photo|cad_screenshot|\
         unknown), description, geometry {primary_shapes, operations, \
         features}, dimensions {overall {length, width, height}, features}, \
         confidence (high|medium|low), ambiguities, openscad_vocabulary.",
    );
    if let Some(feedback) = feedback {
        prompt.push_str("\n\nThe user reviewed an earlier analysis and asked for changes:\n");
        prompt.push_str(feedback);
    }
    prompt
}

/// Code generation prompt carrying the structured description and any
/// corrective context from a failed verification or user feedback.
fn code_prompt(
    analysis: &VisionAnalysis,
    discrepancies: &[String],
    user_feedback: Option<&str>,
) -> Result<String, WorkflowError> {
    let mut prompt = format!(
        "Generate OpenSCAD code (BOSL2) for the object described below.\n\n\
         # OBJECT DESCRIPTION\n{}\n",
        serde_json::to_string_pretty(analysis)?
    );
    if !discrepancies.is_empty() {
        prompt.push_str("\n# PREVIOUS ATTEMPT ISSUES (FIX THESE)\n");
        for d in discrepancies {
            prompt.push_str("- ");
            prompt.push_str(d);
            prompt.push('\n');
        }
    }
    if let Some(feedback) = user_feedback {
        prompt.push_str("\n# USER FEEDBACK\n");
        prompt.push_str(feedback);
        prompt.push('\n');
    }
    Ok(prompt)
}

/// System prompt for regeneration after a failed verification.
fn feedback_system_prompt(discrepancies: &[String], user_feedback: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are an expert OpenSCAD programmer. Your previous attempt had \
         issues; the new code must address them.\n",
    );
    if !discrepancies.is_empty() {
        prompt.push_str("\nIssues to fix:\n");
        for d in discrepancies {
            prompt.push_str("- ");
            prompt.push_str(d);
            prompt.push('\n');
        }
    }
    if let Some(feedback) = user_feedback {
        prompt.push_str("\nThe user's specific request:\n");
        prompt.push_str(feedback);
        prompt.push('\n');
    }
    prompt.push_str(
        "\nRules: use only the BOSL2 library starting with \
         'include <BOSL2/std.scad>', get the overall shape right first, one \
         module per component, output pure OpenSCAD code with no markdown.",
    );
    prompt
}

// analysis.rs — One image in, one timestamped model answer out.
//
// The result slot holds exactly one outcome and is replaced wholesale by
// every run, success or failure.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

use crate::ai::{AiError, InferenceClient, InferenceRequest};
use crate::busy::BusyFlag;
use crate::payload::ImagePayload;

pub const ANALYSIS_PROMPT: &str = "Analyze this skin image. Provide disease name, confidence score, description, and medical disclaimer. Format the output clearly.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub text: String,
    /// Wall-clock time the answer arrived.
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Please select an image first")]
    NoImageSelected,
    #[error("An analysis is already running")]
    Busy,
    #[error("{}", describe_failure(.0))]
    Inference(#[source] AiError),
}

fn describe_failure(err: &AiError) -> String {
    match err {
        AiError::EmptyOrMalformedResponse(_) => {
            "No analysis received from AI or unexpected response format.".to_string()
        }
        other => format!(
            "Analysis failed: Could not connect to AI service or API error. Details: {other}"
        ),
    }
}

/// What the result slot shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AnalysisOutcome {
    Completed(AnalysisResult),
    Failed { message: String },
}

pub struct AnalysisFlow {
    client: Arc<InferenceClient>,
    slot: Mutex<Option<AnalysisOutcome>>,
    running: BusyFlag,
}

impl AnalysisFlow {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self {
            client,
            slot: Mutex::new(None),
            running: BusyFlag::default(),
        }
    }

    /// Analyse `image` with the fixed skin-analysis instruction.
    ///
    /// `None` fails with `NoImageSelected` before any network activity.
    /// While another run is in flight every call, with or without an image,
    /// gets `Busy` and the slot is left for the running call.
    /// Runs to completion once started; a result that arrives after the user
    /// picked another image still lands in the slot.
    pub async fn run_analysis(
        &self,
        image: Option<&ImagePayload>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let Some(_guard) = self.running.try_acquire() else {
            return Err(AnalysisError::Busy);
        };

        let Some(image) = image else {
            let err = AnalysisError::NoImageSelected;
            self.store_failure(&err);
            return Err(err);
        };

        log::info!(
            "Starting analysis ({}, {} bytes)",
            image.mime_type(),
            image.len()
        );
        let request = InferenceRequest::with_image(ANALYSIS_PROMPT, image.clone());

        match self.client.invoke(&request).await {
            Ok(text) => {
                let result = AnalysisResult {
                    text,
                    timestamp: Local::now(),
                };
                *self.lock_slot() = Some(AnalysisOutcome::Completed(result.clone()));
                log::info!("Analysis complete ({} chars)", result.text.len());
                Ok(result)
            }
            Err(e) => {
                let err = AnalysisError::Inference(e);
                log::error!("Analysis error: {}", err);
                self.store_failure(&err);
                Err(err)
            }
        }
    }

    pub fn result(&self) -> Option<AnalysisOutcome> {
        self.lock_slot().clone()
    }

    /// Empty the slot, e.g. when a new image is selected.
    pub fn clear(&self) {
        *self.lock_slot() = None;
    }

    pub fn is_running(&self) -> bool {
        self.running.is_busy()
    }

    fn store_failure(&self, err: &AnalysisError) {
        *self.lock_slot() = Some(AnalysisOutcome::Failed {
            message: err.to_string(),
        });
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<AnalysisOutcome>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

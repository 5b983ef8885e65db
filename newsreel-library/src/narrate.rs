//! Narration pipeline: speech → blob → record
//!
//! Generates the audio for a story, stores it, and records the normalized
//! alignment alongside. Consumers that did not start the generation wait for
//! it with `await_audio`.

use crate::poll::{PollOutcome, PollStep, Poller};
use crate::speech::{ServiceError, SpeechService};
use crate::store::{GenerationStatus, MediaStore, RecordUpdate, StoreError, StoryRecord};
use base64::Engine;
use newsreel_analysis::{normalize, NormalizedAlignment};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarrationError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Speech audio is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("Narration for {story_id} failed: {reason}")]
    GenerationFailed { story_id: String, reason: String },
    #[error("Timed out waiting for narration of {story_id} after {attempts} attempts")]
    Timeout { story_id: String, attempts: u32 },
}

/// Result of a successful narration
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub audio_url: String,
    pub alignment: Option<NormalizedAlignment>,
}

pub struct Narrator {
    speech: Arc<dyn SpeechService>,
    store: Arc<dyn MediaStore>,
    poller: Poller,
}

impl Narrator {
    pub fn new(speech: Arc<dyn SpeechService>, store: Arc<dyn MediaStore>) -> Self {
        Self {
            speech,
            store,
            poller: Poller::default(),
        }
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    /// Generate, store, and record narration for `story_id`.
    ///
    /// The record is marked `Failed` with the error message if any step
    /// fails; service errors are returned unchanged.
    pub fn narrate(
        &self,
        story_id: &str,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<Narration, NarrationError> {
        self.store
            .update_record(story_id, &RecordUpdate::status(GenerationStatus::Processing))?;

        match self.generate(story_id, text, voice_id) {
            Ok(narration) => {
                tracing::info!(
                    story = story_id,
                    aligned = narration.alignment.is_some(),
                    "Narration ready"
                );
                Ok(narration)
            }
            Err(e) => {
                tracing::warn!(story = story_id, error = %e, "Narration failed");
                let failed = RecordUpdate {
                    status: Some(GenerationStatus::Failed),
                    error: Some(Some(e.to_string())),
                    ..Default::default()
                };
                if let Err(store_err) = self.store.update_record(story_id, &failed) {
                    tracing::warn!(story = story_id, error = %store_err, "Could not record failure");
                }
                Err(e)
            }
        }
    }

    fn generate(
        &self,
        story_id: &str,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<Narration, NarrationError> {
        let speech = self.speech.generate_speech(text, voice_id)?;
        let audio = base64::engine::general_purpose::STANDARD.decode(speech.audio_base64.trim())?;

        let audio_url = self.store.upload(
            &audio,
            &format!("narration/{story_id}.mp3"),
            "audio/mpeg",
        )?;
        let alignment = normalize(speech.alignment.as_ref());

        self.store.update_record(
            story_id,
            &RecordUpdate {
                audio_url: Some(audio_url.clone()),
                alignment: Some(alignment.clone()),
                status: Some(GenerationStatus::Completed),
                error: Some(None),
            },
        )?;

        Ok(Narration {
            audio_url,
            alignment,
        })
    }

    /// Wait for someone else's generation of `story_id` to finish
    pub fn await_audio(&self, story_id: &str) -> Result<StoryRecord, NarrationError> {
        await_record(self.store.as_ref(), &self.poller, story_id)
    }
}

/// Poll `story_id` until its audio is ready, its generation failed, or the
/// poller runs out of attempts. A missing record counts as pending.
pub fn await_record(
    store: &dyn MediaStore,
    poller: &Poller,
    story_id: &str,
) -> Result<StoryRecord, NarrationError> {
    let outcome = poller.run(|_| -> Result<PollStep<StoryRecord>, NarrationError> {
        let step = match store.get_record(story_id)? {
            Some(record) => match record.status {
                GenerationStatus::Completed if record.audio_url.is_some() => {
                    PollStep::Ready(record)
                }
                GenerationStatus::Failed => PollStep::Failed(
                    record
                        .error
                        .unwrap_or_else(|| "generation failed".to_string()),
                ),
                _ => PollStep::Pending,
            },
            None => PollStep::Pending,
        };
        Ok(step)
    })?;

    match outcome {
        PollOutcome::Ready(record) => Ok(record),
        PollOutcome::Failed(reason) => Err(NarrationError::GenerationFailed {
            story_id: story_id.to_string(),
            reason,
        }),
        PollOutcome::Timeout { attempts } => Err(NarrationError::Timeout {
            story_id: story_id.to_string(),
            attempts,
        }),
    }
}

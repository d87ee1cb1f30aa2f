use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::control::domain::bus_message::RoundStatus;
use crate::control::domain::control_state::SharedControlState;
use crate::control::domain::status_reporter::StatusReporter;
use crate::generation::domain::face_describer::FaceDescriber;
use crate::generation::domain::generation_backend::{GenerationBackend, GenerationRequest};
use crate::generation::domain::generation_job::GenerationJob;
use crate::generation::domain::prompt::PromptStyle;
use crate::generation::domain::result_store::ResultStore;
use crate::generation::domain::retry::{retry_with_backoff, RetryPolicy, RetryResult};
use crate::shared::constants::FALLBACK_DESCRIPTION;

#[derive(Clone, Debug, PartialEq)]
pub struct StyleResult {
    pub style: String,
    pub result: RetryResult,
    /// Files written by the result store for this style.
    pub saved: Vec<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FaceResult {
    pub index: usize,
    pub description: String,
    pub styles: Vec<StyleResult>,
}

impl FaceResult {
    /// Locations of every successful output for this face.
    pub fn outputs(&self) -> Vec<&str> {
        self.styles
            .iter()
            .filter_map(|s| s.result.outputs())
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationReport {
    pub round: u64,
    pub faces: Vec<FaceResult>,
}

impl GenerationReport {
    pub fn succeeded(&self) -> usize {
        self.faces
            .iter()
            .flat_map(|f| &f.styles)
            .filter(|s| s.result.outputs().is_some())
            .count()
    }
}

/// Describes each face and generates one picture per style.
///
/// Individual failures never abort the round: exhausted or fatal styles are
/// recorded in the report and the next style or face goes ahead.
pub struct GenerationDispatcher {
    describer: Box<dyn FaceDescriber>,
    backend: Box<dyn GenerationBackend>,
    store: Option<Box<dyn ResultStore>>,
    styles: Vec<PromptStyle>,
    policy: RetryPolicy,
}

impl GenerationDispatcher {
    pub fn new(
        describer: Box<dyn FaceDescriber>,
        backend: Box<dyn GenerationBackend>,
        styles: Vec<PromptStyle>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            describer,
            backend,
            store: None,
            styles,
            policy,
        }
    }

    pub fn with_store(mut self, store: Box<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn run(&mut self, job: &GenerationJob) -> GenerationReport {
        log::info!(
            "Round {}: generating {} styles for {} faces",
            job.round,
            self.styles.len(),
            job.faces.len()
        );
        let mut faces: Vec<_> = job.faces.iter().collect();
        faces.sort_by_key(|f| f.index);

        let mut results = Vec::with_capacity(faces.len());
        for face in faces {
            let description = match self.describer.describe(face) {
                Ok(d) if !d.trim().is_empty() => d,
                Ok(_) => FALLBACK_DESCRIPTION.to_string(),
                Err(e) => {
                    log::warn!("Could not describe face {}: {e}", face.index);
                    FALLBACK_DESCRIPTION.to_string()
                }
            };
            log::info!("Face {}: {description}", face.index);

            let mut styles = Vec::with_capacity(self.styles.len());
            for style in &self.styles {
                let request = GenerationRequest {
                    face,
                    style,
                    prompt: style.compose(&description),
                };
                let label = format!("face {} style {}", face.index, style.name);
                let backend = &mut self.backend;
                let result =
                    retry_with_backoff(&self.policy, &label, |_| backend.generate(&request));

                let saved = match (&mut self.store, result.outputs()) {
                    (Some(store), Some(outputs)) => {
                        persist(store.as_mut(), outputs, &style.name, face.index)
                    }
                    _ => Vec::new(),
                };
                styles.push(StyleResult {
                    style: style.name.clone(),
                    result,
                    saved,
                });
            }

            results.push(FaceResult {
                index: face.index,
                description,
                styles,
            });
        }

        let report = GenerationReport {
            round: job.round,
            faces: results,
        };
        log::info!(
            "Round {} generation finished: {}/{} pictures",
            report.round,
            report.succeeded(),
            job.faces.len() * self.styles.len()
        );
        report
    }
}

fn persist(
    store: &mut dyn ResultStore,
    outputs: &[String],
    style: &str,
    face_index: usize,
) -> Vec<PathBuf> {
    let mut saved = Vec::new();
    for location in outputs {
        match store.store(location, style, face_index) {
            Ok(paths) => saved.extend(paths),
            Err(e) => log::warn!("Could not save {location}: {e}"),
        }
    }
    saved
}

/// Runs jobs from `jobs` until the channel closes.
///
/// Jobs whose round was reset before they were picked up are skipped. When a
/// round is still current after generation, the control state is cleared for
/// the next start-game and the node publishes idle. Reports of rounds that
/// ran go to `reports` when given.
pub fn spawn_generation_worker(
    mut dispatcher: GenerationDispatcher,
    jobs: Receiver<GenerationJob>,
    state: SharedControlState,
    reporter: StatusReporter,
    reports: Option<Sender<GenerationReport>>,
) -> JoinHandle<GenerationDispatcher> {
    std::thread::spawn(move || {
        for job in jobs {
            if !state.lock().is_generating(job.round) {
                log::info!("Round {} was aborted, skipping generation", job.round);
                continue;
            }
            let report = dispatcher.run(&job);
            match state.lock().finish_generation(job.round) {
                Ok(()) => reporter.round_status(RoundStatus::Idle),
                Err(e) => log::info!("Round {} results dropped: {e}", job.round),
            }
            if let Some(tx) = &reports {
                let _ = tx.send(report);
            }
        }
        log::debug!("Generation worker exiting");
        dispatcher
    })
}

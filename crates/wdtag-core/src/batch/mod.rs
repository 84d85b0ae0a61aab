//! Batch orchestration.
//!
//! A [`BatchOrchestrator`] walks a list of images one at a time. For each
//! image it asks the [`OutputReconciler`] what to do, tags it through a
//! [`TagBackend`] when needed, writes the tag file, and reports a
//! [`ProgressEvent`]. Failures are recorded against the image and the run
//! moves on. Only one run per orchestrator is admitted at a time.

pub mod progress;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PipelineError, RunError};
use crate::inference::InferenceEngine;
use crate::model::ModelProvider;
use crate::pipeline::ImagePreprocessor;
use crate::reconcile::{OutputReconciler, DEFAULT_STALE_THRESHOLD_BYTES};
use crate::types::{Disposition, Outcome, TagResult};

pub use progress::{BatchSummary, NoopObserver, ProgressEvent, ProgressObserver, RunCounts};
pub use run::CancelToken;

use run::{BatchRun, RunGuard};

/// Longest tag preview placed in a progress event.
const PREVIEW_CHARS: usize = 80;

/// Produces tags for one image. Called from a blocking worker thread.
pub trait TagBackend: Send + Sync {
    fn tag(&self, image: &Path, model: &str, threshold: f32) -> Result<TagResult, PipelineError>;
}

/// The ONNX-backed tagger: acquire the model, preprocess, infer.
pub struct OnnxBackend {
    provider: Arc<dyn ModelProvider>,
    preprocessor: ImagePreprocessor,
}

impl OnnxBackend {
    pub fn new(provider: Arc<dyn ModelProvider>, preprocessor: ImagePreprocessor) -> Self {
        Self {
            provider,
            preprocessor,
        }
    }
}

impl TagBackend for OnnxBackend {
    fn tag(&self, image: &Path, model: &str, threshold: f32) -> Result<TagResult, PipelineError> {
        let bundle = self.provider.acquire(model)?;
        let tensor = self.preprocessor.prepare_for(image, &bundle.session)?;
        InferenceEngine::tag(&tensor, &bundle, threshold, image)
    }
}

/// One invocation of [`BatchOrchestrator::start`].
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Images in processing order
    pub images: Vec<PathBuf>,
    pub model: String,
    pub threshold: f32,
    pub output_dir: PathBuf,
    /// Existing tag files larger than this are regenerated
    pub stale_threshold_bytes: u64,
    pub cancel: CancelToken,
}

impl BatchRequest {
    pub fn new(
        images: Vec<PathBuf>,
        model: impl Into<String>,
        threshold: f32,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            images,
            model: model.into(),
            threshold,
            output_dir: output_dir.into(),
            stale_threshold_bytes: DEFAULT_STALE_THRESHOLD_BYTES,
            cancel: CancelToken::default(),
        }
    }

    pub fn with_stale_threshold(mut self, bytes: u64) -> Self {
        self.stale_threshold_bytes = bytes;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Runs batches against a tag backend, one at a time.
pub struct BatchOrchestrator {
    backend: Arc<dyn TagBackend>,
    running: Arc<AtomicBool>,
}

impl BatchOrchestrator {
    pub fn new(backend: Arc<dyn TagBackend>) -> Self {
        Self {
            backend,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Process every image in `request`, reporting to `observer`.
    ///
    /// Returns immediately with [`RunError::AlreadyRunning`] if another run
    /// holds this orchestrator, or [`RunError::EmptyInput`] if there is
    /// nothing to do. Per-image failures are reported through events and the
    /// summary, never as an `Err`.
    ///
    /// If the returned future is dropped mid-run, no further images start,
    /// but the image already on the blocking pool finishes writing and the
    /// orchestrator stays busy until it does.
    pub async fn start(
        &self,
        request: BatchRequest,
        observer: &mut dyn ProgressObserver,
    ) -> Result<BatchSummary, RunError> {
        if self.is_running() {
            tracing::warn!("Batch already running, rejecting new request");
            return Err(RunError::AlreadyRunning);
        }
        if request.images.is_empty() {
            return Err(RunError::EmptyInput);
        }
        let guard = Arc::new(RunGuard::acquire(&self.running).ok_or(RunError::AlreadyRunning)?);

        let total = request.images.len();
        let reconciler = Arc::new(
            OutputReconciler::new(&request.output_dir)
                .with_stale_threshold(request.stale_threshold_bytes),
        );
        let mut run = BatchRun::new(total);

        tracing::info!(
            "Tagging {} image(s) with {} at threshold {} into {:?}",
            total,
            request.model,
            request.threshold,
            request.output_dir
        );

        for (i, image) in request.images.iter().enumerate() {
            if request.cancel.is_cancelled() {
                tracing::info!("Batch cancelled after {} of {} image(s)", i, total);
                run.mark_cancelled();
                break;
            }

            let (outcome, detail) = self.run_unit(image, &request, &reconciler, &guard).await;
            run.record(outcome);

            if outcome == Outcome::Failed {
                tracing::warn!("Failed: {:?} - {}", image, detail);
            } else {
                tracing::debug!("{}: {:?} - {}", outcome, image, detail);
            }

            observer.on_image(&ProgressEvent {
                index: i + 1,
                total,
                image: image.clone(),
                outcome,
                detail,
                counts: run.counts(),
            });
        }

        let summary = run.summary();
        tracing::info!(
            "Batch finished: {} completed ({} retagged), {} skipped, {} failed in {:.1}s",
            summary.completed,
            summary.retagged,
            summary.skipped,
            summary.failed,
            summary.elapsed.as_secs_f64()
        );
        observer.on_finish(&summary);

        Ok(summary)
    }

    /// Run one image on the blocking pool and wait for it.
    async fn run_unit(
        &self,
        image: &Path,
        request: &BatchRequest,
        reconciler: &Arc<OutputReconciler>,
        guard: &Arc<RunGuard>,
    ) -> (Outcome, String) {
        let backend = Arc::clone(&self.backend);
        let reconciler = Arc::clone(reconciler);
        let guard = Arc::clone(guard);
        let path = image.to_path_buf();
        let model = request.model.clone();
        let threshold = request.threshold;

        let joined = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            process_image(backend.as_ref(), &reconciler, &path, &model, threshold)
        })
        .await;

        let result = joined.unwrap_or_else(|e| {
            Err(PipelineError::Worker {
                path: image.to_path_buf(),
                message: e.to_string(),
            })
        });

        match result {
            Ok(done) => done,
            Err(e) => (Outcome::Failed, e.to_string()),
        }
    }
}

/// Reconcile, tag and persist a single image.
fn process_image(
    backend: &dyn TagBackend,
    reconciler: &OutputReconciler,
    image: &Path,
    model: &str,
    threshold: f32,
) -> Result<(Outcome, String), PipelineError> {
    let artifact = reconciler.artifact_path(image);
    let artifact_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let retag = match reconciler.reconcile(image)? {
        Disposition::Skip => {
            return Ok((
                Outcome::Skipped,
                format!("Skipped (txt exists): {artifact_name}"),
            ))
        }
        Disposition::Retag => {
            reconciler.remove_stale(image)?;
            true
        }
        Disposition::New => false,
    };

    let tags = backend.tag(image, model, threshold)?;
    let joined = tags.joined();
    reconciler.persist(image, &joined)?;

    if retag {
        Ok((Outcome::Retagged, format!("Retagged: {artifact_name}")))
    } else {
        Ok((Outcome::Completed, preview(&joined)))
    }
}

fn preview(joined: &str) -> String {
    if joined.chars().count() <= PREVIEW_CHARS {
        joined.to_string()
    } else {
        let cut: String = joined.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::model::{ModelRegistry, MODEL_FILENAME};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Backend returning fixed tags and counting calls.
    #[derive(Default)]
    struct StubBackend {
        tags: Vec<String>,
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    impl StubBackend {
        fn with_tags(tags: &[&str]) -> Self {
            Self {
                tags: tags.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    impl TagBackend for StubBackend {
        fn tag(
            &self,
            image: &Path,
            _model: &str,
            threshold: f32,
        ) -> Result<TagResult, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(name) = self.fail_on {
                if image.ends_with(name) {
                    return Err(PipelineError::Decode {
                        path: image.to_path_buf(),
                        message: "corrupt".into(),
                    });
                }
            }
            Ok(TagResult {
                tags: self.tags.clone(),
                threshold,
            })
        }
    }

    /// Backend that blocks until released.
    struct GatedBackend {
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl TagBackend for GatedBackend {
        fn tag(
            &self,
            _image: &Path,
            _model: &str,
            threshold: f32,
        ) -> Result<TagResult, PipelineError> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(TagResult {
                tags: vec!["cat".into()],
                threshold,
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<ProgressEvent>,
        summary: Option<BatchSummary>,
    }

    impl ProgressObserver for Recorder {
        fn on_image(&mut self, event: &ProgressEvent) {
            self.events.push(event.clone());
        }

        fn on_finish(&mut self, summary: &BatchSummary) {
            self.summary = Some(summary.clone());
        }
    }

    fn images(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/photos").join(n)).collect()
    }

    #[tokio::test]
    async fn test_new_images_are_tagged_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(StubBackend::with_tags(&["1girl", "solo"]));
        let orchestrator = BatchOrchestrator::new(backend.clone());
        let mut recorder = Recorder::default();

        let request = BatchRequest::new(images(&["a.jpg", "b.png"]), "m", 0.35, dir.path());
        let summary = orchestrator.start(request, &mut recorder).await.unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.attempted, 2);
        assert!(!summary.cancelled);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "1girl, solo"
        );
        assert_eq!(recorder.events[0].detail, "1girl, solo");
        assert_eq!(recorder.summary, Some(summary));
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_events_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = BatchOrchestrator::new(Arc::new(StubBackend::with_tags(&["cat"])));
        let mut recorder = Recorder::default();

        let names = ["z.jpg", "a.jpg", "m.jpg"];
        let request = BatchRequest::new(images(&names), "m", 0.35, dir.path());
        orchestrator.start(request, &mut recorder).await.unwrap();

        let indices: Vec<_> = recorder.events.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        let order: Vec<_> = recorder
            .events
            .iter()
            .map(|e| e.image.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(order, names);
        assert_eq!(recorder.events[2].counts.completed, 3);
    }

    #[tokio::test]
    async fn test_small_existing_file_is_skipped_without_tagging() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo.txt"), vec![b'a'; 500]).unwrap();

        let backend = Arc::new(StubBackend::with_tags(&["cat"]));
        let orchestrator = BatchOrchestrator::new(backend.clone());
        let mut recorder = Recorder::default();

        let request = BatchRequest::new(images(&["photo.jpg"]), "m", 0.35, dir.path());
        let summary = orchestrator.start(request, &mut recorder).await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.events[0].outcome, Outcome::Skipped);
        assert_eq!(recorder.events[0].detail, "Skipped (txt exists): photo.txt");
        assert_eq!(
            std::fs::read(dir.path().join("photo.txt")).unwrap(),
            vec![b'a'; 500]
        );
    }

    #[tokio::test]
    async fn test_large_existing_file_is_retagged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo.txt"), vec![b'E'; 2048]).unwrap();

        let backend = Arc::new(StubBackend::with_tags(&["hat"]));
        let orchestrator = BatchOrchestrator::new(backend.clone());
        let mut recorder = Recorder::default();

        let request = BatchRequest::new(images(&["photo.jpg"]), "m", 0.35, dir.path());
        let summary = orchestrator.start(request, &mut recorder).await.unwrap();

        assert_eq!(summary.retagged, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.events[0].outcome, Outcome::Retagged);
        assert_eq!(recorder.events[0].detail, "Retagged: photo.txt");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("photo.txt")).unwrap(),
            "hat"
        );
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(StubBackend::with_tags(&["cat", "hat"]));
        let orchestrator = BatchOrchestrator::new(backend.clone());

        let request = BatchRequest::new(images(&["photo.jpg"]), "m", 0.35, dir.path());
        orchestrator
            .start(request.clone(), &mut NoopObserver)
            .await
            .unwrap();
        let first = std::fs::read(dir.path().join("photo.txt")).unwrap();

        let summary = orchestrator.start(request, &mut NoopObserver).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(dir.path().join("photo.txt")).unwrap(), first);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(StubBackend {
            tags: vec!["cat".into()],
            fail_on: Some("bad.jpg"),
            ..Default::default()
        });
        let orchestrator = BatchOrchestrator::new(backend);
        let mut recorder = Recorder::default();

        let request =
            BatchRequest::new(images(&["a.jpg", "bad.jpg", "c.jpg"]), "m", 0.35, dir.path());
        let summary = orchestrator.start(request, &mut recorder).await.unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(recorder.events[1].outcome, Outcome::Failed);
        assert!(recorder.events[1].detail.contains("corrupt"));
        assert!(!dir.path().join("bad.txt").exists());
    }

    #[tokio::test]
    async fn test_no_tags_is_failure_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = BatchOrchestrator::new(Arc::new(StubBackend::with_tags(&[])));

        let request = BatchRequest::new(images(&["photo.jpg"]), "m", 0.35, dir.path());
        let summary = orchestrator.start(request, &mut NoopObserver).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert!(!dir.path().join("photo.txt").exists());
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let orchestrator = BatchOrchestrator::new(Arc::new(StubBackend::default()));
        let request = BatchRequest::new(vec![], "m", 0.35, "/tmp/unused");
        let err = orchestrator
            .start(request, &mut NoopObserver)
            .await
            .unwrap_err();
        assert_eq!(err, RunError::EmptyInput);
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let (release, gate) = std::sync::mpsc::channel();
        let orchestrator = BatchOrchestrator::new(Arc::new(GatedBackend {
            gate: Mutex::new(gate),
        }));
        let mut first_recorder = Recorder::default();

        let first = BatchRequest::new(images(&["a.jpg"]), "m", 0.35, dir.path());
        let second = BatchRequest::new(images(&["b.jpg"]), "m", 0.35, dir.path());

        let (first_result, second_result) = tokio::join!(
            orchestrator.start(first, &mut first_recorder),
            async {
                while !orchestrator.is_running() {
                    tokio::task::yield_now().await;
                }
                let rejected = orchestrator.start(second, &mut NoopObserver).await;
                release.send(()).unwrap();
                rejected
            }
        );

        assert_eq!(second_result.unwrap_err(), RunError::AlreadyRunning);
        let summary = first_result.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.total, 1);
        assert_eq!(first_recorder.events.len(), 1);
        assert!(!dir.path().join("b.txt").exists());
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_dropped_run_stays_busy_until_unit_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let (release, gate) = std::sync::mpsc::channel();
        let orchestrator = BatchOrchestrator::new(Arc::new(GatedBackend {
            gate: Mutex::new(gate),
        }));

        let request = BatchRequest::new(images(&["a.jpg", "b.jpg"]), "m", 0.35, dir.path());
        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            orchestrator.start(request, &mut NoopObserver),
        )
        .await;
        assert!(timed_out.is_err());

        // The first image is still on the blocking pool
        assert!(orchestrator.is_running());
        let retry = BatchRequest::new(images(&["c.jpg"]), "m", 0.35, dir.path());
        assert_eq!(
            orchestrator
                .start(retry.clone(), &mut NoopObserver)
                .await
                .unwrap_err(),
            RunError::AlreadyRunning
        );

        release.send(()).unwrap();
        for _ in 0..500 {
            if !orchestrator.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!orchestrator.is_running());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "cat"
        );
        assert!(!dir.path().join("b.txt").exists());

        release.send(()).unwrap();
        let summary = orchestrator.start(retry, &mut NoopObserver).await.unwrap();
        assert_eq!(summary.completed, 1);
    }

    #[tokio::test]
    async fn test_multi_dot_names_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(StubBackend::with_tags(&["cat"]));
        let orchestrator = BatchOrchestrator::new(backend.clone());

        let request = BatchRequest::new(images(&["a.1.jpg", "a.2.jpg"]), "m", 0.35, dir.path());
        let summary = orchestrator.start(request, &mut NoopObserver).await.unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(dir.path().join("a.1.txt").exists());
        assert!(dir.path().join("a.2.txt").exists());
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_cancel_stops_between_images() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = BatchOrchestrator::new(Arc::new(StubBackend::with_tags(&["cat"])));

        struct CancelAfterFirst(CancelToken);
        impl ProgressObserver for CancelAfterFirst {
            fn on_image(&mut self, _event: &ProgressEvent) {
                self.0.cancel();
            }
        }

        let token = CancelToken::new();
        let request = BatchRequest::new(images(&["a.jpg", "b.jpg", "c.jpg"]), "m", 0.35, dir.path())
            .with_cancel(token.clone());
        let summary = orchestrator
            .start(request, &mut CancelAfterFirst(token))
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.total, 3);
        assert!(dir.path().join("a.txt").exists());
        assert!(!dir.path().join("b.txt").exists());
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_missing_vocabulary_fails_every_image() {
        let models = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let bundle = models.path().join("broken");
        std::fs::create_dir_all(&bundle).unwrap();
        std::fs::write(bundle.join(MODEL_FILENAME), b"weights").unwrap();

        let provider = Arc::new(ModelRegistry::new(models.path()));
        let backend = OnnxBackend::new(
            provider,
            ImagePreprocessor::new(Default::default(), crate::pipeline::DEFAULT_TARGET_SIZE),
        );
        let orchestrator = BatchOrchestrator::new(Arc::new(backend));
        let mut recorder = Recorder::default();

        let request = BatchRequest::new(images(&["a.jpg", "b.jpg"]), "broken", 0.35, out.path());
        let summary = orchestrator.start(request, &mut recorder).await.unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.completed, 0);
        let expected = PipelineError::Model(ModelError::VocabularyMissing {
            name: "broken".into(),
            path: bundle.join(crate::model::VOCABULARY_FILENAME),
        })
        .to_string();
        assert!(recorder.events.iter().all(|e| e.detail == expected));
        assert!(!orchestrator.is_running());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("cat, hat"), "cat, hat");
        let long = "é".repeat(100);
        let cut = preview(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 3);
    }
}

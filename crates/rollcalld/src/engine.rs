use crate::config::Config;
use rollcall_core::detector::DetectorError;
use rollcall_core::liveness::LivenessError;
use rollcall_core::recognizer::RecognizerError;
use rollcall_core::{
    EnrollError, EnrollReport, FaceDetector, FaceModels, FaceRecognizer, FrameOutcome, Gallery, ImportError,
    ImportReport, RecognitionPipeline, SpoofClassifier, StoreError,
};
use rollcall_store::CsvAttendanceLog;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("liveness model error: {0}")]
    Liveness(#[from] LivenessError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("signature store error: {0}")]
    Store(#[from] StoreError),
    #[error("enrollment failed: {0}")]
    Enroll(#[from] EnrollError),
    #[error("dataset import failed: {0}")]
    Import(#[from] ImportError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    ProcessFrame {
        image: Vec<u8>,
        reply: oneshot::Sender<FrameOutcome>,
    },
    Enroll {
        roll_number: String,
        images: Vec<Vec<u8>>,
        reply: oneshot::Sender<Result<EnrollReport, EnrollError>>,
    },
    ImportDataset {
        dir: PathBuf,
        reply: oneshot::Sender<Result<ImportReport, ImportError>>,
    },
}

impl EngineRequest {
    /// The caller stopped waiting, typically after its timeout expired.
    fn is_abandoned(&self) -> bool {
        match self {
            EngineRequest::ProcessFrame { reply, .. } => reply.is_closed(),
            EngineRequest::Enroll { reply, .. } => reply.is_closed(),
            EngineRequest::ImportDataset { reply, .. } => reply.is_closed(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            EngineRequest::ProcessFrame { .. } => "process_frame",
            EngineRequest::Enroll { .. } => "enroll",
            EngineRequest::ImportDataset { .. } => "import_dataset",
        }
    }
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    gallery: Arc<Gallery>,
    timeout: Duration,
}

impl EngineHandle {
    /// Send one request and wait for its reply, bounded by the request timeout.
    ///
    /// A request that times out while queued is skipped by the engine. One
    /// already running finishes; its reply is dropped.
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(make(reply_tx))
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))?
    }

    /// Run one frame through the recognition pipeline.
    ///
    /// Engine failures and timeouts surface as [`FrameOutcome::ProcessingFailed`].
    pub async fn process_frame(&self, image: Vec<u8>) -> FrameOutcome {
        match self.request(|reply| EngineRequest::ProcessFrame { image, reply }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "frame processing failed");
                FrameOutcome::ProcessingFailed
            }
        }
    }

    /// Enroll `roll_number` from a batch of encoded images.
    pub async fn enroll(&self, roll_number: String, images: Vec<Vec<u8>>) -> Result<EnrollReport, EngineError> {
        Ok(self
            .request(|reply| EngineRequest::Enroll { roll_number, images, reply })
            .await??)
    }

    /// Enroll every identity folder under `dir`.
    pub async fn import_dataset(&self, dir: PathBuf) -> Result<ImportReport, EngineError> {
        Ok(self
            .request(|reply| EngineRequest::ImportDataset { dir, reply })
            .await??)
    }

    /// The gallery shared with the engine; safe to read or reload from any thread.
    pub fn gallery(&self) -> &Arc<Gallery> {
        &self.gallery
    }
}

/// Load the models and stores named by `config`, then start the engine.
///
/// Fails fast: a missing model or unopenable store aborts startup.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let detector = FaceDetector::load(&config.scrfd_model_path())?;
    tracing::info!(path = %config.scrfd_model_path(), "SCRFD detector loaded");

    let liveness = SpoofClassifier::load(&config.liveness_model_path())?;
    tracing::info!(path = %config.liveness_model_path(), "MiniFASNet classifier loaded");

    let recognizer = FaceRecognizer::load(&config.facenet_model_path())?;
    tracing::info!(path = %config.facenet_model_path(), "FaceNet extractor loaded");

    let store = config.store_backend.open(&config.store_path)?;
    let gallery = Arc::new(Gallery::load(store.clone()));
    let attendance = CsvAttendanceLog::new(&config.attendance_path);
    tracing::info!(path = %attendance.path().display(), "attendance log");

    let models = FaceModels {
        locator: Box::new(detector),
        liveness: Box::new(liveness),
        extractor: Box::new(recognizer),
    };
    let pipeline = RecognitionPipeline::new(models, store, gallery, Box::new(attendance), config.pipeline_config());

    spawn_pipeline(pipeline, config.request_timeout())
}

/// Move `pipeline` onto a dedicated OS thread and return a handle to it.
///
/// The thread owns the models, so inference is serialized.
pub fn spawn_pipeline(mut pipeline: RecognitionPipeline, timeout: Duration) -> Result<EngineHandle, EngineError> {
    let gallery = Arc::clone(pipeline.gallery());
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                if req.is_abandoned() {
                    tracing::debug!(request = req.kind(), "caller timed out while queued; skipping");
                    continue;
                }
                match req {
                    EngineRequest::ProcessFrame { image, reply } => {
                        let outcome = pipeline.process_frame(&image);
                        tracing::debug!(status = outcome.status(), "frame processed");
                        let _ = reply.send(outcome);
                    }
                    EngineRequest::Enroll {
                        roll_number,
                        images,
                        reply,
                    } => {
                        let _ = reply.send(pipeline.enroll(&roll_number, &images));
                    }
                    EngineRequest::ImportDataset { dir, reply } => {
                        let _ = reply.send(pipeline.import_dataset(&dir));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, gallery, timeout })
}

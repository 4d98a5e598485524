//! Recognition adapters.
//!
//! Thin wrappers around third-party OCR and object detection. Each adapter
//! returns `anyhow::Result`; [`RecognitionPipeline`] turns adapter failures
//! into recorded outcomes instead of propagating them.

mod coco;
pub mod metadata;
mod ocr;
mod yolo;

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::core::config::{OcrEngineKind, RecognitionConfig};

pub use ocr::{OcrsRecognizer, TesseractRecognizer};
pub use yolo::YoloDetector;

/// Extracts text from an image file
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract_text(&self, path: &Path) -> anyhow::Result<String>;
}

/// Finds labelled objects in an image file
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(&self, path: &Path) -> anyhow::Result<Vec<Detection>>;
}

/// One detected object, box in source-image pixels as `[x1, y1, x2, y2]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

/// Stands in for an adapter whose model could not be loaded, so every
/// analysis records why recognition did not run.
pub struct Unavailable {
    name: &'static str,
    reason: String,
}

impl Unavailable {
    pub fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TextRecognizer for Unavailable {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn extract_text(&self, _path: &Path) -> anyhow::Result<String> {
        anyhow::bail!("{} unavailable: {}", self.name, self.reason)
    }
}

#[async_trait]
impl ObjectDetector for Unavailable {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn detect(&self, _path: &Path) -> anyhow::Result<Vec<Detection>> {
        anyhow::bail!("{} unavailable: {}", self.name, self.reason)
    }
}

/// What the adapters produced for one file
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionOutcome {
    pub extracted_text: String,
    /// Comma-joined labels, or the detector's error message
    pub detected_objects: String,
    pub confidence: Option<f64>,
    /// Adapters that ran, e.g. `ocr+yolo`
    pub method: String,
    pub errors: Vec<String>,
}

impl RecognitionOutcome {
    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// The configured adapters, shared by every request
#[derive(Clone)]
pub struct RecognitionPipeline {
    ocr: Option<Arc<dyn TextRecognizer>>,
    detector: Option<Arc<dyn ObjectDetector>>,
}

impl RecognitionPipeline {
    pub fn new(
        ocr: Option<Arc<dyn TextRecognizer>>,
        detector: Option<Arc<dyn ObjectDetector>>,
    ) -> Self {
        Self { ocr, detector }
    }

    /// Load the adapters enabled in the configuration.
    ///
    /// Models are loaded once here; a model that fails to load is replaced by
    /// an [`Unavailable`] adapter carrying the load error.
    pub fn from_config(config: &RecognitionConfig) -> Self {
        let ocr: Option<Arc<dyn TextRecognizer>> = if !config.enable_ocr {
            tracing::info!("OCR disabled");
            None
        } else {
            match config.ocr_engine {
                OcrEngineKind::Tesseract => {
                    tracing::info!("OCR engine: tesseract ({})", config.tesseract_cmd);
                    Some(Arc::new(TesseractRecognizer::new(&config.tesseract_cmd)))
                }
                OcrEngineKind::Ocrs => match OcrsRecognizer::load(
                    &config.ocrs_detection_model,
                    &config.ocrs_recognition_model,
                ) {
                    Ok(recognizer) => {
                        tracing::info!("OCR engine: ocrs");
                        Some(Arc::new(recognizer))
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load ocrs models: {:#}", e);
                        Some(Arc::new(Unavailable::new("ocr", format!("{:#}", e))))
                    }
                },
            }
        };

        let detector: Option<Arc<dyn ObjectDetector>> = if !config.enable_yolo {
            tracing::info!("Object detection disabled");
            None
        } else {
            match YoloDetector::load(
                &config.yolo_model_path,
                config.detection_confidence,
                config.detection_iou,
            ) {
                Ok(detector) => {
                    tracing::info!(
                        "YOLO model loaded from {}",
                        config.yolo_model_path.display()
                    );
                    Some(Arc::new(detector))
                }
                Err(e) => {
                    tracing::warn!("Failed to load YOLO model: {:#}", e);
                    Some(Arc::new(Unavailable::new("yolo", format!("{:#}", e))))
                }
            }
        };

        Self::new(ocr, detector)
    }

    /// Run every enabled adapter against the file.
    ///
    /// OCR only runs for `image/*` files. Adapter errors are captured in the
    /// outcome and never returned.
    pub async fn analyze(&self, path: &Path, mime_type: &str) -> RecognitionOutcome {
        let ocr = self
            .ocr
            .as_ref()
            .filter(|_| mime_type.starts_with("image/"));

        let ocr_task = async {
            match ocr {
                Some(ocr) => Some((ocr.name(), ocr.extract_text(path).await)),
                None => None,
            }
        };
        let detect_task = async {
            match &self.detector {
                Some(detector) => Some((detector.name(), detector.detect(path).await)),
                None => None,
            }
        };
        let (ocr_result, detect_result) = tokio::join!(ocr_task, detect_task);

        let mut methods = Vec::new();
        let mut errors = Vec::new();

        let extracted_text = match ocr_result {
            Some((name, Ok(text))) => {
                methods.push(name);
                text
            }
            Some((name, Err(e))) => {
                methods.push(name);
                let message = format!("OCR failed: {:#}", e);
                tracing::warn!("{} on {}", message, path.display());
                errors.push(message.clone());
                message
            }
            None => String::new(),
        };

        let (detected_objects, confidence) = match detect_result {
            Some((name, Ok(detections))) => {
                methods.push(name);
                let confidence = detections
                    .iter()
                    .map(|d| d.confidence as f64)
                    .fold(None, |best: Option<f64>, c| Some(best.map_or(c, |b| b.max(c))));
                (join_labels(&detections), confidence)
            }
            Some((name, Err(e))) => {
                methods.push(name);
                let message = format!("Detection failed: {:#}", e);
                tracing::warn!("{} on {}", message, path.display());
                errors.push(message.clone());
                (message, None)
            }
            None => (String::new(), None),
        };

        let method = if methods.is_empty() {
            "none".to_string()
        } else {
            methods.join("+")
        };

        RecognitionOutcome {
            extracted_text,
            detected_objects,
            confidence,
            method,
            errors,
        }
    }
}

/// Unique labels, most confident first, comma-joined
pub fn join_labels(detections: &[Detection]) -> String {
    let mut sorted: Vec<&Detection> = detections.iter().collect();
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut labels: Vec<&str> = Vec::new();
    for detection in sorted {
        if !labels.contains(&detection.label.as_str()) {
            labels.push(&detection.label);
        }
    }
    labels.join(",")
}

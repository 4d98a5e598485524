use anyhow::{anyhow, Context};
use async_trait::async_trait;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::process::Command;

use super::TextRecognizer;

/// OCR through the `tesseract` command-line binary
pub struct TesseractRecognizer {
    command: String,
}

impl TesseractRecognizer {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &'static str {
        "ocr"
    }

    async fn extract_text(&self, path: &Path) -> anyhow::Result<String> {
        // `stdout` as the output base makes tesseract print instead of writing a file
        let output = Command::new(&self.command)
            .arg(path)
            .arg("stdout")
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.command))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// In-process OCR with the `ocrs` detection and recognition models
pub struct OcrsRecognizer {
    engine: Arc<Mutex<OcrEngine>>,
}

impl OcrsRecognizer {
    pub fn load(detection_model_path: &Path, recognition_model_path: &Path) -> anyhow::Result<Self> {
        if !detection_model_path.exists() || !recognition_model_path.exists() {
            anyhow::bail!(
                "OCR models not found. Expected locations:\n  - {}\n  - {}",
                detection_model_path.display(),
                recognition_model_path.display()
            );
        }

        let detection_model = Model::load_file(detection_model_path)
            .with_context(|| format!("loading {}", detection_model_path.display()))?;
        let recognition_model = Model::load_file(recognition_model_path)
            .with_context(|| format!("loading {}", recognition_model_path.display()))?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })?;

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
        })
    }
}

#[async_trait]
impl TextRecognizer for OcrsRecognizer {
    fn name(&self) -> &'static str {
        "ocr"
    }

    async fn extract_text(&self, path: &Path) -> anyhow::Result<String> {
        let engine = Arc::clone(&self.engine);
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            let img = image::open(&path)
                .with_context(|| format!("opening {}", path.display()))?
                .into_rgb8();

            let source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
                .map_err(|e| anyhow!("invalid image for OCR: {:?}", e))?;

            let engine = engine
                .lock()
                .map_err(|_| anyhow!("OCR engine lock poisoned"))?;
            let input = engine.prepare_input(source)?;
            let text = engine.get_text(&input)?;

            Ok(text.trim().to_string())
        })
        .await?
    }
}

//! YOLOv8 object detection on an `.rten` export of the model.
//!
//! Input is a letterboxed `[1, 3, 640, 640]` RGB tensor in `0..=1`; output is
//! `[1, 4 + classes, anchors]` with boxes as centre/size in input pixels.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::NdTensor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::coco::label_for;
use super::{Detection, ObjectDetector};

const INPUT_SIZE: u32 = 640;
const PAD_VALUE: u8 = 114;
const BOX_ATTRS: usize = 4;

pub struct YoloDetector {
    model: Arc<Mutex<Model>>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn load(path: &Path, confidence_threshold: f32, iou_threshold: f32) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("YOLO model not found at {}", path.display());
        }

        let model =
            Model::load_file(path).with_context(|| format!("loading {}", path.display()))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            confidence_threshold,
            iou_threshold,
        })
    }
}

#[async_trait]
impl ObjectDetector for YoloDetector {
    fn name(&self) -> &'static str {
        "yolo"
    }

    async fn detect(&self, path: &Path) -> anyhow::Result<Vec<Detection>> {
        let model = Arc::clone(&self.model);
        let path = path.to_path_buf();
        let confidence_threshold = self.confidence_threshold;
        let iou_threshold = self.iou_threshold;

        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Detection>> {
            let img = image::open(&path).with_context(|| format!("opening {}", path.display()))?;
            let source_size = img.dimensions();
            let mut letterboxed = letterbox(&img, INPUT_SIZE);

            let side = INPUT_SIZE as usize;
            let input = NdTensor::from_data([1, 3, side, side], std::mem::take(&mut letterboxed.data));

            let model = model
                .lock()
                .map_err(|_| anyhow!("YOLO model lock poisoned"))?;
            let output = model.run_one(input.view().into(), None)?;
            let output: NdTensor<f32, 3> = output
                .try_into()
                .map_err(|e| anyhow!("unexpected detector output: {:?}", e))?;

            let [_, attrs, anchors] = output.shape();
            let raw = output.to_vec();

            Ok(decode(
                &raw,
                attrs,
                anchors,
                &letterboxed,
                source_size,
                confidence_threshold,
                iou_threshold,
            ))
        })
        .await?
    }
}

/// An image scaled into a square canvas, keeping its aspect ratio
pub(crate) struct Letterbox {
    /// CHW planes, RGB, normalized to `0..=1`
    pub data: Vec<f32>,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

pub(crate) fn letterbox(img: &DynamicImage, size: u32) -> Letterbox {
    let (width, height) = img.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);

    let resized = image::imageops::resize(&img.to_rgb8(), new_width, new_height, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;
    image::imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let plane = (size * size) as usize;
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let idx = (y * size + x) as usize;
        for channel in 0..3 {
            data[channel * plane + idx] = pixel[channel] as f32 / 255.0;
        }
    }

    Letterbox {
        data,
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    }
}

/// Turn raw `[attrs, anchors]` output into detections in source-image pixels
pub(crate) fn decode(
    output: &[f32],
    attrs: usize,
    anchors: usize,
    letterbox: &Letterbox,
    source_size: (u32, u32),
    confidence_threshold: f32,
    iou_threshold: f32,
) -> Vec<Detection> {
    if attrs <= BOX_ATTRS || output.len() < attrs * anchors {
        return Vec::new();
    }

    let (source_width, source_height) = (source_size.0 as f32, source_size.1 as f32);
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let at = |attr: usize| output[attr * anchors + anchor];

        let (class_id, score) = (BOX_ATTRS..attrs)
            .map(|attr| (attr - BOX_ATTRS, at(attr)))
            .fold((0, f32::MIN), |best, current| {
                if current.1 > best.1 {
                    current
                } else {
                    best
                }
            });

        if score < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0), at(1), at(2), at(3));
        let unscale_x = |x: f32| ((x - letterbox.pad_x) / letterbox.scale).clamp(0.0, source_width);
        let unscale_y = |y: f32| ((y - letterbox.pad_y) / letterbox.scale).clamp(0.0, source_height);

        candidates.push((
            class_id,
            Detection {
                label: label_for(class_id),
                confidence: score,
                bbox: [
                    unscale_x(cx - w / 2.0),
                    unscale_y(cy - h / 2.0),
                    unscale_x(cx + w / 2.0),
                    unscale_y(cy + h / 2.0),
                ],
            },
        ));
    }

    non_max_suppression(candidates, iou_threshold)
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = inter_w * inter_h;
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Greedy per-class NMS, most confident first
fn non_max_suppression(mut candidates: Vec<(usize, Detection)>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));

    let mut kept: Vec<(usize, Detection)> = Vec::new();
    for (class_id, detection) in candidates {
        let overlaps = kept
            .iter()
            .any(|(k_class, k)| *k_class == class_id && iou(&k.bbox, &detection.bbox) > iou_threshold);
        if !overlaps {
            kept.push((class_id, detection));
        }
    }

    kept.into_iter().map(|(_, detection)| detection).collect()
}

//! Modules layer - Infrastructure components for external integrations
//!
//! Contains the file store and the OCR / object detection adapters.

pub mod recognition;
pub mod storage;

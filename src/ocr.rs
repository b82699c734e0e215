//! OCR collaborator interface and the snip context it produces.
//!
//! Native text recognition lives outside the core (one FFI call returning
//! text + confidence). The pipeline only sees this trait.

use serde::{Deserialize, Serialize};

use crate::error::OcrError;

/// Recognition quality requested from the OCR collaborator.
///
/// Classify runs at `Fast`; code-fix actions re-run at `Accurate` so every
/// bracket and quote survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionLevel {
    Fast,
    Accurate,
}

/// Screen region selected by the user, in physical pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnipRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Screen coordinates where the action menu should anchor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MenuAnchor {
    pub x: f64,
    pub y: f64,
}

/// What the OCR collaborator returns for one recognition pass.
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    pub text: String,
    /// Mean recognition confidence in [0, 1].
    pub confidence: f64,
}

impl OcrOutcome {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// The single seam between the pipeline and native text recognition.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, rect: SnipRect, level: RecognitionLevel) -> Result<OcrOutcome, OcrError>;
}

/// Everything the pipeline knows about one snip. Immutable after creation.
#[derive(Debug, Clone)]
pub struct SnipContext {
    pub text: String,
    pub confidence: f64,
    pub recognition_level: RecognitionLevel,
    pub platform: String,
    pub anchor: MenuAnchor,
    /// Region kept for accurate re-recognition; absent on the typed path.
    pub rect: Option<SnipRect>,
}

impl SnipContext {
    /// Build a snip context for the typed-command path: the user's text is
    /// treated exactly as if OCR had produced it at full confidence.
    pub fn from_typed_text(text: &str, platform: &str) -> Self {
        Self {
            text: text.to_string(),
            confidence: 1.0,
            recognition_level: RecognitionLevel::Accurate,
            platform: platform.to_string(),
            anchor: MenuAnchor { x: 0.0, y: 0.0 },
            rect: None,
        }
    }
}

use crate::config::prompt::{ PRESENTATION_END, PRESENTATION_START };

/// Result of splitting a model reply at the presentation markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerExtraction {
    /// Text to keep as the visible chat reply.
    pub explanation: String,
    /// Deck source between the markers, trimmed. `None` when no well-formed pair exists.
    pub body: Option<String>,
}

impl MarkerExtraction {
    pub fn has_presentation(&self) -> bool {
        self.body.is_some()
    }
}

/// Splits `text` at the first begin marker and the first end marker after it.
///
/// Without a well-formed pair the whole text is returned untouched as the
/// explanation.
pub fn extract_presentation(text: &str) -> MarkerExtraction {
    let untouched = || MarkerExtraction {
        explanation: text.to_string(),
        body: None,
    };

    let Some(start) = text.find(PRESENTATION_START) else {
        return untouched();
    };
    let body_start = start + PRESENTATION_START.len();
    let Some(end_offset) = text[body_start..].find(PRESENTATION_END) else {
        return untouched();
    };
    let body_end = body_start + end_offset;

    MarkerExtraction {
        explanation: text[..start].trim().to_string(),
        body: Some(text[body_start..body_end].trim().to_string()),
    }
}

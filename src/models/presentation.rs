use serde::{ Serialize, Deserialize };

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresentationSlide {
    pub title: String,
    pub content: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PresentationSlide {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: Vec::new(),
            notes: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresentationData {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    pub slides: Vec<PresentationSlide>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderedPresentation {
    pub markdown: String,
    pub html: String,
    pub css: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationMetadata {
    pub title: String,
    pub author: String,
    pub slide_count: usize,
    pub created_at: String,
}

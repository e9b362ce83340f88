pub mod extractor;
pub mod markdown;
pub mod parser;
pub mod renderer;

pub use extractor::{ extract_presentation, MarkerExtraction };
pub use markdown::generate_markdown;
pub use parser::{ is_native_deck, parse_presentation, DEFAULT_TITLE };
pub use renderer::{ MarpitRenderer, RenderError, SlideRenderer };

use chrono::{ SecondsFormat, Utc };
use log::{ debug, info };
use thiserror::Error;

use crate::models::presentation::{ PresentationMetadata, RenderedPresentation };

#[derive(Debug, Error)]
pub enum PresentationError {
    #[error("Could not parse presentation content")]
    NoStructure,
    #[error("Failed to render presentation: {0}")]
    Render(#[from] RenderError),
}

/// Turns request content into a rendered deck plus its metadata.
///
/// Content that already looks like native deck Markdown is rendered as-is;
/// anything else goes through the line classifier first, and the request's
/// title and author override whatever the classifier found.
pub fn build_presentation(
    content: &str,
    title: Option<&str>,
    author: Option<&str>,
    default_author: &str,
    renderer: &dyn SlideRenderer
) -> Result<(RenderedPresentation, PresentationMetadata), PresentationError> {
    let title = title.filter(|t| !t.is_empty());
    let author = author.filter(|a| !a.is_empty());
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    if is_native_deck(content) {
        debug!("Content is native deck Markdown, rendering directly");
        let rendered = renderer.render(content)?;
        let metadata = PresentationMetadata {
            title: first_h1(content)
                .or(title)
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            author: author.unwrap_or(default_author).to_string(),
            slide_count: content
                .lines()
                .filter(|l| *l == "---")
                .count(),
            created_at,
        };
        return Ok((rendered, metadata));
    }

    let mut data = parse_presentation(content, default_author).ok_or(PresentationError::NoStructure)?;
    if let Some(title) = title {
        data.title = title.to_string();
    }
    if let Some(author) = author {
        data.author = Some(author.to_string());
    }
    info!("Parsed {} slide(s) for '{}'", data.slides.len(), data.title);

    let rendered = renderer.render(&generate_markdown(&data))?;
    let metadata = PresentationMetadata {
        title: data.title,
        author: data.author.unwrap_or_else(|| default_author.to_string()),
        slide_count: data.slides.len(),
        created_at,
    };
    Ok((rendered, metadata))
}

/// Text of the first `# ` heading line.
fn first_h1(content: &str) -> Option<&str> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix('#')?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let text = rest.trim();
        (!text.is_empty()).then_some(text)
    })
}

//! Heuristic conversion of loosely formatted model output into slides.
//!
//! Model output is not guaranteed to follow any format, so the classifier
//! never fails on an unexpected line: it drops what it cannot place and only
//! reports failure when no slide heading was seen at all.

use crate::models::presentation::{ PresentationData, PresentationSlide };

pub const DEFAULT_TITLE: &str = "AI Generated Presentation";

/// True when the text already looks like renderer-native deck Markdown.
///
/// Plain substring checks: a separator anywhere plus a `theme:` or
/// `paginate:` directive anywhere.
pub fn is_native_deck(content: &str) -> bool {
    content.contains("---") && (content.contains("theme:") || content.contains("paginate:"))
}

/// How a single trimmed, non-blank line affects the parse.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind {
    /// Front matter, separators, comments and formatting-only lines.
    Ignorable,
    /// Sets the deck title; `None` keeps the current one.
    Title(Option<String>),
    /// Starts a new slide with this title.
    Heading(String),
    /// A bullet item; empty items are dropped.
    Bullet(String),
    /// A paragraph line kept verbatim.
    Plain(String),
}

enum ParserState {
    NoSlide,
    InSlide(PresentationSlide),
}

impl ParserState {
    /// Applies one line. Finished slides are pushed onto `slides`.
    fn step(self, kind: LineKind, slides: &mut Vec<PresentationSlide>, title: &mut String) -> Self {
        match (self, kind) {
            (state, LineKind::Ignorable) => state,
            (state, LineKind::Title(value)) => {
                if let Some(value) = value {
                    *title = value;
                }
                state
            }
            (ParserState::NoSlide, LineKind::Heading(heading)) =>
                ParserState::InSlide(PresentationSlide::new(heading)),
            (ParserState::InSlide(current), LineKind::Heading(heading)) => {
                slides.push(current);
                ParserState::InSlide(PresentationSlide::new(heading))
            }
            (ParserState::InSlide(mut current), LineKind::Bullet(text)) => {
                if !text.is_empty() {
                    current.content.push(text);
                }
                ParserState::InSlide(current)
            }
            (ParserState::InSlide(mut current), LineKind::Plain(text)) => {
                current.content.push(text);
                ParserState::InSlide(current)
            }
            (ParserState::NoSlide, LineKind::Bullet(_) | LineKind::Plain(_)) => ParserState::NoSlide,
        }
    }

    fn finish(self, slides: &mut Vec<PresentationSlide>) {
        if let ParserState::InSlide(current) = self {
            slides.push(current);
        }
    }
}

/// Parses free-form model output into a deck.
///
/// Returns `None` when no slide heading (`##...` or `N.`) was found.
pub fn parse_presentation(text: &str, default_author: &str) -> Option<PresentationData> {
    let cleaned = strip_leading_dashes(&strip_code_fences(text));

    let mut slides = Vec::new();
    let mut title = DEFAULT_TITLE.to_string();
    let mut state = ParserState::NoSlide;

    for line in cleaned.trim().split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        state = state.step(classify(trimmed), &mut slides, &mut title);
    }
    state.finish(&mut slides);

    if slides.is_empty() {
        return None;
    }

    Some(PresentationData {
        title,
        author: Some(default_author.to_string()),
        theme: None,
        slides,
    })
}

fn classify(trimmed: &str) -> LineKind {
    if
        trimmed == "---" ||
        trimmed.starts_with("paginate:") ||
        trimmed.starts_with("theme:") ||
        trimmed.starts_with("<!--")
    {
        return LineKind::Ignorable;
    }

    if let Some(rest) = trimmed.strip_prefix("title:") {
        let value = rest.trim();
        return LineKind::Title(Some(value.to_string()).filter(|v| !v.is_empty()));
    }

    let lower = trimmed.to_lowercase();
    if lower.contains("presentation:") || lower.contains("title:") {
        let value = trimmed.split(':').nth(1).map(str::trim).unwrap_or("");
        return LineKind::Title(Some(value.to_string()).filter(|v| !v.is_empty()));
    }

    if let Some(heading) = strip_heading_marker(trimmed) {
        return LineKind::Heading(heading.trim().to_string());
    }

    if let Some(rest) = trimmed.strip_prefix(['-', '•', '*']) {
        return LineKind::Bullet(rest.trim().to_string());
    }

    if !trimmed.contains("**") && !trimmed.starts_with('#') && !trimmed.contains("```") {
        return LineKind::Plain(trimmed.to_string());
    }

    LineKind::Ignorable
}

/// Strips a leading `##` or `<digits>.` marker.
fn strip_heading_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("##") {
        return Some(rest);
    }
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 {
        return line[digits..].strip_prefix('.');
    }
    None
}

/// Removes every "```markdown" and then every "```", each with the
/// whitespace that follows it.
fn strip_code_fences(text: &str) -> String {
    remove_with_trailing_whitespace(&remove_with_trailing_whitespace(text, "```markdown"), "```")
}

fn remove_with_trailing_whitespace(text: &str, token: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(token) {
        out.push_str(&rest[..pos]);
        rest = rest[pos + token.len()..].trim_start();
    }
    out.push_str(rest);
    out
}

/// Removes a run of `-` plus the whitespace after it at every line start.
///
/// The whitespace may include newlines, so a dash-only line merges into the
/// next one, and a line start reached that way is stripped again.
fn strip_leading_dashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut at_line_start = true;

    while let Some(c) = chars.next() {
        if at_line_start && c == '-' {
            let mut last = c;
            while chars.next_if_eq(&'-').is_some() {}
            while let Some(ws) = chars.next_if(|w| w.is_whitespace()) {
                last = ws;
            }
            at_line_start = last == '\n';
            continue;
        }
        out.push(c);
        at_line_start = c == '\n';
    }

    out
}

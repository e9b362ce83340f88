use log::{ debug, warn };
use pulldown_cmark::{ html, Options, Parser };
use thiserror::Error;

use crate::models::presentation::RenderedPresentation;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Deck contains no slides")]
    EmptyDeck,
    #[error("Invalid value '{value}' for directive '{key}'")]
    InvalidDirective {
        key: String,
        value: String,
    },
}

/// Turns deck Markdown into `{markdown, html, css}`.
pub trait SlideRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> Result<RenderedPresentation, RenderError>;
}

const BASE_CSS: &str =
    "div.marpit > section { width: 1280px; height: 720px; box-sizing: border-box; overflow: hidden; position: relative; padding: 70px; display: flex; flex-direction: column; justify-content: center; }\n\
div.marpit > section > header, div.marpit > section > footer { position: absolute; left: 30px; right: 30px; font-size: 18px; color: #777; }\n\
div.marpit > section > header { top: 21px; }\n\
div.marpit > section > footer { bottom: 21px; }\n\
div.marpit > section table { border-collapse: collapse; }\n\
div.marpit > section th, div.marpit > section td { border: 1px solid #ccc; padding: 6px 12px; }\n";

const PAGINATION_CSS: &str =
    "div.marpit > section[data-paginate]::after { content: attr(data-marpit-pagination); position: absolute; right: 30px; bottom: 21px; font-size: 18px; color: #777; }\n";

const THEME_DEFAULT: &str =
    "div.marpit > section { background: #fff; color: #24292e; font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif; font-size: 29px; }\n\
div.marpit > section h1 { font-size: 1.8em; color: #246; }\n\
div.marpit > section h2 { font-size: 1.5em; color: #246; }\n";

const THEME_GAIA: &str =
    "div.marpit > section { background: #fff8e1; color: #455a64; font-family: Lato, 'Avenir Next', Avenir, sans-serif; font-size: 35px; }\n\
div.marpit > section h1, div.marpit > section h2 { color: #0288d1; }\n";

const THEME_UNCOVER: &str =
    "div.marpit > section { background: #fdfcff; color: #202228; font-family: 'Helvetica Neue', Helvetica, Arial, sans-serif; font-size: 40px; text-align: center; }\n\
div.marpit > section h1, div.marpit > section h2 { letter-spacing: -0.02em; }\n";

fn theme_css(theme: &str) -> Option<&'static str> {
    match theme {
        "default" => Some(THEME_DEFAULT),
        "gaia" => Some(THEME_GAIA),
        "uncover" => Some(THEME_UNCOVER),
        _ => None,
    }
}

/// Global directives read from the deck's front matter.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Directives {
    theme: String,
    paginate: bool,
    class: Option<String>,
    style: Option<String>,
    header: Option<String>,
    footer: Option<String>,
}

impl Default for Directives {
    fn default() -> Self {
        Self {
            theme: "default".to_string(),
            paginate: false,
            class: None,
            style: None,
            header: None,
            footer: None,
        }
    }
}

/// Marpit-flavoured renderer: front matter directives, `---` slide
/// separators, CommonMark bodies with tables and raw HTML enabled.
#[derive(Debug, Clone, Default)]
pub struct MarpitRenderer;

impl MarpitRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl SlideRenderer for MarpitRenderer {
    fn render(&self, markdown: &str) -> Result<RenderedPresentation, RenderError> {
        let (front_matter, body) = split_front_matter(markdown);
        let directives = match front_matter {
            Some(block) => parse_directives(&block)?,
            None => Directives::default(),
        };

        let slides = split_slides(&body);
        if slides.is_empty() {
            return Err(RenderError::EmptyDeck);
        }
        debug!("Rendering {} slide(s) with theme '{}'", slides.len(), directives.theme);

        let total = slides.len();
        let mut out = String::from("<div class=\"marpit\">\n");
        for (index, slide) in slides.iter().enumerate() {
            render_section(&mut out, slide, index + 1, total, &directives);
        }
        out.push_str("</div>\n");

        Ok(RenderedPresentation {
            markdown: markdown.to_string(),
            html: out,
            css: build_css(&directives),
        })
    }
}

fn render_section(out: &mut String, slide: &str, number: usize, total: usize, directives: &Directives) {
    out.push_str(&format!("<section id=\"{}\" data-theme=\"{}\"", number, attr_safe(&directives.theme)));
    if let Some(class) = &directives.class {
        out.push_str(&format!(" class=\"{}\"", attr_safe(class)));
    }
    if directives.paginate {
        out.push_str(
            &format!(
                " data-paginate=\"true\" data-marpit-pagination=\"{}\" data-marpit-pagination-total=\"{}\"",
                number,
                total
            )
        );
    }
    out.push_str(">\n");

    if let Some(header) = &directives.header {
        out.push_str(&format!("<header>{}</header>\n", render_inline(header)));
    }
    html::push_html(out, Parser::new_ext(slide, markdown_options()));
    if let Some(footer) = &directives.footer {
        out.push_str(&format!("<footer>{}</footer>\n", render_inline(footer)));
    }
    out.push_str("</section>\n");
}

fn build_css(directives: &Directives) -> String {
    let theme = match theme_css(&directives.theme) {
        Some(css) => css,
        None => {
            warn!("Unknown theme '{}', falling back to default", directives.theme);
            THEME_DEFAULT
        }
    };

    let mut css = String::with_capacity(BASE_CSS.len() + theme.len() + PAGINATION_CSS.len());
    css.push_str(BASE_CSS);
    css.push_str(theme);
    if directives.paginate {
        css.push_str(PAGINATION_CSS);
    }
    if let Some(style) = &directives.style {
        css.push_str(style);
        if !style.ends_with('\n') {
            css.push('\n');
        }
    }
    css
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

fn render_inline(text: &str) -> String {
    let mut rendered = String::new();
    html::push_html(&mut rendered, Parser::new_ext(text, markdown_options()));
    let trimmed = rendered.trim();
    trimmed
        .strip_prefix("<p>")
        .and_then(|s| s.strip_suffix("</p>"))
        .unwrap_or(trimmed)
        .to_string()
}

fn attr_safe(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect()
}

/// Splits off a leading `---` ... `---` block. An unterminated block is
/// treated as ordinary content.
fn split_front_matter(markdown: &str) -> (Option<String>, String) {
    let mut lines = markdown.lines();
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return (None, markdown.to_string()),
    }

    let mut block = Vec::new();
    for line in lines.by_ref() {
        if line.trim_end() == "---" {
            let body = lines.collect::<Vec<_>>().join("\n");
            return (Some(block.join("\n")), body);
        }
        block.push(line);
    }
    (None, markdown.to_string())
}

fn parse_directives(block: &str) -> Result<Directives, RenderError> {
    let mut directives = Directives::default();
    let lines: Vec<&str> = block.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        i += 1;
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let key = key.trim().to_lowercase();
        let mut value = unquote(value.trim()).to_string();

        if value == "|" || value == ">" {
            let mut scalar = Vec::new();
            while i < lines.len() && (lines[i].starts_with(char::is_whitespace) || lines[i].trim().is_empty()) {
                scalar.push(lines[i]);
                i += 1;
            }
            value = dedent(&scalar);
        }

        match key.as_str() {
            "theme" => {
                directives.theme = value;
            }
            "paginate" =>
                match value.to_lowercase().as_str() {
                    "true" => {
                        directives.paginate = true;
                    }
                    "false" => {
                        directives.paginate = false;
                    }
                    _ => {
                        return Err(RenderError::InvalidDirective { key, value });
                    }
                }
            "class" => {
                directives.class = Some(value);
            }
            "style" => {
                directives.style = Some(value);
            }
            "header" => {
                directives.header = Some(value);
            }
            "footer" => {
                directives.footer = Some(value);
            }
            other => debug!("Ignoring unsupported directive '{}'", other),
        }
    }

    Ok(directives)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

/// Leading ASCII spaces and tabs; other whitespace counts as content.
fn indent_width(line: &str) -> usize {
    line.bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count()
}

fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_width(l))
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| &l[indent_width(l).min(indent)..])
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits at `---` lines outside fenced code; blank slides are dropped.
fn split_slides(body: &str) -> Vec<String> {
    let mut slides = Vec::new();
    let mut current = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence && line.trim() == "---" {
            slides.push(current.join("\n"));
            current.clear();
            continue;
        }
        current.push(line);
    }
    slides.push(current.join("\n"));

    slides
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK: &str =
        "---\ntheme: gaia\npaginate: true\nfooter: \"Q3 review\"\nstyle: |\n  section {\n    border: 2px solid #e2e8f0;\n  }\n---\n\n# Title\n\n---\n\n## Second\n\n- a\n- b\n\n| x | y |\n|---|---|\n| 1 | 2 |\n";

    #[test]
    fn renders_one_section_per_slide() {
        let rendered = MarpitRenderer::new().render(DECK).unwrap();
        assert_eq!(rendered.markdown, DECK);
        assert_eq!(rendered.html.matches("<section").count(), 2);
        assert!(rendered.html.contains("<h1>Title</h1>"));
        assert!(rendered.html.contains("<li>a</li>"));
        assert!(rendered.html.contains("<table>"));
        assert!(rendered.html.contains("data-marpit-pagination=\"2\""));
        assert!(rendered.html.contains("<footer>Q3 review</footer>"));
    }

    #[test]
    fn css_carries_theme_pagination_and_custom_style() {
        let rendered = MarpitRenderer::new().render(DECK).unwrap();
        assert!(rendered.css.contains("#fff8e1"));
        assert!(rendered.css.contains("data-paginate"));
        assert!(rendered.css.contains("border: 2px solid #e2e8f0;"));
    }

    #[test]
    fn plain_markdown_without_front_matter_is_one_slide() {
        let rendered = MarpitRenderer::new().render("# Just one\n\nhello").unwrap();
        assert_eq!(rendered.html.matches("<section").count(), 1);
        assert!(!rendered.html.contains("data-paginate"));
        assert!(rendered.css.contains("#24292e"));
    }

    #[test]
    fn separators_inside_code_fences_do_not_split() {
        let rendered = MarpitRenderer::new().render("# A\n```\n---\n```\n").unwrap();
        assert_eq!(rendered.html.matches("<section").count(), 1);
    }

    #[test]
    fn empty_deck_is_an_error() {
        let err = MarpitRenderer::new().render("---\ntheme: default\n---\n\n---\n").unwrap_err();
        assert_eq!(err, RenderError::EmptyDeck);
    }

    #[test]
    fn bad_paginate_value_is_an_error() {
        let err = MarpitRenderer::new().render("---\npaginate: sometimes\n---\n# A").unwrap_err();
        assert!(matches!(err, RenderError::InvalidDirective { ref key, .. } if key == "paginate"));
    }

    #[test]
    fn unknown_theme_falls_back_to_default_css() {
        let rendered = MarpitRenderer::new().render("---\ntheme: neon\n---\n# A").unwrap();
        assert!(rendered.css.contains("#24292e"));
        assert!(rendered.html.contains("data-theme=\"neon\""));
    }

    #[test]
    fn style_block_with_non_breaking_space_indent_renders() {
        let deck = "---\ntheme: default\nstyle: |\n \u{a0}section { color: red; }\n  h1 { color: blue; }\n---\n# A\n";
        let rendered = MarpitRenderer::new().render(deck).unwrap();
        assert!(rendered.css.contains("\u{a0}section { color: red; }\n h1 { color: blue; }"));
    }

    #[test]
    fn dedent_strips_only_the_common_ascii_indent() {
        assert_eq!(dedent(&["    a {", "      b;", "    }"]), "a {\n  b;\n}");
        assert_eq!(dedent(&["\t\u{a0}x", "\t\ty"]), "\u{a0}x\n\ty");
    }

    #[test]
    fn unterminated_front_matter_is_content() {
        let (front, body) = split_front_matter("---\ntheme: x\n# A");
        assert!(front.is_none());
        assert_eq!(body, "---\ntheme: x\n# A");
    }
}

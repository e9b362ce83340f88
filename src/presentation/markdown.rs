use crate::models::presentation::PresentationData;

const CREDIT_LINE: &str = "*Created with Deck Agent*";

/// Serializes a parsed deck into renderer-native Markdown: front matter, a
/// title slide, then one `---`-separated slide per entry.
pub fn generate_markdown(data: &PresentationData) -> String {
    let mut markdown = String::new();

    markdown.push_str("---\n");
    markdown.push_str(&format!("theme: {}\n", data.theme.as_deref().unwrap_or("default")));
    markdown.push_str("paginate: true\n");
    markdown.push_str("---\n\n");

    markdown.push_str(&format!("# {}\n\n", data.title));
    if let Some(author) = &data.author {
        markdown.push_str(&format!("**Author:** {}\n\n", author));
    }
    markdown.push_str(CREDIT_LINE);
    markdown.push_str("\n\n");

    for slide in &data.slides {
        markdown.push_str("---\n\n");
        markdown.push_str(&format!("# {}\n\n", slide.title));
        for item in &slide.content {
            markdown.push_str(&format!("- {}\n", item));
        }
        markdown.push('\n');
        if let Some(notes) = &slide.notes {
            markdown.push_str(&format!("<!-- {} -->\n\n", notes));
        }
    }

    markdown
}

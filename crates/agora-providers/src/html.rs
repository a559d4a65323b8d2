//! HTML description to plain text.
//!
//! The ticketing platform only serves full event descriptions as HTML; the
//! canonical model carries plain text, so we flatten the markup here.

use scraper::{Html, Node};

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "br", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "blockquote",
];

/// Flatten an HTML fragment into readable plain text: text nodes joined with
/// newlines at block boundaries, everything else dropped.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();

    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    if !out.is_empty() && !out.ends_with('\n') && !out.ends_with(' ') {
                        out.push(' ');
                    }
                    out.push_str(text);
                }
            }
            Node::Element(element) => {
                if BLOCK_TAGS.contains(&element.name()) && !out.is_empty() && !out.ends_with('\n')
                {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }

    // Collapse runs of blank lines left by nested blocks.
    let mut collapsed = String::with_capacity(out.len());
    let mut blank_run = 0usize;
    for line in out.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !collapsed.is_empty() {
            collapsed.push('\n');
        }
        collapsed.push_str(line.trim_end());
    }
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::html_to_text;

    #[test]
    fn strips_tags_and_keeps_block_breaks() {
        let html = "<p>First paragraph.</p><p>Second <strong>bold</strong> bit.</p>";
        assert_eq!(
            html_to_text(html),
            "First paragraph.\nSecond bold bit."
        );
    }

    #[test]
    fn flattens_lists() {
        let html = "<ul><li>Alpha</li><li>Beta</li></ul>";
        assert_eq!(html_to_text(html), "Alpha\nBeta");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(html_to_text("Doors at 6pm"), "Doors at 6pm");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(html_to_text(""), "");
        assert_eq!(html_to_text("<div>  </div>"), "");
    }
}

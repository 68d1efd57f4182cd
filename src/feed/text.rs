use regex::Regex;

use crate::error::{Error, Result};

/// Wide enough that html2text never wraps a paragraph
const RENDER_WIDTH: usize = 10_000;

/// Turns feed HTML into plain prose fit for a language model prompt.
#[derive(Debug)]
pub struct TextCleaner {
    link: Regex,
    footnote: Regex,
    emphasis: Regex,
    whitespace: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            link: Regex::new(r"\[([^\]]*)\]\[\d+\]").map_err(|e| Error::Invalid(e.to_string()))?,
            footnote: Regex::new(r"(?m)^\[\d+\]:.*$").map_err(|e| Error::Invalid(e.to_string()))?,
            emphasis: Regex::new(r"\*{1,2}|`").map_err(|e| Error::Invalid(e.to_string()))?,
            whitespace: Regex::new(r"\s+").map_err(|e| Error::Invalid(e.to_string()))?,
        })
    }

    pub fn to_plain_text(&self, html: &str) -> String {
        let rendered = html2text::from_read(html.as_bytes(), RENDER_WIDTH);
        let text = self.footnote.replace_all(&rendered, "");
        let text = self.link.replace_all(&text, "$1");
        let text = self.emphasis.replace_all(&text, "");
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }
}

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Content;

// an image extension at the very end, or right before a query string / fragment
static IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(jpg|jpeg|png|webp|avif|gif)(?:[?#].*)?$").expect("Invalid image url pattern")
});

/// Turns raw user input into the content to send, `None` when there is nothing to send.
///
/// Input ending in an image extension is sent as an image link, cut right after
/// the extension (which is lower-cased). Anything else is sent as trimmed text.
pub fn classify(input: &str) -> Option<Content> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(extension) = IMAGE_URL.captures(text).and_then(|caps| caps.get(1)) {
        let url = format!(
            "{}{}",
            &text[..extension.start()],
            extension.as_str().to_ascii_lowercase()
        );
        return Some(Content::Image(url));
    }

    Some(Content::Text(text.to_string()))
}

/// Text typed in the message box. It is cleared only once a send succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    text: String,
}

impl Draft {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn outgoing(&self) -> Option<Content> {
        classify(&self.text)
    }
}

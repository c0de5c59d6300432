//! Mute-word filtering for user-generated content.

use crate::models::FezPost;

/// Content that can be hidden from a viewer by their mutewords.
pub trait ContentFilterable: Sized {
    /// The text matched against mutewords.
    fn filterable_text(&self) -> &str;

    /// True if the content contains any muteword, case-insensitively.
    fn contains_mutewords(&self, mutewords: &[String]) -> bool {
        let text = self.filterable_text().to_lowercase();
        mutewords
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .any(|w| text.contains(&w.to_lowercase()))
    }

    /// The content itself, or `None` if it is muted.
    fn filter_mutewords(self, mutewords: Option<&[String]>) -> Option<Self> {
        match mutewords {
            Some(words) if self.contains_mutewords(words) => None,
            _ => Some(self),
        }
    }
}

impl ContentFilterable for FezPost {
    fn filterable_text(&self) -> &str {
        &self.text
    }
}

//! Word-overlap similarity used as the last-resort ranking signal.

use std::collections::HashSet;

/// Share of `title`'s distinct whitespace-separated words that also occur in `text`.
///
/// An empty title scores 0.
#[must_use]
pub fn word_overlap_score(title: &str, text: &str) -> f64 {
    let title_words: HashSet<&str> = title.split_whitespace().collect();
    if title_words.is_empty() {
        return 0.0;
    }
    let text_words: HashSet<&str> = text.split_whitespace().collect();
    let shared = title_words.intersection(&text_words).count();

    #[allow(clippy::cast_precision_loss)]
    let score = shared as f64 / title_words.len() as f64;
    score
}

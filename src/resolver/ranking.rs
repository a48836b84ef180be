//! Temporal ranking of candidates against the dataset release date.

use chrono::NaiveDate;

use super::Candidate;

/// Days between a publication month and the dataset release, when both are known.
#[must_use]
pub fn days_between(published: Option<NaiveDate>, released: Option<NaiveDate>) -> Option<i64> {
    Some((published? - released?).num_days().abs())
}

/// Orders candidates by distance from `released`, closest first.
///
/// The sort is stable, so equidistant candidates keep listing order.
/// Candidates without a usable date go after every dated one.
#[must_use]
pub fn rank_by_release(mut candidates: Vec<Candidate>, released: Option<NaiveDate>) -> Vec<Candidate> {
    for candidate in &mut candidates {
        candidate.days_from_release = days_between(candidate.published, released);
    }
    candidates.sort_by_key(|candidate| match candidate.days_from_release {
        Some(days) => (false, days),
        None => (true, 0),
    });
    candidates
}

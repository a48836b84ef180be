//! Author-set comparison between dataset contributors and publication authors.

/// An all-caps token of up to three letters stands for the given name(s)
/// starting with its first letter (`J` for `John`, `JA` for `James`).
fn is_initials_of(short: &str, long: &str) -> bool {
    short.len() < long.len()
        && short.len() <= 3
        && short.chars().all(|c| c.is_ascii_uppercase())
        && short.chars().next() == long.chars().next()
}

fn abbreviation_compatible(lhs: &str, rhs: &str) -> bool {
    let lhs: Vec<&str> = lhs.split_whitespace().collect();
    let rhs: Vec<&str> = rhs.split_whitespace().collect();
    !lhs.is_empty()
        && lhs.len() == rhs.len()
        && lhs.iter().zip(&rhs).all(|(a, b)| {
            a.eq_ignore_ascii_case(b) || is_initials_of(a, b) || is_initials_of(b, a)
        })
}

fn names_overlap(lhs: &str, rhs: &str) -> bool {
    lhs.contains(rhs) || rhs.contains(lhs) || abbreviation_compatible(lhs, rhs)
}

/// Returns true when every contributor can be paired with a distinct author.
///
/// Names pair when either is a substring of the other, or when they differ
/// only by given names written as initials. Both lists are tried longest
/// name first; an author used by one contributor is unavailable to the rest.
#[must_use]
pub fn is_their_publication(contributors: &[String], authors: &[String]) -> bool {
    let mut contributors: Vec<&str> = contributors.iter().map(String::as_str).collect();
    let mut remaining: Vec<&str> = authors.iter().map(String::as_str).collect();
    contributors.sort_by_key(|name| std::cmp::Reverse(name.len()));
    remaining.sort_by_key(|name| std::cmp::Reverse(name.len()));

    contributors.into_iter().all(|contributor| {
        match remaining
            .iter()
            .position(|author| names_overlap(contributor, author))
        {
            Some(index) => {
                remaining.remove(index);
                true
            }
            None => false,
        }
    })
}

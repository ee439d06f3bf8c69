// src/services/ranking.rs

//! Text normalization and fuzzy relevance scoring for extracted titles.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;
use url::Url;

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid year pattern"));

/// Lowercase, strip punctuation and collapse whitespace.
///
/// Used on both the query and candidate titles so they compare on words only.
pub fn normalize(input: &str) -> String {
    let stripped: String = input
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace and title-case every word.
pub fn clean_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Capitalize a word. Words that already contain an uppercase letter
/// (acronyms, `McLovin`) are kept as they are.
pub fn title_case(word: &str) -> String {
    if word.chars().any(char::is_uppercase) {
        return word.to_string();
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Human-readable form of the last path segment of a URL:
/// `https://x.test/games/batman-arkham_knight/` becomes `Batman Arkham Knight`.
pub fn url_slug(result_url: &str) -> String {
    let Ok(url) = Url::parse(result_url) else {
        return String::new();
    };
    let Some(segment) = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
    else {
        return String::new();
    };
    let decoded = percent_decode(segment);
    clean_title(&decoded.replace(['-', '_'], " "))
}

fn percent_decode(segment: &str) -> String {
    url::form_urlencoded::parse(format!("s={segment}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

/// Token-set similarity in `0..=100`.
///
/// Both strings are split into word sets; the shared words (sorted) are
/// compared against each side's shared-plus-remaining words, and the best of
/// the three pairwise indel ratios wins. Word order and repeated words do
/// not matter, and a title that contains every query word scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> i32 {
    let left: BTreeSet<&str> = a.unicode_words().collect();
    let right: BTreeSet<&str> = b.unicode_words().collect();
    if left.is_empty() || right.is_empty() {
        return 0;
    }

    let shared = join_words(left.intersection(&right).copied());
    let left_only = join_words(left.difference(&right).copied());
    let right_only = join_words(right.difference(&left).copied());

    let combined_left = join_nonempty(&shared, &left_only);
    let combined_right = join_nonempty(&shared, &right_only);

    [
        indel_ratio(&shared, &combined_left),
        indel_ratio(&shared, &combined_right),
        indel_ratio(&combined_left, &combined_right),
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
}

fn join_words<'a>(words: impl Iterator<Item = &'a str>) -> String {
    words.collect::<Vec<_>>().join(" ")
}

fn join_nonempty(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_string(),
        (_, true) => first.to_string(),
        _ => format!("{first} {second}"),
    }
}

/// `2 × LCS / (len(a) + len(b))` as a rounded percentage; empty input scores 0.
fn indel_ratio(a: &str, b: &str) -> i32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let total = a.len() + b.len();
    let common = longest_common_subsequence(&a, &b);
    (200.0 * common as f64 / total as f64).round() as i32
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Relevance of a normalized title to a normalized query.
///
/// Token-set ratio, nudged up by one for a near-exact match with the same
/// word count and down by one when any query word is missing, so exact
/// titles outrank supersets and subsets.
pub fn ranking_score(normalized_query: &str, normalized_title: &str) -> i32 {
    let mut score = token_set_ratio(normalized_query, normalized_title);

    let query_words: Vec<&str> = normalized_query.unicode_words().collect();
    let title_words: BTreeSet<&str> = normalized_title.unicode_words().collect();

    if score > 95 && query_words.len() == title_words.len() {
        score += 1;
    }
    if query_words.iter().any(|word| !title_words.contains(word)) {
        score -= 1;
    }
    score
}

/// First `19xx` or `20xx` year in the text.
pub fn extract_year(text: &str) -> Option<i32> {
    YEAR.find(text).and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  The  Lord of the Rings: Return! "), "the lord of the rings return");
        assert_eq!(normalize("Spider-Man"), "spiderman");
        assert_eq!(normalize("Amélie"), "amélie");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn test_clean_title_keeps_uppercase_words() {
        assert_eq!(clean_title("the  GTA   collection\n"), "The GTA Collection");
        assert_eq!(clean_title("mcLovin a"), "mcLovin A");
        assert_eq!(clean_title(""), "");
    }

    #[test]
    fn test_url_slug() {
        assert_eq!(
            url_slug("https://x.test/games/batman-arkham_knight/"),
            "Batman Arkham Knight"
        );
        assert_eq!(url_slug("https://x.test/b/the%20hobbit"), "The Hobbit");
        assert_eq!(url_slug("https://x.test/"), "");
        assert_eq!(url_slug("not a url"), "");
    }

    #[test]
    fn test_token_set_ratio() {
        assert_eq!(token_set_ratio("foo bar", "bar foo"), 100);
        assert_eq!(token_set_ratio("foo bar", "foo bar baz"), 100);
        assert_eq!(token_set_ratio("foo", "qux"), 0);
        assert_eq!(token_set_ratio("", "foo"), 0);
        let partial = token_set_ratio("foo bar", "foo qux");
        assert!(partial > 0 && partial < 100);
    }

    #[test]
    fn test_ranking_prefers_exact_title() {
        let exact = ranking_score("foo bar", "foo bar");
        let subset = ranking_score("foo bar", "foo");
        let superset = ranking_score("foo bar", "foo bar baz");
        assert_eq!(exact, 101);
        assert_eq!(subset, 99);
        assert_eq!(superset, 100);
        assert!(exact > superset && superset > subset);
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("Dune (2021) - 155 min"), Some(2021));
        assert_eq!(extract_year("Published 1984, reprinted 2003"), Some(1984));
        assert_eq!(extract_year("Room 2100 and 18999"), None);
    }
}

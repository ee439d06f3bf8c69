// src/services/extractor.rs

//! Turns a site's results page into ranked `SearchResult`s using its card selector.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ExtractionConfig, Link, SearchResult};
use crate::services::ranking::{clean_title, extract_year, normalize, ranking_score, url_slug};
use crate::utils::{parent_path_segment, resolve_url};

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));
static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3").expect("valid heading selector"));
static IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("valid image selector"));

/// Parse a stored card selector.
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::selector(selector, e))
}

/// Extracts results from result cards.
#[derive(Debug, Clone)]
pub struct ResultExtractor {
    /// Lowercased path keywords marking taxonomy links
    skip_keywords: Vec<String>,
    min_score: i32,
}

impl Default for ResultExtractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

impl ResultExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            skip_keywords: config
                .skip_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            min_score: config.min_score,
        }
    }

    /// Lazily extract one result per qualifying card.
    ///
    /// Hrefs that appear in more than one card (shared category or "more"
    /// links) are never used as a result URL. Cards without a usable link or
    /// title are skipped; an unresolvable image only loses the image.
    pub fn extract<'a>(
        &'a self,
        page: &'a Html,
        card_selector: &Selector,
        normalized_query: &'a str,
        link: &'a Link,
    ) -> Result<impl Iterator<Item = SearchResult> + 'a> {
        let base = Url::parse(&link.url)?;
        let cards: Vec<ElementRef<'a>> = page.select(card_selector).collect();

        let mut occurrences: HashMap<Url, usize> = HashMap::new();
        for card in &cards {
            for href in card_hrefs(*card, &base) {
                *occurrences.entry(href).or_default() += 1;
            }
        }
        let unique: HashSet<Url> = occurrences
            .into_iter()
            .filter_map(|(href, count)| (count == 1).then_some(href))
            .collect();

        Ok(cards.into_iter().filter_map(move |card| {
            self.extract_card(card, &unique, &base, normalized_query, link)
        }))
    }

    fn extract_card(
        &self,
        card: ElementRef<'_>,
        unique: &HashSet<Url>,
        base: &Url,
        normalized_query: &str,
        link: &Link,
    ) -> Option<SearchResult> {
        let Some(result_url) = self.choose_href(card, unique, base) else {
            log::debug!("{}: card without a unique result link skipped", link.title);
            return None;
        };

        let Some(title) = card_title(card, &result_url, base) else {
            log::debug!("{}: card without a title skipped ({result_url})", link.title);
            return None;
        };
        let mut title = clean_title(&title);
        let mut score = ranking_score(normalized_query, &normalize(&title));

        let slug = url_slug(result_url.as_str());
        if !slug.is_empty() {
            let slug_score = ranking_score(normalized_query, &normalize(&slug));
            if slug_score > score {
                title = slug;
                score = slug_score;
            }
        }

        if self.min_score > 0 && score < self.min_score {
            return None;
        }

        let (image_url, alt_text) = match card.select(&IMAGE).next() {
            Some(img) => {
                let alt = img
                    .value()
                    .attr("alt")
                    .map(str::trim)
                    .filter(|alt| !alt.is_empty())
                    .map(String::from);
                (image_source(img, base, link).map(|url| url.to_string()), alt)
            }
            None => (None, None),
        };

        Some(SearchResult {
            title,
            result_url: result_url.to_string(),
            category: link.category.clone(),
            website_title: link.title.clone(),
            website_url: link.url.clone(),
            website_starred: link.starred,
            score,
            year: extract_year(&card.text().collect::<String>()),
            image_url,
            alt_text,
        })
    }

    /// The card's own href when it is an anchor, otherwise the first unique
    /// descendant href that does not point into a taxonomy path.
    fn choose_href(&self, card: ElementRef<'_>, unique: &HashSet<Url>, base: &Url) -> Option<Url> {
        if card.value().name() == "a" {
            return card
                .value()
                .attr("href")
                .and_then(|href| resolve_url(base, href))
                .filter(|href| unique.contains(href));
        }

        card.select(&ANCHOR)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| resolve_url(base, href))
            .find(|href| unique.contains(href) && !self.is_taxonomy_link(href))
    }

    fn is_taxonomy_link(&self, href: &Url) -> bool {
        let Some(segment) = parent_path_segment(href) else {
            return false;
        };
        self.skip_keywords
            .iter()
            .any(|keyword| segment.eq_ignore_ascii_case(keyword))
    }
}

/// Resolved image URL. Inline `data:` placeholders defer to `data-src`; an
/// image that cannot be resolved is dropped without losing the card.
fn image_source(img: ElementRef<'_>, base: &Url, link: &Link) -> Option<Url> {
    let src = img
        .value()
        .attr("src")
        .map(str::trim)
        .filter(|src| !src.is_empty() && !src.starts_with("data:"));
    let src = src.or_else(|| img.value().attr("data-src"))?;

    let resolved = resolve_url(base, src);
    if resolved.is_none() {
        log::debug!("{}: unresolvable image '{src}' ignored", link.title);
    }
    resolved
}

/// Distinct resolved hrefs of the card and its descendant anchors.
fn card_hrefs(card: ElementRef<'_>, base: &Url) -> HashSet<Url> {
    let own = (card.value().name() == "a")
        .then(|| card.value().attr("href"))
        .flatten();
    own.into_iter()
        .chain(card.select(&ANCHOR).filter_map(|a| a.value().attr("href")))
        .filter_map(|href| resolve_url(base, href))
        .collect()
}

/// Anchor text for the chosen href, then the first heading, then the card text.
fn card_title(card: ElementRef<'_>, result_url: &Url, base: &Url) -> Option<String> {
    let own = (card.value().name() == "a").then_some(card);
    let anchor_text = own
        .into_iter()
        .chain(card.select(&ANCHOR))
        .filter(|a| {
            a.value()
                .attr("href")
                .and_then(|href| resolve_url(base, href))
                .is_some_and(|href| &href == result_url)
        })
        .map(element_text)
        .find(|text| !text.is_empty());

    anchor_text
        .or_else(|| {
            card.select(&HEADING)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
        .or_else(|| Some(element_text(card)).filter(|text| !text.is_empty()))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

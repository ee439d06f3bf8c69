// src/services/discovery.rs

//! Result-card selector discovery.
//!
//! Learns the CSS selector of the repeating "result card" on a search results
//! page without any per-site configuration. Two tiers are tried in order:
//!
//! - **Differential**: elements that also exist on a guaranteed-empty results
//!   page are page chrome and get blacklisted; the best repeating sibling group
//!   that remains is the card. Two differently-queried result pages must agree
//!   on the card container.
//! - **Frequency**: no baseline; repeating groups are scored on repetition,
//!   content, links, images and shallowness.

use std::collections::{HashMap, HashSet};
use std::fmt;

use scraper::{ElementRef, Html};
use thiserror::Error;

use crate::models::DiscoveryConfig;
use crate::services::signature::{
    child_shape_key, common_selector, container_selector, full_path_signature,
};

/// Pagination controls are short and numeric or one of these.
const PAGINATION_KEYWORDS: &[&str] = &[
    "next", "prev", "previous", "last", "first", "›", "‹", "»", "«", ">", "<",
];
const PAGINATION_MAX_CHARS: usize = 25;
const TEXT_SCORE_CAP: usize = 500;

/// Which analysis produced a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Differential,
    Frequency,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Differential => f.write_str("differential"),
            Tier::Frequency => f.write_str("frequency"),
        }
    }
}

/// Why no selector could be learned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryFailure {
    #[error("no result pages to analyse")]
    NoPages,

    #[error("{tier} analysis found no repeating card pattern")]
    NoCandidate { tier: Tier },

    #[error("differential analysis found inconsistent containers '{first}' and '{second}'")]
    InconsistentPattern { first: String, second: String },
}

/// A learned card selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSelector {
    /// `"<parent-selector> > <card-selector>"`
    pub selector: String,
    pub tier: Tier,
    /// Number of cards the winning pattern matched across the analysed pages
    pub card_count: usize,
}

/// A group of siblings sharing the same shape.
#[derive(Debug, Clone)]
pub struct RepeatingPattern<'a> {
    /// Selector of the common parent
    pub parent: String,
    /// Shared child-shape key
    pub shape: String,
    /// Matching siblings in document order; never fewer than two
    pub elements: Vec<ElementRef<'a>>,
    /// Number of ancestors of the parent
    pub depth: usize,
}

impl<'a> RepeatingPattern<'a> {
    pub fn count(&self) -> usize {
        self.elements.len()
    }

    pub fn representative(&self) -> ElementRef<'a> {
        self.elements[0]
    }
}

/// Heuristic card-selector discovery engine.
#[derive(Debug, Clone)]
pub struct SelectorDiscovery {
    anchor_bonus: i64,
    image_bonus: i64,
    depth_penalty: i64,
}

impl Default for SelectorDiscovery {
    fn default() -> Self {
        Self::new(&DiscoveryConfig::default())
    }
}

impl SelectorDiscovery {
    /// Create a discovery engine using the frequency-tier weights from config.
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            anchor_bonus: config.anchor_bonus,
            image_bonus: config.image_bonus,
            depth_penalty: config.depth_penalty,
        }
    }

    /// Learn the card selector, falling back from Differential to Frequency.
    ///
    /// `no_results` is a page rendered for a query that matches nothing; without
    /// it only the Frequency tier runs.
    pub fn discover(
        &self,
        no_results: Option<&Html>,
        result_pages: &[Html],
    ) -> Result<DiscoveredSelector, DiscoveryFailure> {
        if result_pages.is_empty() {
            return Err(DiscoveryFailure::NoPages);
        }

        if let Some(baseline) = no_results {
            match self.differential(baseline, result_pages) {
                Ok(found) => return Ok(found),
                Err(e) => log::debug!("Differential discovery failed ({e}), trying frequency"),
            }
        }

        self.frequency(result_pages)
    }

    /// Differential tier: subtract the empty page's structure, then require every
    /// result page to agree on the card container.
    pub fn differential(
        &self,
        no_results: &Html,
        result_pages: &[Html],
    ) -> Result<DiscoveredSelector, DiscoveryFailure> {
        if result_pages.is_empty() {
            return Err(DiscoveryFailure::NoPages);
        }
        let blacklist = build_blacklist(no_results);

        let mut winners: Vec<RepeatingPattern<'_>> = Vec::with_capacity(result_pages.len());
        for page in result_pages {
            let patterns = find_patterns(page, Some(&blacklist), true);
            let best = best_by_score(patterns, |p| Some(base_score(p))).ok_or(
                DiscoveryFailure::NoCandidate {
                    tier: Tier::Differential,
                },
            )?;
            winners.push(best);
        }

        let parent = winners[0].parent.clone();
        if let Some(other) = winners.iter().find(|p| p.parent != parent) {
            return Err(DiscoveryFailure::InconsistentPattern {
                first: parent,
                second: other.parent.clone(),
            });
        }

        let elements: Vec<ElementRef<'_>> = winners
            .iter()
            .flat_map(|p| p.elements.iter().copied())
            .collect();

        Ok(DiscoveredSelector {
            selector: common_selector(&parent, &elements),
            tier: Tier::Differential,
            card_count: elements.len(),
        })
    }

    /// Frequency tier: score every repeating group on a single page; the first
    /// page that yields a positive-scoring pattern wins.
    pub fn frequency(&self, result_pages: &[Html]) -> Result<DiscoveredSelector, DiscoveryFailure> {
        for page in result_pages {
            let patterns = find_patterns(page, None, false);
            let best = best_by_score(patterns, |p| {
                let score = self.frequency_score(p);
                (score > 0).then_some(score)
            });

            if let Some(pattern) = best {
                return Ok(DiscoveredSelector {
                    selector: common_selector(&pattern.parent, &pattern.elements),
                    tier: Tier::Frequency,
                    card_count: pattern.count(),
                });
            }
        }

        Err(DiscoveryFailure::NoCandidate {
            tier: Tier::Frequency,
        })
    }

    fn frequency_score(&self, pattern: &RepeatingPattern<'_>) -> i64 {
        let card = pattern.representative();
        let mut score = base_score(pattern);
        if has_descendant(card, |el| el.value().name() == "a" && el.value().attr("href").is_some()) {
            score += self.anchor_bonus;
        }
        if has_descendant(card, |el| el.value().name() == "img") {
            score += self.image_bonus;
        }
        score - self.depth_penalty * pattern.depth as i64
    }
}

/// Full-path signatures of every element on a page known to have no results.
pub fn build_blacklist(no_results: &Html) -> HashSet<String> {
    no_results
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .map(full_path_signature)
        .collect()
}

/// Enumerate repeating sibling groups on a page.
///
/// Children whose full path is blacklisted are ignored. With `require_link`, a
/// group must contain an anchor (or be made of anchors). Groups made mostly of
/// pagination-looking elements are always dropped.
pub fn find_patterns<'a>(
    page: &'a Html,
    blacklist: Option<&HashSet<String>>,
    require_link: bool,
) -> Vec<RepeatingPattern<'a>> {
    let mut patterns = Vec::new();

    for parent in page.root_element().descendants().filter_map(ElementRef::wrap) {
        let children: Vec<ElementRef<'a>> = parent.children().filter_map(ElementRef::wrap).collect();
        if children.len() < 2 {
            continue;
        }

        // Group by shape, keeping first-appearance order.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<ElementRef<'a>>> = HashMap::new();
        for child in children {
            if let Some(blacklist) = blacklist {
                if blacklist.contains(&full_path_signature(child)) {
                    continue;
                }
            }
            let key = child_shape_key(child);
            let group = groups.entry(key.clone()).or_default();
            if group.is_empty() {
                order.push(key);
            }
            group.push(child);
        }

        for key in order {
            let Some(elements) = groups.remove(&key) else {
                continue;
            };
            if elements.len() < 2 {
                continue;
            }
            if require_link && !has_descendant(elements[0], |el| el.value().name() == "a") {
                continue;
            }
            if looks_like_pager(&elements) {
                continue;
            }
            patterns.push(RepeatingPattern {
                parent: container_selector(parent),
                shape: key,
                elements,
                depth: parent.ancestors().filter_map(ElementRef::wrap).count(),
            });
        }
    }

    patterns
}

/// `count×10 + childCount×5 + min(textLength, 500)/5` of the representative card.
pub fn base_score(pattern: &RepeatingPattern<'_>) -> i64 {
    let card = pattern.representative();
    let child_count = card.children().filter_map(ElementRef::wrap).count();
    let text_length = trimmed_text(card).chars().count().min(TEXT_SCORE_CAP);
    (pattern.count() * 10 + child_count * 5 + text_length / 5) as i64
}

/// Whether an element looks like a pagination control (`1`, `next`, `»`).
pub fn is_pagination(element: ElementRef<'_>) -> bool {
    let text = trimmed_text(element);
    if text.is_empty() || text.chars().count() > PAGINATION_MAX_CHARS {
        return false;
    }
    if text.parse::<i64>().is_ok() {
        return true;
    }
    PAGINATION_KEYWORDS
        .iter()
        .any(|keyword| text.eq_ignore_ascii_case(keyword))
}

/// A group is a pager when most of its members look like pagination controls.
fn looks_like_pager(elements: &[ElementRef<'_>]) -> bool {
    let controls = elements.iter().filter(|el| is_pagination(**el)).count();
    controls * 2 > elements.len()
}

fn trimmed_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Self-or-descendant match.
fn has_descendant(element: ElementRef<'_>, predicate: impl Fn(ElementRef<'_>) -> bool) -> bool {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|el| predicate(el))
}

/// Highest-scoring pattern; the earliest in document order wins ties.
fn best_by_score<'a>(
    patterns: Vec<RepeatingPattern<'a>>,
    score: impl Fn(&RepeatingPattern<'a>) -> Option<i64>,
) -> Option<RepeatingPattern<'a>> {
    let mut best: Option<(i64, RepeatingPattern<'a>)> = None;
    for pattern in patterns {
        let Some(value) = score(&pattern) else {
            continue;
        };
        match &best {
            Some((top, _)) if *top >= value => {}
            _ => best = Some((value, pattern)),
        }
    }
    best.map(|(_, pattern)| pattern)
}

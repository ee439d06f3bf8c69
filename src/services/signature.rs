// src/services/signature.rs

//! Element signatures: stable string keys describing an element's structure.
//!
//! A signature is the tag name followed by the element's sorted, CSS-escaped
//! classes, or by its `#id` when it has no classes. Two elements with the same
//! signature are treated as interchangeable when looking for repeating cards.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

static INVALID_CSS_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("valid CSS escape pattern"));

/// Escape a class name or id so it can be used verbatim inside a selector.
///
/// Every character outside `[a-zA-Z0-9_-]` gets a backslash; a leading digit
/// is written as a hex escape, which CSS requires for identifiers.
pub fn escape_css_identifier(identifier: &str) -> String {
    if identifier.is_empty() {
        return String::new();
    }
    let escaped = INVALID_CSS_CHAR.replace_all(identifier, r"\${0}");
    let mut chars = escaped.chars();
    match chars.next() {
        Some(first) if first.is_ascii_digit() => {
            format!("\\{:x} {}", first as u32, chars.as_str())
        }
        _ => escaped.into_owned(),
    }
}

/// Sorted, de-duplicated, escaped classes of an element.
pub fn sorted_classes(element: ElementRef<'_>) -> Vec<String> {
    element
        .value()
        .classes()
        .map(escape_css_identifier)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Signature of a single element: `tag.class1.class2`, else `tag#id`, else `tag`.
pub fn element_signature(element: ElementRef<'_>) -> String {
    let mut signature = element.value().name().to_ascii_lowercase();
    let classes = sorted_classes(element);
    if !classes.is_empty() {
        for class in classes {
            signature.push('.');
            signature.push_str(&class);
        }
    } else if let Some(id) = element.value().id().filter(|id| !id.is_empty()) {
        signature.push('#');
        signature.push_str(&escape_css_identifier(id));
    }
    signature
}

/// Selector for a card container. Ids take priority since they are unique on the page.
pub fn container_selector(element: ElementRef<'_>) -> String {
    match element.value().id().filter(|id| !id.is_empty()) {
        Some(id) => format!(
            "{}#{}",
            element.value().name().to_ascii_lowercase(),
            escape_css_identifier(id)
        ),
        None => element_signature(element),
    }
}

/// Signature of the element prefixed by the signatures of all its ancestors,
/// from the document root down: `html > body > ul > li.card`.
pub fn full_path_signature(element: ElementRef<'_>) -> String {
    let mut path: Vec<String> = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .map(element_signature)
        .collect();
    path.reverse();
    path.push(element_signature(element));
    path.join(" > ")
}

/// Shape of an element: its tag plus the signatures of its direct children.
///
/// Siblings sharing a shape are candidates for a repeating result card.
pub fn child_shape_key(element: ElementRef<'_>) -> String {
    let mut key = element.value().name().to_ascii_lowercase();
    key.push('(');
    for (i, child) in element.children().filter_map(ElementRef::wrap).enumerate() {
        if i > 0 {
            key.push(',');
        }
        key.push_str(&element_signature(child));
    }
    key.push(')');
    key
}

/// Build `"<parent> > <tag>[.class...]"` keeping only the classes every element shares.
///
/// Per-item modifier classes (`card--featured`, `odd`) drop out of the intersection,
/// so the selector generalizes to every instance.
pub fn common_selector(parent: &str, elements: &[ElementRef<'_>]) -> String {
    let Some(first) = elements.first() else {
        return parent.to_string();
    };

    let mut common: BTreeSet<String> = sorted_classes(*first).into_iter().collect();
    for element in &elements[1..] {
        let classes: BTreeSet<String> = sorted_classes(*element).into_iter().collect();
        common = common.intersection(&classes).cloned().collect();
    }

    let mut selector = String::new();
    let _ = write!(selector, "{} > {}", parent, first.value().name().to_ascii_lowercase());
    for class in common {
        selector.push('.');
        selector.push_str(&class);
    }
    selector
}

//! Small helpers over `scraper` element trees shared by the extractors.

use crate::fetch::ScrapeError;
use scraper::{ElementRef, Selector};

/// First match of `sel` under `scope`, or a structural error naming the
/// missing piece.
pub fn select_one<'a>(
    scope: ElementRef<'a>,
    sel: &Selector,
    what: &str,
) -> Result<ElementRef<'a>, ScrapeError> {
    scope
        .select(sel)
        .next()
        .ok_or_else(|| ScrapeError::structure(format!("{what} missing")))
}

/// Concatenated, trimmed text content of an element.
pub fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// The next sibling with the given tag name, skipping everything else.
pub fn next_element_named<'a>(el: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == name)
}

/// The next element sibling carrying `class`, skipping everything else.
pub fn next_element_with_class<'a>(el: ElementRef<'a>, class: &str) -> Option<ElementRef<'a>> {
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().classes().any(|c| c == class))
}

/// Collapse runs of spaces down to one.
pub fn collapse_spaces(s: &str) -> String {
    let mut out = s.to_string();
    while out.contains("  ") {
        out = out.replace("  ", " ");
    }
    out.trim().to_string()
}

//! Lot-name blacklist: service noise an analyst tracking supply tenders
//! does not want cluttering the lots sheet.

use once_cell::sync::Lazy;
use regex::Regex;

/// Patterns are matched against the lowercased lot name, so they are
/// written in lowercase.
pub static BAD_PATTERNS: &[&str] = &[
    "охранн",
    "страхован",
    "клининг",
    "уборк[аие]",
    "вывоз (тко|отходов)",
    "техническое обслуживание",
    "коммунальн",
    "электроэнерг",
    "теплоснабжен",
    "водоснабжен",
];

static COMPILED: Lazy<Vec<Regex>> = Lazy::new(|| {
    BAD_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("valid blacklist pattern"))
        .collect()
});

/// `name` must already be lowercased by the caller.
pub fn is_blacklisted(name: &str) -> bool {
    COMPILED.iter().any(|re| re.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_noise_is_rejected() {
        assert!(is_blacklisted("оказание охранных услуг"));
        assert!(is_blacklisted("вывоз тко за 2024 год"));
    }

    #[test]
    fn supply_lots_pass() {
        assert!(!is_blacklisted("поставка перчаток смотровых"));
        assert!(!is_blacklisted("поставка лекарственных препаратов"));
    }
}

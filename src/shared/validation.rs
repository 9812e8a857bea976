use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for URL-safe keys (category slug, product SKU, store code)
    /// Must be lowercase alphanumeric with hyphens
    /// - Valid: "raw-materials", "sku123", "bolt-m8-zinc"
    /// - Invalid: "-raw", "raw-", "raw--metal", "Raw", "raw_metal", "raw/metal"
    pub static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_regex_valid() {
        assert!(SLUG_REGEX.is_match("raw-materials"));
        assert!(SLUG_REGEX.is_match("metal"));
        assert!(SLUG_REGEX.is_match("bolt-m8-zinc"));
        assert!(SLUG_REGEX.is_match("a"));
        assert!(SLUG_REGEX.is_match("2024"));
    }

    #[test]
    fn test_slug_regex_invalid() {
        assert!(!SLUG_REGEX.is_match("-raw")); // starts with hyphen
        assert!(!SLUG_REGEX.is_match("raw-")); // ends with hyphen
        assert!(!SLUG_REGEX.is_match("raw--metal")); // double hyphen
        assert!(!SLUG_REGEX.is_match("Raw")); // uppercase
        assert!(!SLUG_REGEX.is_match("raw_metal")); // underscore
        assert!(!SLUG_REGEX.is_match("raw/metal")); // path separator
        assert!(!SLUG_REGEX.is_match("")); // empty
    }
}

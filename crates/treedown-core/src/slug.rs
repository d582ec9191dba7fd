use std::collections::HashMap;

/// Turns heading text into a GitHub-style anchor: lowercase, punctuation
/// dropped, whitespace collapsed to single hyphens. Hyphens and underscores
/// survive.
pub fn slugify(text: &str) -> String {
    let mut out = String::new();
    let mut pending_hyphen = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() {
                pending_hyphen = true;
            }
            continue;
        }
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            if pending_hyphen {
                out.push('-');
                pending_hyphen = false;
            }
            for lowered in ch.to_lowercase() {
                out.push(lowered);
            }
        }
        // Other punctuation is dropped without breaking the word.
    }
    out
}

/// Assigns document-unique slugs. Repeated headings get `-1`, `-2`, ...
/// suffixes in document order.
#[derive(Debug, Default)]
pub struct Slugger {
    seen: HashMap<String, usize>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, text: &str) -> String {
        self.assign_base(slugify(text))
    }

    /// Uniqueness pass over an already-generated base, for callers that
    /// bring their own slug function.
    pub fn assign_base(&mut self, base: String) -> String {
        let base = if base.is_empty() {
            "section".to_string()
        } else {
            base
        };
        match self.seen.get_mut(&base) {
            Some(count) => {
                *count += 1;
                let slug = format!("{}-{}", base, count);
                // The suffixed form also becomes reserved, so a literal
                // "hello-1" heading later still gets a unique anchor.
                self.seen.entry(slug.clone()).or_insert(0);
                slug
            }
            None => {
                self.seen.insert(base.clone(), 0);
                base
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Slugger, slugify};

    #[test]
    fn slugs_fold_case_and_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("snake_case stays"), "snake_case-stays");
        assert_eq!(slugify("  spaced   out  "), "spaced-out");
    }

    #[test]
    fn duplicate_headings_get_suffixes() {
        let mut slugger = Slugger::new();
        assert_eq!(slugger.assign("Hello"), "hello");
        assert_eq!(slugger.assign("Hello"), "hello-1");
        assert_eq!(slugger.assign("Hello"), "hello-2");
        assert_eq!(slugger.assign("!!!"), "section");
    }
}

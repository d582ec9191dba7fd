/// URL scheme policy for links and images.
///
/// Relative URLs (no scheme) always pass. A scheme is the prefix before the
/// first `:`, provided it appears before any `/`, `?` or `#` and starts with
/// an ASCII letter.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto", "tel", "ftp", "ftps"];

/// Extracts the scheme of `url`, lowercased, or `None` for relative URLs.
/// ASCII control bytes are skipped during the scan: browsers strip them when
/// resolving a URL, so `java\tscript:` must still read as `javascript`.
pub(crate) fn url_scheme(url: &str) -> Option<String> {
    let mut scheme = String::new();
    for &b in url.as_bytes() {
        match b {
            0x00..=0x1f | 0x7f => {}
            b':' => {
                if scheme.is_empty() {
                    return None;
                }
                return Some(scheme);
            }
            b'/' | b'?' | b'#' => return None,
            _ if b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.' => {
                if scheme.is_empty() && !b.is_ascii_alphabetic() {
                    return None;
                }
                scheme.push(b.to_ascii_lowercase() as char);
            }
            _ => return None,
        }
    }
    None
}

/// Whether a URL is safe to emit under the scheme allow-list.
pub(crate) fn url_allowed(url: &str) -> bool {
    match url_scheme(url) {
        Some(scheme) => ALLOWED_SCHEMES.contains(&scheme.as_str()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{url_allowed, url_scheme};

    #[test]
    fn schemes_are_detected_case_insensitively() {
        assert_eq!(url_scheme("HTTP://x"), Some("http".to_string()));
        assert_eq!(url_scheme("mailto:a@b"), Some("mailto".to_string()));
        assert_eq!(url_scheme("/relative/path"), None);
        assert_eq!(url_scheme("no-colon"), None);
        assert_eq!(url_scheme("path/with:colon"), None);
    }

    #[test]
    fn dangerous_schemes_are_blocked() {
        assert!(url_allowed("https://example.com"));
        assert!(url_allowed("../up"));
        assert!(url_allowed("#fragment"));
        assert!(!url_allowed("javascript:alert(1)"));
        assert!(!url_allowed("JavaScript:alert(1)"));
        assert!(!url_allowed("data:text/html,hi"));
        assert!(!url_allowed("vbscript:x"));
    }

    #[test]
    fn control_bytes_cannot_split_a_scheme() {
        assert_eq!(
            url_scheme("java\tscript:alert(1)"),
            Some("javascript".to_string())
        );
        assert_eq!(url_scheme("\u{1}https://x"), Some("https".to_string()));
        assert!(!url_allowed("java\nscript:alert(1)"));
        assert!(!url_allowed("\rjavascript:alert(1)"));
    }
}

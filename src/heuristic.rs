//! Heuristic-based Tor Browser detection.
//!
//! Tor Browser sends one fixed user agent for every user: a Firefox ESR
//! string claiming a Windows platform, with whole-number versions. A
//! visitor whose address is a Tor exit but whose user agent does not look
//! like that is probably using Tor through some other client.

use once_cell::sync::Lazy;
use regex::Regex;

/// Stock Tor Browser user agent.
static TOR_BROWSER_UA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^Mozilla/5\.0\x20
        # Platform is always spoofed as Windows
        \(Windows\x20NT\x20[\d.]+;[^)]*\)\x20
        Gecko/([\d]+\.0|20100101)\x20
        # ESR releases only carry a major version
        Firefox/[\d]+\.0$
    ",
    )
    .unwrap()
});

/// Check if a user agent looks like an unmodified Tor Browser.
///
/// # Example
/// ```
/// use exitlist::heuristic::likely_tor_browser;
///
/// assert!(likely_tor_browser(
///     "Mozilla/5.0 (Windows NT 6.1; rv:24.0) Gecko/20100101 Firefox/24.0"
/// ));
/// assert!(!likely_tor_browser("curl/8.0.1"));
/// ```
pub fn likely_tor_browser(user_agent: &str) -> bool {
    TOR_BROWSER_UA.is_match(user_agent.trim())
}

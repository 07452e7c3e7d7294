use regex::Regex;
use std::sync::LazyLock;

/// Compiled regex patterns that are reused across the codebase
pub struct RegexPatterns;

impl RegexPatterns {
    /// Placeholder the platform substitutes for an @mention in message text (`@_user_1`)
    pub fn mention_marker() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"@_user_\d+").expect("Failed to compile mention marker regex")
        });
        &RE
    }

    /// Uploaded image key as it appears in backend output (`img_v3_...`)
    pub fn image_key() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"img_v3_[a-zA-Z0-9_-]+").expect("Failed to compile image key regex")
        });
        &RE
    }
}

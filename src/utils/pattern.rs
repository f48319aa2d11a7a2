use crate::error::{PreshError, Result};
use regex::Regex;

/// Case-insensitive glob (`*`, `?`) over module names. A pattern without
/// wildcards matches as a substring.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(PreshError::Configuration(
                "Filter pattern cannot be empty".to_string(),
            ));
        }

        let adjusted = if trimmed.contains(['*', '?']) {
            trimmed.to_string()
        } else {
            format!("*{}*", trimmed)
        };

        let regex = Self::compile_glob(&adjusted)?;
        Ok(Self { regex })
    }

    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    fn compile_glob(pattern: &str) -> Result<Regex> {
        let mut regex = String::from("(?i)^");
        for ch in pattern.chars() {
            match ch {
                '*' => regex.push_str(".*"),
                '?' => regex.push('.'),
                _ => regex.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4]))),
            }
        }
        regex.push('$');

        Regex::new(&regex).map_err(|e| {
            PreshError::Configuration(format!("Invalid filter pattern '{}': {}", pattern, e))
        })
    }
}

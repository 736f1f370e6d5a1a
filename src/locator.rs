use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Persisted list of player profile locators (profile URLs).
#[derive(Debug, Clone, Default)]
pub struct LocatorIndex {
    locators: Vec<String>,
}

impl LocatorIndex {
    pub fn new(locators: Vec<String>) -> Self {
        Self { locators }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read locator list {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parse locator list {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let locators: Vec<String> =
            serde_json::from_str(raw).context("expected a JSON array of strings")?;
        Ok(Self::new(locators))
    }

    pub fn len(&self) -> usize {
        self.locators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    /// Locators containing the name as a slug ("Luka Garza" -> "luka-garza"),
    /// case-insensitively, in file order.
    pub fn find(&self, name: &str) -> Vec<&str> {
        let slug = name_slug(name);
        if slug.is_empty() {
            return Vec::new();
        }
        self.locators
            .iter()
            .filter(|loc| loc.to_lowercase().contains(&slug))
            .map(|loc| loc.as_str())
            .collect()
    }

    pub fn first_match(&self, name: &str) -> Option<&str> {
        self.find(name).into_iter().next()
    }
}

pub fn name_slug(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_case_insensitive_slug_substring() {
        let idx = LocatorIndex::from_json(
            r#"["https://x/cbb/players/luka-garza-1.html","https://x/cbb/players/caitlin-clark-1.html"]"#,
        )
        .expect("valid json");
        assert_eq!(idx.find("Luka Garza"), vec!["https://x/cbb/players/luka-garza-1.html"]);
        assert_eq!(idx.find("CLARK").len(), 1);
        assert!(idx.find("Zion").is_empty());
        assert!(idx.find("   ").is_empty());
    }
}

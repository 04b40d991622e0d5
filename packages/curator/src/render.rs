//! Outbound message formatting.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::models::Job;
use crate::traits::BaseRenderer;

const MAX_LOCATION_CHARS: usize = 25;

/// Read-only employer blurbs, keyed by lowercased name.
///
/// Loaded once at startup and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct EmployerDirectory {
    entries: HashMap<String, String>,
}

impl EmployerDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, blurb)| (normalize(name.as_ref()), blurb.into()))
                .collect(),
        }
    }

    /// Load a JSON object of `{"employer name": "what they do"}`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read employer directory {}", path.display()))?;
        let entries: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid employer directory JSON in {}", path.display()))?;
        Ok(Self::from_map(entries))
    }

    pub fn describe(&self, employer: &str) -> Option<&str> {
        self.entries
            .get(&normalize(employer))
            .map(String::as_str)
            .filter(|blurb| !blurb.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Markdown message: title, employer, location, pay, apply link.
pub struct PlainRenderer {
    directory: Arc<EmployerDirectory>,
}

impl PlainRenderer {
    pub fn new(directory: Arc<EmployerDirectory>) -> Self {
        Self { directory }
    }
}

impl Default for PlainRenderer {
    fn default() -> Self {
        Self::new(Arc::new(EmployerDirectory::empty()))
    }
}

impl BaseRenderer for PlainRenderer {
    fn render(&self, job: &Job) -> String {
        let badge = if job.high_priority { " 🔥" } else { "" };
        let mut message = format!("🌍 *{}*{}\n", job.title, badge);

        match self.directory.describe(&job.company) {
            Some(blurb) => message.push_str(&format!("🏢 *Company:* {} - {}\n", job.company, blurb)),
            None => message.push_str(&format!("🏢 *Company:* {}\n", job.company)),
        }

        message.push_str(&format!("📍 Remote | 🌎 {}", short_location(&job.location)));

        if let Some(salary) = salary_line(job.salary_min, job.salary_max) {
            message.push_str(&format!("\n💰 {}", salary));
        }

        message.push_str(&format!("\n\n🔗 [Apply]({})", job.apply_url()));
        message
    }
}

fn short_location(location: &str) -> String {
    let location = location.trim();
    if location.is_empty() {
        return "Worldwide".to_string();
    }
    if location.chars().count() > MAX_LOCATION_CHARS {
        let head: String = location.chars().take(MAX_LOCATION_CHARS - 3).collect();
        return format!("{}...", head);
    }
    location.to_string()
}

fn salary_line(min: Option<i64>, max: Option<i64>) -> Option<String> {
    match (min, max) {
        (Some(min), Some(max)) => Some(format!(
            "USD ${} - ${}/year",
            thousands(min),
            thousands(max)
        )),
        (Some(min), None) => Some(format!("USD ${}+/year", thousands(min))),
        (None, Some(max)) => Some(format!("up to USD ${}/year", thousands(max))),
        (None, None) => None,
    }
}

fn thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job() -> Job {
        let mut job = Job::new(
            "remoteok",
            "1",
            "Senior Rust Engineer",
            "Acme",
            "https://remoteok.com/remote-jobs/1",
            Utc::now(),
        )
        .with_location("Anywhere in the Americas or Europe")
        .with_salary(Some(90_000), Some(120_000));
        job.canonical_url = Some("https://jobs.lever.co/acme/1".into());
        job.high_priority = true;
        job
    }

    #[test]
    fn test_render_full_message() {
        let directory = EmployerDirectory::from_map([("ACME ", "builds rockets")]);
        let renderer = PlainRenderer::new(Arc::new(directory));

        let message = renderer.render(&job());

        assert_eq!(
            message,
            "🌍 *Senior Rust Engineer* 🔥\n\
             🏢 *Company:* Acme - builds rockets\n\
             📍 Remote | 🌎 Anywhere in the Americ...\n\
             💰 USD $90,000 - $120,000/year\n\
             \n\
             🔗 [Apply](https://jobs.lever.co/acme/1)"
        );
    }

    #[test]
    fn test_render_without_optional_parts() {
        let mut job = job().with_location("").with_salary(None, None);
        job.canonical_url = None;
        job.high_priority = false;

        let message = PlainRenderer::default().render(&job);

        assert!(message.starts_with("🌍 *Senior Rust Engineer*\n🏢 *Company:* Acme\n"));
        assert!(message.contains("🌎 Worldwide"));
        assert!(!message.contains("💰"));
        assert!(message.ends_with("[Apply](https://remoteok.com/remote-jobs/1)"));
    }

    #[test]
    fn test_thousands_separator() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1_000), "1,000");
        assert_eq!(thousands(1_234_567), "1,234,567");
    }
}

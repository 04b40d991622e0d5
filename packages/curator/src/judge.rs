//! Rule-based screening: a cheap prefilter plus a heuristic judge.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::models::Job;
use crate::traits::{BaseJudge, Judgement};

/// Terms that disqualify a posting outright.
pub const DEFAULT_REJECTION_TERMS: &[&str] = &[
    "us-only",
    "usa only",
    "u.s. only",
    "us citizens only",
    "us residents only",
    "must be located in the us",
    "must reside in the us",
    "eu only",
    "uk only",
    "canada only",
    "security clearance",
    "commission only",
    "be your own boss",
    "mlm",
];

/// Case-insensitive substring screen over title, description and location.
#[derive(Debug, Clone)]
pub struct Prefilter {
    terms: Vec<String>,
}

impl Default for Prefilter {
    fn default() -> Self {
        Self::new(DEFAULT_REJECTION_TERMS.iter().copied())
    }
}

impl Prefilter {
    pub fn new<I>(terms: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.into().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// The first matching term, or `None` if the job passes.
    pub fn check(&self, job: &Job) -> Option<&str> {
        let haystack = format!("{} {} {}", job.title, job.description, job.location).to_lowercase();
        self.terms
            .iter()
            .find(|term| haystack.contains(term.as_str()))
            .map(String::as_str)
    }
}

/// Approves anything the prefilter lets through and flags high pay.
///
/// High priority means the top of the advertised range, converted from
/// annual to monthly USD, meets the threshold.
pub struct HeuristicJudge {
    prefilter: Prefilter,
    monthly_high_threshold: i64,
}

impl HeuristicJudge {
    pub const DEFAULT_MONTHLY_THRESHOLD: i64 = 4000;

    pub fn new(prefilter: Prefilter, monthly_high_threshold: i64) -> Self {
        Self {
            prefilter,
            monthly_high_threshold,
        }
    }

    fn is_high_salary(&self, job: &Job) -> bool {
        job.salary_max
            .or(job.salary_min)
            .map(|annual| annual / 12 >= self.monthly_high_threshold)
            .unwrap_or(false)
    }
}

impl Default for HeuristicJudge {
    fn default() -> Self {
        Self::new(Prefilter::default(), Self::DEFAULT_MONTHLY_THRESHOLD)
    }
}

#[async_trait]
impl BaseJudge for HeuristicJudge {
    async fn judge(&self, job: &Job) -> Result<Judgement> {
        if let Some(term) = self.prefilter.check(job) {
            return Ok(Judgement::reject(format!("rejection term: {}", term)));
        }

        let high = self.is_high_salary(job);
        debug!(job_id = %job.id, high_priority = high, "Job approved");
        Ok(Judgement::approve(high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job(title: &str, location: &str) -> Job {
        Job::new("test", title, title, "Acme", "https://example.com", Utc::now())
            .with_location(location)
            .with_description("Build things in Rust.")
    }

    #[test]
    fn test_prefilter_matches_case_insensitively() {
        let prefilter = Prefilter::default();
        assert_eq!(prefilter.check(&job("Backend Engineer", "USA Only")), Some("usa only"));
        assert_eq!(prefilter.check(&job("Backend Engineer", "Worldwide")), None);
    }

    #[test]
    fn test_prefilter_ignores_blank_terms() {
        let prefilter = Prefilter::new(["", "  ", "Onsite"]);
        assert_eq!(prefilter.check(&job("Onsite Engineer", "")), Some("onsite"));
        assert_eq!(prefilter.check(&job("Engineer", "")), None);
    }

    #[tokio::test]
    async fn test_heuristic_judge_flags_high_salary() {
        let judge = HeuristicJudge::default();

        let rich = job("Staff Engineer", "Worldwide").with_salary(Some(60_000), Some(96_000));
        let verdict = judge.judge(&rich).await.unwrap();
        assert!(verdict.approved);
        assert!(verdict.high_priority);

        let modest = job("Junior Engineer", "Worldwide").with_salary(Some(30_000), Some(40_000));
        let verdict = judge.judge(&modest).await.unwrap();
        assert!(verdict.approved);
        assert!(!verdict.high_priority);

        let unknown = job("Engineer", "Worldwide");
        assert!(!judge.judge(&unknown).await.unwrap().high_priority);
    }

    #[tokio::test]
    async fn test_heuristic_judge_rejects_prefiltered() {
        let verdict = HeuristicJudge::default()
            .judge(&job("Engineer (security clearance required)", "Remote"))
            .await
            .unwrap();
        assert!(!verdict.approved);
        assert_eq!(verdict.reason.as_deref(), Some("rejection term: security clearance"));
    }
}

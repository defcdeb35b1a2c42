//! Failure categories
//!
//! Failed and broken results are sorted into named categories by regex
//! rules over their status, message and trace. The first matching rule
//! wins; results no custom rule matches fall back to the default
//! "Product defects" (failed) and "Test defects" (broken) categories.

use crate::error::{Error, Result};
use crate::model::{TestId, TestResult, TestStatus};
use regex::Regex;
use serde::Serialize;

pub const PRODUCT_DEFECTS: &str = "Product defects";
pub const TEST_DEFECTS: &str = "Test defects";

#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub name: String,
    /// Statuses the rule applies to; failed and broken when empty.
    pub statuses: Vec<TestStatus>,
    pub message: Option<Regex>,
    pub trace: Option<Regex>,
}

impl CategoryRule {
    pub fn new(name: impl Into<String>) -> Self {
        CategoryRule {
            name: name.into(),
            statuses: Vec::new(),
            message: None,
            trace: None,
        }
    }

    pub fn with_statuses(mut self, statuses: &[TestStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_message(mut self, pattern: &str) -> Result<Self> {
        self.message = Some(compile(&self.name, pattern)?);
        Ok(self)
    }

    pub fn with_trace(mut self, pattern: &str) -> Result<Self> {
        self.trace = Some(compile(&self.name, pattern)?);
        Ok(self)
    }

    pub fn matches(&self, result: &TestResult) -> bool {
        let status_ok = if self.statuses.is_empty() {
            result.status.is_failure()
        } else {
            self.statuses.contains(&result.status)
        };
        if !status_ok {
            return false;
        }

        let text_matches = |regex: &Option<Regex>, text: &Option<String>| match regex {
            None => true,
            Some(regex) => text.as_deref().is_some_and(|t| regex.is_match(t)),
        };
        text_matches(&self.message, &result.message) && text_matches(&self.trace, &result.trace)
    }
}

fn compile(name: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::Config(format!("Invalid pattern for category '{}': {}", name, e)))
}

/// The fallback rules appended after any custom ones
pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(PRODUCT_DEFECTS).with_statuses(&[TestStatus::Failed]),
        CategoryRule::new(TEST_DEFECTS).with_statuses(&[TestStatus::Broken]),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    pub result_ids: Vec<TestId>,
}

/// Assign each result to the first matching rule
///
/// Categories come out in rule order; empty ones are omitted. `rules` are
/// tried before [`default_rules`].
pub fn categorize<'a, I>(rules: &[CategoryRule], results: I) -> Vec<Category>
where
    I: IntoIterator<Item = &'a TestResult>,
{
    let defaults = default_rules();
    let all_rules: Vec<&CategoryRule> = rules.iter().chain(defaults.iter()).collect();
    let mut buckets: Vec<Vec<TestId>> = vec![Vec::new(); all_rules.len()];

    for result in results {
        if let Some(index) = all_rules.iter().position(|rule| rule.matches(result)) {
            buckets[index].push(result.id.clone());
        }
    }

    // Custom rules may share a name with each other or with a default.
    let mut categories: Vec<Category> = Vec::new();
    for (rule, ids) in all_rules.into_iter().zip(buckets) {
        if ids.is_empty() {
            continue;
        }
        match categories.iter_mut().find(|c| c.name == rule.name) {
            Some(existing) => existing.result_ids.extend(ids),
            None => categories.push(Category {
                name: rule.name.clone(),
                result_ids: ids,
            }),
        }
    }
    categories
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories() {
        let results = vec![
            TestResult::failed("1", "expected 1"),
            TestResult::broken("2", "NullPointerException"),
            TestResult::passed("3"),
            TestResult::failed("4", "expected 2"),
        ];

        let categories = categorize(&[], &results);
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].name, PRODUCT_DEFECTS);
        assert_eq!(
            categories[0].result_ids,
            vec![TestId::new("1"), TestId::new("4")]
        );
        assert_eq!(categories[1].name, TEST_DEFECTS);
    }

    #[test]
    fn test_custom_rule_takes_precedence() {
        let rules = vec![CategoryRule::new("Timeouts")
            .with_message("(?i)timed? ?out")
            .unwrap()];
        let results = vec![
            TestResult::broken("1", "Request timed out"),
            TestResult::broken("2", "segfault"),
        ];

        let categories = categorize(&rules, &results);
        assert_eq!(categories[0].name, "Timeouts");
        assert_eq!(categories[0].result_ids, vec![TestId::new("1")]);
        assert_eq!(categories[1].name, TEST_DEFECTS);
        assert_eq!(categories[1].result_ids, vec![TestId::new("2")]);
    }

    #[test]
    fn test_rule_on_trace_requires_trace() {
        let rule = CategoryRule::new("Asserts")
            .with_trace("AssertionError")
            .unwrap();

        let without_trace = TestResult::failed("1", "x");
        let mut with_trace = TestResult::failed("2", "x");
        with_trace.trace = Some("at foo\nAssertionError".to_string());

        assert!(!rule.matches(&without_trace));
        assert!(rule.matches(&with_trace));
    }

    #[test]
    fn test_rule_with_explicit_statuses() {
        let rule = CategoryRule::new("Ignored").with_statuses(&[TestStatus::Skipped]);
        assert!(rule.matches(&TestResult::skipped("1")));
        assert!(!rule.matches(&TestResult::failed("2", "x")));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = CategoryRule::new("Bad").with_message("(").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_no_failures_no_categories() {
        let results = vec![TestResult::passed("1")];
        assert!(categorize(&[], &results).is_empty());
    }
}

//! Quality gate evaluation
//!
//! Rules are checked against the final statistics of a run. Violations are
//! plain data: it is up to the caller to turn them into an exit status.

use crate::model::{TestResult, TestStatistic};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityGateRule {
    /// At most this many failed or broken results
    MaxFailures(usize),
    /// At least this many results
    MinTestsCount(usize),
    /// Passed / total must reach this ratio (0.0 to 1.0)
    SuccessRate(f64),
    /// No single result may take longer than this
    MaxDuration(Duration),
}

impl QualityGateRule {
    pub fn name(&self) -> &'static str {
        match self {
            QualityGateRule::MaxFailures(_) => "maxFailures",
            QualityGateRule::MinTestsCount(_) => "minTestsCount",
            QualityGateRule::SuccessRate(_) => "successRate",
            QualityGateRule::MaxDuration(_) => "maxDuration",
        }
    }
}

impl fmt::Display for QualityGateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityGateRule::MaxFailures(n) => write!(f, "{} = {}", self.name(), n),
            QualityGateRule::MinTestsCount(n) => write!(f, "{} = {}", self.name(), n),
            QualityGateRule::SuccessRate(r) => write!(f, "{} = {}", self.name(), r),
            QualityGateRule::MaxDuration(d) => {
                write!(f, "{} = {}ms", self.name(), d.as_millis())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityGateViolation {
    pub rule: String,
    pub message: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for QualityGateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (expected {}, actual {})",
            self.rule, self.message, self.expected, self.actual
        )
    }
}

/// Success rate of a run; an empty run counts as fully successful
pub fn success_rate(stats: &TestStatistic) -> f64 {
    if stats.total == 0 {
        1.0
    } else {
        stats.passed as f64 / stats.total as f64
    }
}

/// Check every rule, returning the violated ones in rule order
pub fn evaluate(
    rules: &[QualityGateRule],
    stats: &TestStatistic,
    results: &[&TestResult],
) -> Vec<QualityGateViolation> {
    let mut violations = Vec::new();

    for rule in rules {
        let violation = match *rule {
            QualityGateRule::MaxFailures(max) => {
                let actual = stats.failures();
                (actual > max).then(|| {
                    (
                        format!("{} failed or broken tests, at most {} allowed", actual, max),
                        max.to_string(),
                        actual.to_string(),
                    )
                })
            }
            QualityGateRule::MinTestsCount(min) => (stats.total < min).then(|| {
                (
                    format!("{} tests run, at least {} required", stats.total, min),
                    min.to_string(),
                    stats.total.to_string(),
                )
            }),
            QualityGateRule::SuccessRate(min) => {
                let actual = success_rate(stats);
                (actual < min).then(|| {
                    (
                        format!("success rate {:.2} is below {:.2}", actual, min),
                        min.to_string(),
                        format!("{:.4}", actual),
                    )
                })
            }
            QualityGateRule::MaxDuration(max) => {
                let longest = results
                    .iter()
                    .filter_map(|tr| tr.effective_duration().map(|d| (d, tr)))
                    .max_by_key(|(d, _)| *d);
                match longest {
                    Some((actual, tr)) if actual > max => Some((
                        format!("{} took {}ms", tr.name, actual.as_millis()),
                        format!("{}ms", max.as_millis()),
                        format!("{}ms", actual.as_millis()),
                    )),
                    _ => None,
                }
            }
        };

        if let Some((message, expected, actual)) = violation {
            violations.push(QualityGateViolation {
                rule: rule.name().to_string(),
                message,
                expected,
                actual,
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestStatus;

    fn stats_of(results: &[TestResult]) -> TestStatistic {
        let mut stats = TestStatistic::default();
        for result in results {
            stats.record(result.status);
        }
        stats
    }

    #[test]
    fn test_no_rules_no_violations() {
        let stats = TestStatistic::default();
        assert!(evaluate(&[], &stats, &[]).is_empty());
    }

    #[test]
    fn test_max_failures() {
        let results = vec![
            TestResult::failed("1", "a"),
            TestResult::broken("2", "b"),
            TestResult::passed("3"),
        ];
        let stats = stats_of(&results);
        let refs: Vec<&TestResult> = results.iter().collect();

        assert!(evaluate(&[QualityGateRule::MaxFailures(2)], &stats, &refs).is_empty());

        let violations = evaluate(&[QualityGateRule::MaxFailures(1)], &stats, &refs);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "maxFailures");
        assert_eq!(violations[0].expected, "1");
        assert_eq!(violations[0].actual, "2");
    }

    #[test]
    fn test_min_tests_count() {
        let results = vec![TestResult::passed("1")];
        let stats = stats_of(&results);

        let violations = evaluate(&[QualityGateRule::MinTestsCount(5)], &stats, &[]);
        assert_eq!(violations[0].actual, "1");
    }

    #[test]
    fn test_success_rate_of_empty_run() {
        let stats = TestStatistic::default();
        assert_eq!(success_rate(&stats), 1.0);
        assert!(evaluate(&[QualityGateRule::SuccessRate(1.0)], &stats, &[]).is_empty());
    }

    #[test]
    fn test_success_rate_below_threshold() {
        let results = vec![
            TestResult::passed("1"),
            TestResult::failed("2", "x"),
            TestResult::skipped("3"),
            TestResult::passed("4"),
        ];
        let stats = stats_of(&results);
        assert_eq!(stats.count(TestStatus::Passed), 2);

        let violations = evaluate(&[QualityGateRule::SuccessRate(0.9)], &stats, &[]);
        assert_eq!(violations[0].rule, "successRate");
        assert_eq!(violations[0].actual, "0.5000");
    }

    #[test]
    fn test_max_duration_reports_longest_result() {
        let results = vec![
            TestResult::passed("1")
                .with_name("quick")
                .with_duration(Duration::from_millis(10)),
            TestResult::passed("2")
                .with_name("slow")
                .with_duration(Duration::from_millis(900)),
            TestResult::passed("3").with_name("untimed"),
        ];
        let stats = stats_of(&results);
        let refs: Vec<&TestResult> = results.iter().collect();

        let rules = [QualityGateRule::MaxDuration(Duration::from_millis(500))];
        let violations = evaluate(&rules, &stats, &refs);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "slow took 900ms");
        assert_eq!(violations[0].expected, "500ms");
    }

    #[test]
    fn test_violations_follow_rule_order() {
        let results = vec![TestResult::failed("1", "x")];
        let stats = stats_of(&results);
        let rules = [
            QualityGateRule::MinTestsCount(2),
            QualityGateRule::MaxFailures(0),
        ];

        let names: Vec<String> = evaluate(&rules, &stats, &[])
            .into_iter()
            .map(|v| v.rule)
            .collect();
        assert_eq!(names, vec!["minTestsCount", "maxFailures"]);
    }
}

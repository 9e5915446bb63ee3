/// Test Harness - Sandbox Runs Judged by the Output Comparator
///
/// Cases run one after another, each sandbox call under its own timeout.
/// A failing call fails only its own case; the run always yields a summary.

use crate::error::with_timeout;
use crate::sandbox::Sandbox;
use proctor_analysis::comparator::{normalize_output, OutputComparator};
use proctor_common::types::{Language, TestCase, TestCaseResult, TestRunSummary};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct TestHarness<'a> {
    sandbox: &'a dyn Sandbox,
    comparator: OutputComparator,
    timeout_secs: u64,
}

impl<'a> TestHarness<'a> {
    pub fn new(sandbox: &'a dyn Sandbox, comparator: OutputComparator, timeout_secs: u64) -> Self {
        Self {
            sandbox,
            comparator,
            timeout_secs,
        }
    }

    pub async fn run(
        &self,
        submission_id: Uuid,
        code: &str,
        language: Language,
        cases: &[TestCase],
    ) -> TestRunSummary {
        let mut results = Vec::with_capacity(cases.len());

        for (idx, case) in cases.iter().enumerate() {
            let test_case = idx + 1;
            let expected = case.output.trim().to_string();
            let normalized_expected = normalize_output(&expected);

            let outcome = with_timeout(
                "sandbox",
                self.timeout_secs,
                self.sandbox.run(code, language, &case.input),
            )
            .await;

            let result = match outcome {
                Ok(output) => {
                    let actual = output.trim().to_string();
                    let passed = self.comparator.equivalent(&actual, &expected);
                    debug!(
                        submission_id = %submission_id,
                        test_case,
                        passed,
                        strategy = ?self.comparator.matching_strategy(&actual, &expected),
                        "Test case evaluated"
                    );
                    TestCaseResult {
                        test_case,
                        input: case.input.clone(),
                        expected,
                        normalized_actual: Some(normalize_output(&actual)),
                        actual: Some(actual),
                        passed,
                        error: None,
                        normalized_expected,
                    }
                }
                Err(e) => {
                    warn!(submission_id = %submission_id, test_case, service = e.service(), error = %e, "Sandbox run failed");
                    TestCaseResult {
                        test_case,
                        input: case.input.clone(),
                        expected,
                        actual: None,
                        passed: false,
                        error: Some(e.to_string()),
                        normalized_expected,
                        normalized_actual: None,
                    }
                }
            };
            results.push(result);
        }

        summarize(results)
    }
}

pub fn summarize(results: Vec<TestCaseResult>) -> TestRunSummary {
    let total_count = results.len();
    let passed_count = results.iter().filter(|r| r.passed).count();
    let pass_percentage = if total_count > 0 {
        passed_count as f64 / total_count as f64 * 100.0
    } else {
        0.0
    };

    TestRunSummary {
        results,
        passed_count,
        total_count,
        pass_percentage,
    }
}

#[cfg(test)]
pub mod fake {
    use crate::error::ExternalError;
    use crate::sandbox::Sandbox;
    use async_trait::async_trait;
    use proctor_common::types::Language;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers by stdin lookup; unknown inputs fail with HTTP 500 and the
    /// `hang` input sleeps past any timeout
    #[derive(Default)]
    pub struct TableSandbox {
        pub outputs: HashMap<String, String>,
        pub calls: AtomicUsize,
    }

    impl TableSandbox {
        pub fn with(pairs: &[(&str, &str)]) -> Self {
            Self {
                outputs: pairs
                    .iter()
                    .map(|(input, output)| (input.to_string(), output.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sandbox for TableSandbox {
        async fn run(&self, _code: &str, _language: Language, stdin: &str) -> Result<String, ExternalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if stdin == "hang" {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.outputs.get(stdin).cloned().ok_or_else(|| ExternalError::Http {
                service: "sandbox",
                status: 500,
                body: "internal error".to_string(),
            })
        }
    }
}

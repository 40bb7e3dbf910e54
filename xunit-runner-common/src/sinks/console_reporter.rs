use colored::*;
use std::collections::HashMap;
use std::sync::Mutex;

use xunit_sdk::{FailureInformation, Message, MessageSink};

use crate::config::RunnerConfig;

/// Console consumer printing failures, skips and per-assembly totals
pub struct ConsoleReporter {
    verbose: bool,
    show_diagnostics: bool,
    /// Display names by test case ID, filled from TestCaseStarting
    display_names: Mutex<HashMap<String, String>>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            show_diagnostics: false,
            display_names: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_diagnostics(mut self, show: bool) -> Self {
        self.show_diagnostics = show;
        self
    }

    /// Reporter honoring the configuration's diagnostic setting
    pub fn from_config(config: &RunnerConfig, verbose: bool) -> Self {
        Self::new(verbose).with_diagnostics(config.diagnostic_messages)
    }

    fn display_name(&self, test_case_unique_id: &str) -> String {
        self.display_names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(test_case_unique_id)
            .cloned()
            .unwrap_or_else(|| test_case_unique_id.to_string())
    }

    fn report(&self, message: &Message) {
        match message {
            Message::TestAssemblyStarting(starting) => {
                println!(
                    "\n{} {} ({}, {})\n",
                    "Running".bold(),
                    starting.assembly_name,
                    starting.test_framework_display_name,
                    starting.test_environment
                );
            }
            Message::TestCaseStarting(starting) => {
                self.display_names
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(starting.test_case_unique_id.clone(), starting.display_name.clone());
                if self.verbose {
                    println!("Running {} ...", starting.display_name);
                }
            }
            Message::TestPassed(passed) if self.verbose => {
                let name = self.display_name(&passed.test_case_unique_id);
                println!("{} ... {} ({}ms)", name, "PASS".green(), passed.execution_time.as_millis());
                if !passed.output.is_empty() {
                    println!("  Output: {}", passed.output.trim_end().dimmed());
                }
            }
            Message::TestFailed(failed) => {
                let name = self.display_name(&failed.test_case_unique_id);
                println!("{} ... {} ({}ms)", name, "FAIL".red(), failed.execution_time.as_millis());
                print!("{}", format_failure(&failed.failure));
                if self.verbose && !failed.output.is_empty() {
                    println!("  Output: {}", failed.output.trim_end().dimmed());
                }
            }
            Message::TestSkipped(skipped) => {
                let name = self.display_name(&skipped.test_case_unique_id);
                println!("{} ... {}: {}", name, "SKIP".yellow(), skipped.reason);
            }
            Message::ErrorMessage(error) => {
                println!("{}", "[FATAL ERROR]".red().bold());
                print!("{}", format_failure(&error.failure));
            }
            Message::DiagnosticMessage(diagnostic) if self.show_diagnostics => {
                println!("{} {}", "[diagnostic]".dimmed(), diagnostic.message);
            }
            Message::TestAssemblyFinished(finished) => {
                println!("\n{} {}", "Test Summary".bold().underline(), finished.assembly_name);
                println!("{}", format_totals(&finished.summary));
            }
            other if other.kind().is_cleanup_failure() => {
                if let Some((scope, failure)) = cleanup_failure(other) {
                    println!("{} {}", format!("[{} cleanup failure]", scope).red(), failure.summary_message());
                }
            }
            _ => {}
        }
    }
}

impl MessageSink for ConsoleReporter {
    fn on_message(&self, message: &Message) -> bool {
        self.report(message);
        true
    }
}

fn cleanup_failure(message: &Message) -> Option<(&'static str, &FailureInformation)> {
    match message {
        Message::TestAssemblyCleanupFailure(m) => Some(("assembly", &m.failure)),
        Message::TestCollectionCleanupFailure(m) => Some(("collection", &m.failure)),
        Message::TestClassCleanupFailure(m) => Some(("class", &m.failure)),
        Message::TestMethodCleanupFailure(m) => Some(("method", &m.failure)),
        Message::TestCaseCleanupFailure(m) => Some(("test case", &m.failure)),
        Message::TestCleanupFailure(m) => Some(("test", &m.failure)),
        _ => None,
    }
}

/// Failure tree, indented by nesting depth
pub fn format_failure(failure: &FailureInformation) -> String {
    let mut rendered = String::new();

    for (index, fault_type) in failure.exception_types.iter().enumerate() {
        let indent = "  ".repeat(nesting_depth(failure, index));
        let message = failure.messages.get(index).map(String::as_str).unwrap_or_default();
        rendered.push_str(&format!("{}{} : {}\n", indent, fault_type, message));
        if let Some(Some(stack_trace)) = failure.stack_traces.get(index) {
            for line in stack_trace.lines() {
                rendered.push_str(&format!("{}  {}\n", indent, line));
            }
        }
    }

    rendered
}

/// Depth below the root, following parent indices; bad or cyclic indices stop the walk
fn nesting_depth(failure: &FailureInformation, index: usize) -> usize {
    let mut depth = 1;
    let mut parent = failure.exception_parent_indices.get(index).copied().unwrap_or(-1);
    while parent >= 0 && depth <= failure.len() {
        depth += 1;
        parent = usize::try_from(parent)
            .ok()
            .and_then(|p| failure.exception_parent_indices.get(p).copied())
            .unwrap_or(-1);
    }
    depth
}

pub fn format_totals(summary: &xunit_sdk::RunSummary) -> String {
    format!(
        "  Total: {}, Failed: {}, Skipped: {}, Time: {:.3}s",
        summary.total,
        summary.failed,
        summary.skipped,
        summary.time.as_secs_f64()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use xunit_sdk::messages::TestCaseStarting;
    use xunit_sdk::{Fault, RunSummary};

    #[test]
    fn test_format_failure_indents_nested() {
        let fault = Fault::new("SetupFailed", "outer").with_nested(Fault::new("IOException", "inner"));
        let rendered = format_failure(&FailureInformation::from_fault(&fault));

        assert_eq!(rendered, "  SetupFailed : outer\n    IOException : inner\n");
    }

    #[test]
    fn test_format_failure_tolerates_bad_parent_indices() {
        let failure = FailureInformation {
            exception_types: vec!["Outer".into(), "Inner".into(), "Stray".into()],
            messages: vec!["a".into(), "b".into()],
            stack_traces: vec![None],
            exception_parent_indices: vec![1, 0, 7],
        };

        let rendered = format_failure(&failure);
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.contains("Stray : \n"));
    }

    #[test]
    fn test_from_config_shows_diagnostics() {
        let config = RunnerConfig {
            diagnostic_messages: true,
            ..RunnerConfig::default()
        };
        assert!(ConsoleReporter::from_config(&config, false).show_diagnostics);
        assert!(!ConsoleReporter::from_config(&RunnerConfig::default(), true).show_diagnostics);
    }

    #[test]
    fn test_format_totals() {
        let summary = RunSummary::new(3, 1, 1, Duration::from_millis(1500));
        assert_eq!(format_totals(&summary), "  Total: 3, Failed: 1, Skipped: 1, Time: 1.500s");
    }

    #[test]
    fn test_reporter_remembers_names() {
        let reporter = ConsoleReporter::new(false);
        assert!(reporter.on_message(
            &TestCaseStarting {
                test_method_unique_id: "m".into(),
                test_case_unique_id: "c".into(),
                display_name: "Math.Adds".into(),
                skip_reason: None,
                traits: Default::default(),
                source_information: None,
            }
            .into()
        ));
        assert_eq!(reporter.display_name("c"), "Math.Adds");
        assert_eq!(reporter.display_name("unknown"), "unknown");
    }
}

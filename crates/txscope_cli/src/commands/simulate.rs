//! Simulate command implementation.
//!
//! Runs a scenario tree against a [`MemoryProvider`] on a fresh call chain
//! and reports what every frame saw, the provider journal and the data that
//! was committed.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use txscope_core::{CallContext, Failure, Transactional, TxError, TxResult};
use txscope_testkit::{Event, MemoryEnv, MemoryScope};

use crate::schema::{ScenarioFile, Step};

/// One frame-level observation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Trace {
    /// A step's body started.
    Entered {
        /// Step name.
        step: String,
        /// Nesting level, starting at 0.
        level: usize,
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Scope visible to the body.
        scope: Option<u64>,
        /// Whether the body's call opened that scope.
        owns_scope: bool,
    },
    /// A step's wrapped call returned.
    Returned {
        /// Step name.
        step: String,
        /// Nesting level, starting at 0.
        level: usize,
        /// Error code if the call failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<&'static str>,
        /// Error message if the call failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Result of a simulation.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Scenario label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the top-level call succeeded.
    pub succeeded: bool,
    /// Structured details of the top-level error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BTreeMap<&'static str, String>>,
    /// Frame observations in order.
    pub trace: Vec<Trace>,
    /// Provider events in order.
    pub journal: Vec<Event>,
    /// Committed key/value data.
    pub committed: BTreeMap<String, String>,
    /// Stack entries left on the chain after the call.
    pub leaked_entries: usize,
    /// First lifecycle problem found in the journal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle_error: Option<String>,
}

struct Runner<'a> {
    env: &'a MemoryEnv,
    trace: Mutex<Vec<Trace>>,
}

impl Runner<'_> {
    fn run_step(
        &self,
        step: &Step,
        ctx: &CallContext<MemoryScope>,
        level: usize,
    ) -> TxResult<()> {
        let wrapper = Transactional::new(Arc::clone(&self.env.registry), step.options.clone())?;

        let result = wrapper.call(ctx, |frame| {
            self.trace.lock().push(Trace::Entered {
                step: step.name.clone(),
                level,
                attempt: frame.attempt(),
                scope: frame.scope().map(MemoryScope::id),
                owns_scope: frame.owns_scope(),
            });

            if let Some(scope) = frame.scope() {
                for (key, value) in &step.writes {
                    scope.put(key.clone(), value.clone())?;
                }
            }
            if let Some(duration) = step.sleep {
                frame.sleep(duration)?;
            }
            for child in &step.steps {
                if let Err(err) = self.run_step(child, frame.context(), level + 1) {
                    if !child.tolerate_failure {
                        return Err(Failure::from(err));
                    }
                }
            }
            match step.failure_for(frame.attempt()) {
                Some((class, message)) => Err(Failure::new(class.clone(), message)),
                None => Ok(()),
            }
        });

        self.trace.lock().push(Trace::Returned {
            step: step.name.clone(),
            level,
            code: result.as_ref().err().map(|e| e.code().as_str()),
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }
}

/// Runs `scenario` against a fresh in-memory provider.
pub fn simulate(scenario: &ScenarioFile) -> TxResult<SimulationReport> {
    let root = scenario.compile()?;

    let env = MemoryEnv::new();
    env.provider.fail_next_opens(scenario.faults.fail_opens);
    env.provider.fail_next_commits(scenario.faults.fail_commits);
    env.provider.fail_next_rollbacks(scenario.faults.fail_rollbacks);

    let runner = Runner {
        env: &env,
        trace: Mutex::new(Vec::new()),
    };
    let ctx = CallContext::new();
    let result = runner.run_step(&root, &ctx, 0);

    let journal = env.provider.journal();
    let report = SimulationReport {
        name: scenario.name.clone(),
        succeeded: result.is_ok(),
        error: result.err().map(|e: TxError| e.details().into_iter().collect()),
        trace: runner.trace.into_inner(),
        journal: journal.events(),
        committed: env.provider.committed(),
        leaked_entries: ctx.depth(),
        lifecycle_error: journal.verify_lifecycles().err(),
    };
    info!(
        succeeded = report.succeeded,
        scopes = journal.opens(),
        commits = journal.commits(),
        rollbacks = journal.rollbacks(),
        "simulation finished"
    );
    Ok(report)
}

/// Runs the simulate command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = ScenarioFile::load(path)?;
    let report = simulate(&scenario)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }

    if let Some(problem) = &report.lifecycle_error {
        return Err(format!("Scope lifecycle violated: {problem}").into());
    }
    if report.leaked_entries > 0 {
        return Err(format!("{} stack entries leaked", report.leaked_entries).into());
    }
    Ok(())
}

fn print_text_output(report: &SimulationReport) {
    println!("Scenario: {}", report.name.as_deref().unwrap_or("(unnamed)"));
    println!("==========");
    println!();
    println!("Trace:");
    for entry in &report.trace {
        match entry {
            Trace::Entered {
                step,
                level,
                attempt,
                scope,
                owns_scope,
            } => {
                let scope = match (scope, owns_scope) {
                    (Some(id), true) => format!("opened scope {id}"),
                    (Some(id), false) => format!("joined scope {id}"),
                    (None, _) => "no scope".to_string(),
                };
                println!(
                    "  {:indent$}> {} (attempt {}, {})",
                    "",
                    step,
                    attempt,
                    scope,
                    indent = level * 2
                );
            }
            Trace::Returned {
                step,
                level,
                code,
                error,
            } => match (code, error) {
                (Some(code), Some(error)) => println!(
                    "  {:indent$}< {} failed [{}]: {}",
                    "",
                    step,
                    code,
                    error,
                    indent = level * 2
                ),
                _ => println!("  {:indent$}< {} ok", "", step, indent = level * 2),
            },
        }
    }

    println!();
    println!("Journal:");
    for event in &report.journal {
        match event {
            Event::Opened {
                scope,
                read_only,
                isolation,
            } => println!(
                "  open      #{scope} read_only={read_only} isolation={}",
                isolation.as_deref().unwrap_or("-")
            ),
            Event::Committed { scope } => println!("  commit    #{scope}"),
            Event::RolledBack { scope } => println!("  rollback  #{scope}"),
            Event::Closed { scope } => println!("  close     #{scope}"),
            Event::Injected { operation } => println!("  injected  {operation} failure"),
        }
    }

    println!();
    println!("Committed:");
    if report.committed.is_empty() {
        println!("  (nothing)");
    }
    for (key, value) in &report.committed {
        println!("  {key} = {value}");
    }

    println!();
    match &report.error {
        None => println!("✓ Call succeeded"),
        Some(details) => {
            println!("✗ Call failed");
            for (key, value) in details {
                println!("  {key}: {value}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenario(value: serde_json::Value) -> ScenarioFile {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn requires_new_survives_outer_rollback() {
        let report = simulate(&scenario(json!({
            "name": "audit survives",
            "root": {
                "name": "checkout",
                "writes": {"order": "pending"},
                "fail": {"class": "payment"},
                "steps": [
                    {
                        "name": "audit",
                        "options": {"propagation": "REQUIRES_NEW"},
                        "writes": {"audit": "attempted"}
                    }
                ]
            }
        })))
        .unwrap();

        assert!(!report.succeeded);
        assert_eq!(report.committed.get("audit").map(String::as_str), Some("attempted"));
        assert!(!report.committed.contains_key("order"));
        assert_eq!(report.leaked_entries, 0);
        assert!(report.lifecycle_error.is_none());
        let error = report.error.unwrap();
        assert_eq!(error["code"], "TRANSACTION_FAILED");
        assert_eq!(error["failure_class"], "payment");
    }

    #[test]
    fn joined_step_writes_into_outer_scope() {
        let report = simulate(&scenario(json!({
            "root": {
                "name": "outer",
                "steps": [
                    {"name": "inner", "options": {"propagation": "MANDATORY"}, "writes": {"k": "v"}}
                ]
            }
        })))
        .unwrap();

        assert!(report.succeeded);
        assert_eq!(report.committed.get("k").map(String::as_str), Some("v"));
        let scopes: Vec<_> = report
            .trace
            .iter()
            .filter_map(|t| match t {
                Trace::Entered { scope, .. } => *scope,
                Trace::Returned { .. } => None,
            })
            .collect();
        assert_eq!(scopes, vec![1, 1]);
    }

    #[test]
    fn tolerated_violation_lets_outer_commit() {
        let report = simulate(&scenario(json!({
            "root": {
                "name": "outer",
                "writes": {"k": "v"},
                "steps": [
                    {"name": "forbidden", "options": {"propagation": "NEVER"}, "tolerate_failure": true}
                ]
            }
        })))
        .unwrap();

        assert!(report.succeeded);
        assert!(report.trace.iter().any(|t| matches!(
            t,
            Trace::Returned { code: Some("PROPAGATION_VIOLATION"), .. }
        )));
        assert_eq!(report.committed.len(), 1);
    }

    #[test]
    fn retries_recover_from_commit_faults() {
        let report = simulate(&scenario(json!({
            "faults": {"fail_commits": 1},
            "root": {
                "name": "save",
                "options": {"retry_count": 2, "retry_backoff_ms": 1},
                "writes": {"k": "v"}
            }
        })))
        .unwrap();

        assert!(report.succeeded);
        let attempts = report
            .trace
            .iter()
            .filter(|t| matches!(t, Trace::Entered { .. }))
            .count();
        assert_eq!(attempts, 2);
        assert!(report
            .journal
            .contains(&Event::Injected { operation: "commit" }));
    }

    #[test]
    fn invalid_step_is_reported_before_running() {
        let result = simulate(&scenario(json!({
            "root": {"name": "bad", "options": {"retry_count": -1}}
        })));
        assert!(result.is_err());
    }

    #[test]
    fn bundled_checkout_scenario_recovers() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/checkout.json");
        let report = simulate(&ScenarioFile::load(&path).unwrap()).unwrap();

        assert!(report.succeeded);
        assert_eq!(report.committed.len(), 3);
        assert_eq!(report.leaked_entries, 0);
        assert!(report.lifecycle_error.is_none());
        let checkout_attempts = report
            .trace
            .iter()
            .filter(|t| matches!(t, Trace::Entered { level: 0, .. }))
            .count();
        assert_eq!(checkout_attempts, 2);
    }

    #[test]
    fn run_reads_file() {
        let file = txscope_testkit::temp_json(&json!({
            "root": {"name": "only", "writes": {"a": "1"}}
        }));
        assert!(run(file.path(), "json").is_ok());
    }
}

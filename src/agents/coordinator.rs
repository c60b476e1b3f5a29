//! Agent Coordinator
//!
//! Runs every registered agent against the same read-only fingerprint and merges their
//! reports into one deterministic report.
//!
//! ## Isolation
//!
//! Agents run on scoped threads. A panic, an error, a report that fails validation or a
//! report carrying another agent's name counts as a failure of that agent only. The merge
//! re-sorts everything, so completion order never shows in the output.

use std::thread;

use tracing::{debug, error, info, warn};

use super::Agent;
use super::types::{AgentReport, EXECUTION_STATUS_KEY, ExecutionStatus, Severity};
use crate::constants::schema::COORDINATOR_NAME;
use crate::fingerprint::{Metadata, MetadataValue, RepositoryFingerprint};
use crate::types::{Result, ScrError};

pub struct AgentCoordinator {
    agents: Vec<Box<dyn Agent>>,
}

impl AgentCoordinator {
    pub fn new(agents: Vec<Box<dyn Agent>>) -> Result<Self> {
        if agents.is_empty() {
            return Err(ScrError::agent("AgentCoordinator requires at least one agent"));
        }
        Ok(Self { agents })
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub fn review(&self, fingerprint: &RepositoryFingerprint) -> Result<AgentReport> {
        info!("Coordinator: running {} agents", self.agents.len());

        let outcomes: Vec<(&str, Result<AgentReport>)> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .agents
                .iter()
                .map(|agent| {
                    let agent = agent.as_ref();
                    (agent.name(), scope.spawn(move || agent.analyze(fingerprint)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(name, handle)| {
                    let outcome = handle
                        .join()
                        .unwrap_or_else(|_| Err(ScrError::agent(format!("Agent {} panicked", name))));
                    (name, outcome)
                })
                .collect()
        });

        let mut reports = Vec::new();
        let mut failed = Vec::new();
        for (name, outcome) in outcomes {
            match outcome.and_then(|report| check_report(name, report)) {
                Ok(report) => {
                    debug!(
                        "Coordinator: agent {} completed: {} findings, {} patches",
                        name,
                        report.findings.len(),
                        report.patch_suggestions.len()
                    );
                    reports.push(report);
                }
                Err(e) => {
                    error!("Coordinator: agent {} failed: {}", name, e);
                    failed.push(name.to_string());
                }
            }
        }
        failed.sort();

        if reports.is_empty() {
            warn!("Coordinator: no agents completed successfully");
            return self.failed_report(failed);
        }

        self.merge(reports, failed)
    }

    fn failed_report(&self, failed: Vec<String>) -> Result<AgentReport> {
        let mut metadata = Metadata::new();
        metadata.insert("agents_run".into(), 0i64.into());
        metadata.insert("agents_total".into(), (self.agents.len() as i64).into());
        metadata.insert("agents_failed".into(), (failed.len() as i64).into());
        metadata.insert("failed_agent_names".into(), name_list(failed));
        metadata.insert(
            EXECUTION_STATUS_KEY.into(),
            ExecutionStatus::Failed.as_str().into(),
        );

        AgentReport::new(
            COORDINATOR_NAME,
            Vec::new(),
            Vec::new(),
            Some("No agents completed successfully.".to_string()),
            metadata,
        )
    }

    fn merge(&self, reports: Vec<AgentReport>, failed: Vec<String>) -> Result<AgentReport> {
        let agents_run = reports.len();
        let mut agent_names: Vec<String> = reports.iter().map(|r| r.agent_name.clone()).collect();
        agent_names.sort();

        let (findings, patches): (Vec<_>, Vec<_>) = reports
            .into_iter()
            .map(|r| (r.findings, r.patch_suggestions))
            .unzip();

        let status = if failed.is_empty() {
            ExecutionStatus::Complete
        } else {
            ExecutionStatus::Partial
        };

        let mut metadata = Metadata::new();
        metadata.insert("agents_run".into(), (agents_run as i64).into());
        metadata.insert("agents_total".into(), (self.agents.len() as i64).into());
        metadata.insert("agent_names".into(), name_list(agent_names));
        metadata.insert(EXECUTION_STATUS_KEY.into(), status.as_str().into());
        if !failed.is_empty() {
            metadata.insert("agents_failed".into(), (failed.len() as i64).into());
            metadata.insert("failed_agent_names".into(), name_list(failed));
        }

        let merged = AgentReport::new(
            COORDINATOR_NAME,
            findings.into_iter().flatten(),
            patches.into_iter().flatten(),
            None,
            metadata,
        )?;
        info!(
            "Coordinator: merged {} findings from {} agents ({})",
            merged.findings.len(),
            agents_run,
            status
        );

        Ok(AgentReport {
            summary: Some(summarize(&merged, agents_run)),
            ..merged
        })
    }
}

/// An agent's report only counts when it validates and carries the agent's own name.
fn check_report(name: &str, report: AgentReport) -> Result<AgentReport> {
    if report.agent_name != name {
        return Err(ScrError::agent(format!(
            "Agent {} returned a report for {}",
            name, report.agent_name
        )));
    }
    report.validate()?;
    Ok(report)
}

fn name_list(names: Vec<String>) -> MetadataValue {
    MetadataValue::List(names.into_iter().map(MetadataValue::from).collect())
}

fn summarize(report: &AgentReport, agents_run: usize) -> String {
    let counts = report.count_by_severity();
    let count = |s: Severity| counts.get(&s).copied().unwrap_or(0);

    let mut summary = format!(
        "Coordinated review by {} agent(s): Total findings: {} Severity breakdown: {} critical, {} high, {} medium, {} low, {} info",
        agents_run,
        report.findings.len(),
        count(Severity::Critical),
        count(Severity::High),
        count(Severity::Medium),
        count(Severity::Low),
        count(Severity::Info),
    );
    if !report.patch_suggestions.is_empty() {
        summary.push_str(&format!(
            " Patch suggestions: {}",
            report.patch_suggestions.len()
        ));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::AgentFinding;
    use crate::agents::{CodeAnalyst, PatchAdvisor, SecurityReviewer};
    use crate::fingerprint::{ClassDetails, CodeArtifact, FileDetails, FunctionDetails, RiskSignal};

    struct Fixed {
        name: &'static str,
        findings: Vec<(Severity, &'static str)>,
    }

    impl Agent for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn analyze(&self, _: &RepositoryFingerprint) -> Result<AgentReport> {
            let findings = self
                .findings
                .iter()
                .map(|(severity, title)| AgentFinding::new(self.name, *severity, *title, "d"))
                .collect::<Result<Vec<_>>>()?;
            AgentReport::new(self.name, findings, Vec::new(), None, Metadata::new())
        }
    }

    struct Failing;

    impl Agent for Failing {
        fn name(&self) -> &str {
            "Failing"
        }

        fn analyze(&self, _: &RepositoryFingerprint) -> Result<AgentReport> {
            Err(ScrError::agent("boom"))
        }
    }

    struct Panicking;

    impl Agent for Panicking {
        fn name(&self) -> &str {
            "Panicking"
        }

        fn analyze(&self, _: &RepositoryFingerprint) -> Result<AgentReport> {
            panic!("agent crashed")
        }
    }

    struct Impostor;

    impl Agent for Impostor {
        fn name(&self) -> &str {
            "Impostor"
        }

        fn analyze(&self, _: &RepositoryFingerprint) -> Result<AgentReport> {
            AgentReport::new("SomeoneElse", Vec::new(), Vec::new(), None, Metadata::new())
        }
    }

    struct Unrepresentable;

    impl Agent for Unrepresentable {
        fn name(&self) -> &str {
            "Unrepresentable"
        }

        fn analyze(&self, _: &RepositoryFingerprint) -> Result<AgentReport> {
            let finding = AgentFinding::new(self.name(), Severity::High, "nan", "d")?
                .with_metadata("ratio", f64::NAN);
            Ok(AgentReport {
                agent_name: self.name().to_string(),
                findings: vec![finding],
                patch_suggestions: Vec::new(),
                summary: None,
                metadata: Metadata::new(),
            })
        }
    }

    fn empty_fingerprint() -> RepositoryFingerprint {
        RepositoryFingerprint::assemble("/repo", Vec::new(), Vec::new()).unwrap()
    }

    fn fixed(name: &'static str, findings: Vec<(Severity, &'static str)>) -> Box<dyn Agent> {
        Box::new(Fixed { name, findings })
    }

    fn names(value: Option<&MetadataValue>) -> Vec<String> {
        match value {
            Some(MetadataValue::List(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_requires_agents() {
        let err = AgentCoordinator::new(Vec::new()).err().unwrap();
        assert!(err.to_string().contains("AgentCoordinator requires at least one agent"));
    }

    #[test]
    fn test_merge_complete() {
        let coordinator = AgentCoordinator::new(vec![
            fixed("A", vec![(Severity::Low, "low"), (Severity::Critical, "crit")]),
            fixed("B", vec![(Severity::High, "high"), (Severity::Info, "info")]),
        ])
        .unwrap();
        let report = coordinator.review(&empty_fingerprint()).unwrap();

        assert_eq!(report.agent_name, "Coordinator");
        let severities: Vec<Severity> = report.findings.iter().map(|f| f.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::High, Severity::Low, Severity::Info]
        );
        assert_eq!(report.execution_status().unwrap(), ExecutionStatus::Complete);
        assert_eq!(names(report.metadata.get("agent_names")), vec!["A", "B"]);
        assert!(!report.metadata.contains_key("agents_failed"));
        assert_eq!(
            report.summary.as_deref(),
            Some(
                "Coordinated review by 2 agent(s): Total findings: 4 Severity breakdown: 1 critical, 1 high, 0 medium, 1 low, 1 info"
            )
        );
    }

    #[test]
    fn test_failures_are_isolated() {
        let coordinator = AgentCoordinator::new(vec![
            Box::new(Panicking),
            fixed("Good", vec![(Severity::Medium, "m")]),
            Box::new(Failing),
            Box::new(Impostor),
        ])
        .unwrap();
        let report = coordinator.review(&empty_fingerprint()).unwrap();

        assert_eq!(report.execution_status().unwrap(), ExecutionStatus::Partial);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.metadata.get("agents_run"), Some(&MetadataValue::Int(1)));
        assert_eq!(report.metadata.get("agents_total"), Some(&MetadataValue::Int(4)));
        assert_eq!(report.metadata.get("agents_failed"), Some(&MetadataValue::Int(3)));
        assert_eq!(
            names(report.metadata.get("failed_agent_names")),
            vec!["Failing", "Impostor", "Panicking"]
        );
    }

    #[test]
    fn test_all_agents_fail() {
        let coordinator =
            AgentCoordinator::new(vec![Box::new(Failing), Box::new(Panicking)]).unwrap();
        let report = coordinator.review(&empty_fingerprint()).unwrap();

        assert_eq!(report.execution_status().unwrap(), ExecutionStatus::Failed);
        assert!(report.findings.is_empty());
        assert_eq!(report.summary.as_deref(), Some("No agents completed successfully."));
        assert_eq!(report.metadata.get("agents_run"), Some(&MetadataValue::Int(0)));
        assert_eq!(report.metadata.get("agents_failed"), Some(&MetadataValue::Int(2)));

        let record = report.to_record().unwrap();
        assert!(record.proof_obligations.findings_invalid_if_failed);
        assert!(record.proof_obligations.empty_findings_means_failure_not_success);
    }

    #[test]
    fn test_duplicate_findings_merge_once() {
        let coordinator = AgentCoordinator::new(vec![
            fixed("A", vec![(Severity::High, "same")]),
            fixed("A", vec![(Severity::High, "same")]),
        ])
        .unwrap();
        let report = coordinator.review(&empty_fingerprint()).unwrap();
        assert_eq!(report.findings.len(), 1);
    }

    #[test]
    fn test_unrepresentable_report_fails_only_its_agent() {
        let coordinator = AgentCoordinator::new(vec![
            fixed("A", vec![(Severity::Low, "kept")]),
            Box::new(Unrepresentable),
        ])
        .unwrap();
        let report = coordinator.review(&empty_fingerprint()).unwrap();

        assert_eq!(report.execution_status().unwrap(), ExecutionStatus::Partial);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].title, "kept");
        assert_eq!(
            names(report.metadata.get("failed_agent_names")),
            vec!["Unrepresentable"]
        );
    }

    #[test]
    fn test_full_review_scenario() {
        let file = CodeArtifact::file(
            "app.py",
            1,
            200,
            FileDetails {
                language: "python".into(),
                line_count: 200,
                byte_size: 4096,
            },
        )
        .unwrap()
        .with_risk_signals([RiskSignal::DynamicCodeExecution]);
        let class = CodeArtifact::class(
            "app.py",
            "Everything",
            10,
            150,
            ClassDetails {
                methods: (0..21).map(|i| format!("m{}", i)).collect(),
                base_classes: Default::default(),
            },
        )
        .unwrap();
        let function = CodeArtifact::function(
            "app.py",
            "configure",
            160,
            170,
            FunctionDetails {
                parameters: (0..26).map(|i| format!("p{:02}", i)).collect(),
                ..Default::default()
            },
        )
        .unwrap();
        let fingerprint =
            RepositoryFingerprint::assemble("/repo", vec![file, class, function], Vec::new())
                .unwrap();

        let coordinator = AgentCoordinator::new(vec![
            Box::new(CodeAnalyst::new()),
            Box::new(SecurityReviewer::new()),
            Box::new(PatchAdvisor::new()),
        ])
        .unwrap();
        let report = coordinator.review(&fingerprint).unwrap();

        assert_eq!(report.execution_status().unwrap(), ExecutionStatus::Complete);
        let titles: Vec<&str> = report.findings.iter().map(|f| f.title.as_str()).collect();
        assert!(titles.contains(&"Large class: Everything"));
        assert!(titles.contains(&"Function with many parameters: configure"));
        assert!(titles.contains(&"Security risk: dynamic_code_execution"));
        assert!(titles.contains(&"Suggested patch for dynamic code execution"));
        assert_eq!(report.findings[0].severity, Severity::Critical);
        assert_eq!(report.patch_suggestions.len(), 2);
        assert!(report.summary.unwrap().ends_with("Patch suggestions: 2"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn merge_is_independent_of_agent_order(order in Just(vec![0usize, 1, 2, 3]).prop_shuffle()) {
                let build = |i: usize| -> Box<dyn Agent> {
                    match i {
                        0 => fixed("A", vec![(Severity::High, "x"), (Severity::Low, "y")]),
                        1 => fixed("B", vec![(Severity::High, "x"), (Severity::Critical, "z")]),
                        2 => fixed("C", vec![(Severity::Info, "w")]),
                        _ => Box::new(Failing),
                    }
                };
                let baseline = AgentCoordinator::new((0..4).map(build).collect())
                    .unwrap()
                    .review(&empty_fingerprint())
                    .unwrap();
                let shuffled = AgentCoordinator::new(order.into_iter().map(build).collect())
                    .unwrap()
                    .review(&empty_fingerprint())
                    .unwrap();
                prop_assert_eq!(baseline, shuffled);
            }
        }
    }
}

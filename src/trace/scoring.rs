//! Risk Scoring
//!
//! Pure function of the event list, exit code, execution time and sandbox policy.
//!
//! | Factor | Condition | Points |
//! |--------|-----------|--------|
//! | `unauthorized_file_operations` | writes/deletes while file writes are disallowed | `min(5n, 30)` |
//! | `unauthorized_network_access` | network events while network is disallowed | `min(10n, 40)` |
//! | `process_execution` | any process spawn | `min(15n, 50)` |
//! | `non_zero_exit` | exit code != 0 | 10 |
//! | `timeout` | a timeout event was recorded | 20 |
//! | `near_timeout` | execution time > 90% of the timeout | 5 |
//!
//! The total is clamped to [`MAX_RISK_SCORE`].

use std::collections::BTreeMap;

use super::types::{RiskScore, TraceEvent, TraceEventType};
use crate::constants::tracer::{MAX_RISK_SCORE, NEAR_TIMEOUT_RATIO};
use crate::types::Result;

/// Sandbox policy the score is judged against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub allow_network: bool,
    pub allow_file_write: bool,
    pub timeout_secs: f64,
}

pub fn score(
    events: &[TraceEvent],
    exit_code: i32,
    execution_time: f64,
    policy: &ScoringPolicy,
) -> Result<RiskScore> {
    let count = |pred: fn(&TraceEvent) -> bool| events.iter().filter(|e| pred(e)).count() as f64;
    let mut factors = BTreeMap::new();

    let file_operations = count(|e| e.event_type.is_file_mutation());
    if file_operations > 0.0 && !policy.allow_file_write {
        factors.insert(
            "unauthorized_file_operations".to_string(),
            (file_operations * 5.0).min(30.0),
        );
    }

    let network_events = count(|e| e.event_type.is_network());
    if network_events > 0.0 && !policy.allow_network {
        factors.insert(
            "unauthorized_network_access".to_string(),
            (network_events * 10.0).min(40.0),
        );
    }

    let spawns = count(|e| e.event_type == TraceEventType::ProcessSpawn);
    if spawns > 0.0 {
        factors.insert("process_execution".to_string(), (spawns * 15.0).min(50.0));
    }

    if exit_code != 0 {
        factors.insert("non_zero_exit".to_string(), 10.0);
    }

    if events.iter().any(TraceEvent::is_timeout) {
        factors.insert("timeout".to_string(), 20.0);
    }

    if execution_time > policy.timeout_secs * NEAR_TIMEOUT_RATIO {
        factors.insert("near_timeout".to_string(), 5.0);
    }

    let total: f64 = factors.values().sum();
    let explanation = explain(&factors);
    RiskScore::new(total.min(MAX_RISK_SCORE), MAX_RISK_SCORE, factors, explanation)
}

fn explain(factors: &BTreeMap<String, f64>) -> String {
    if factors.is_empty() {
        return "No significant risk factors identified.".to_string();
    }
    let mut parts = vec!["Risk factors identified:".to_string()];
    parts.extend(
        factors
            .iter()
            .map(|(name, value)| format!("- {}: {:.1} points", name, value)),
    );
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::types::{ERROR_KEY, TIMEOUT_ERROR};

    const STRICT: ScoringPolicy = ScoringPolicy {
        allow_network: false,
        allow_file_write: false,
        timeout_secs: 30.0,
    };

    fn events(types: &[TraceEventType]) -> Vec<TraceEvent> {
        types
            .iter()
            .enumerate()
            .map(|(i, t)| TraceEvent::new(*t, i as f64).unwrap())
            .collect()
    }

    #[test]
    fn test_clean_run() {
        let risk = score(&[], 0, 0.1, &STRICT).unwrap();
        assert_eq!(risk.score, 0.0);
        assert_eq!(risk.max_score, 100.0);
        assert_eq!(risk.explanation, "No significant risk factors identified.");
    }

    #[test]
    fn test_caps_per_factor() {
        let many_writes = events(&[TraceEventType::FileWrite; 10]);
        let risk = score(&many_writes, 0, 0.1, &STRICT).unwrap();
        assert_eq!(risk.factors["unauthorized_file_operations"], 30.0);

        let spawns = events(&[TraceEventType::ProcessSpawn; 2]);
        let risk = score(&spawns, 0, 0.1, &STRICT).unwrap();
        assert_eq!(risk.factors["process_execution"], 30.0);
    }

    #[test]
    fn test_policy_allows_operations() {
        let observed = events(&[
            TraceEventType::FileDelete,
            TraceEventType::NetworkSend,
            TraceEventType::NetworkConnect,
        ]);
        let strict = score(&observed, 0, 0.1, &STRICT).unwrap();
        assert_eq!(strict.factors["unauthorized_file_operations"], 5.0);
        assert_eq!(strict.factors["unauthorized_network_access"], 20.0);

        let permissive = ScoringPolicy {
            allow_network: true,
            allow_file_write: true,
            ..STRICT
        };
        assert!(score(&observed, 0, 0.1, &permissive).unwrap().factors.is_empty());
    }

    #[test]
    fn test_timeout_factors_and_explanation() {
        let timeout = vec![
            TraceEvent::new(TraceEventType::SystemCall, 1.0)
                .unwrap()
                .with_metadata(ERROR_KEY, TIMEOUT_ERROR),
        ];
        let risk = score(&timeout, -1, 30.2, &STRICT).unwrap();
        assert_eq!(risk.score, 35.0);
        assert_eq!(
            risk.explanation,
            "Risk factors identified: - near_timeout: 5.0 points - non_zero_exit: 10.0 points - timeout: 20.0 points"
        );
    }

    #[test]
    fn test_total_is_clamped() {
        let mut observed = events(&[TraceEventType::FileWrite; 6]);
        observed.extend(events(&[TraceEventType::NetworkConnect; 4]));
        observed.extend(events(&[TraceEventType::ProcessSpawn; 4]));
        observed.push(
            TraceEvent::new(TraceEventType::SystemCall, 9.0)
                .unwrap()
                .with_metadata(ERROR_KEY, TIMEOUT_ERROR),
        );
        let risk = score(&observed, 1, 40.0, &STRICT).unwrap();
        assert_eq!(risk.score, 100.0);
        assert_eq!(risk.normalized(), 1.0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn event_type() -> impl Strategy<Value = TraceEventType> {
            prop::sample::select(TraceEventType::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn score_is_bounded(
                types in prop::collection::vec(event_type(), 0..60),
                exit_code in -5i32..5,
                execution_time in 0.0f64..100.0,
                allow_network: bool,
                allow_file_write: bool,
            ) {
                let policy = ScoringPolicy { allow_network, allow_file_write, timeout_secs: 30.0 };
                let risk = score(&events(&types), exit_code, execution_time, &policy).unwrap();
                prop_assert!(risk.score >= 0.0);
                prop_assert!(risk.score <= risk.max_score);
                prop_assert_eq!(risk.max_score, 100.0);
                prop_assert!((0.0..=1.0).contains(&risk.normalized()));
            }
        }
    }
}

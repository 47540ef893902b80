//! Unit tests for RoundReport serialization

use script_types::{ContextId, RoundOutcome, RoundReport};
use std::time::Duration;

#[test]
fn round_report_serializes_outcome_by_name() {
    let report = RoundReport {
        context: ContextId::next(),
        round: 4,
        outcome: RoundOutcome::Interrupted,
        tasks_run: 0,
        script_errors: 0,
        elapsed: Duration::from_millis(50),
    };

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"], "Interrupted");
    assert_eq!(json["round"], 4);

    let back: RoundReport = serde_json::from_value(json).unwrap();
    assert_eq!(back, report);
}

//! Qualification policies.
//!
//! Two policies coexist deliberately: signals carrying an explicit side use a
//! plain score threshold; side-less signals run a long/short edge competition
//! where a direction must beat the other by a margin before qualifying.

use tradeloop_core::api::Evaluation;
use tradeloop_core::types::Side;

#[derive(Debug, Clone)]
pub struct QualifyConfig {
    /// Minimum score for qualification under either policy.
    pub threshold: f64,
    /// Minimum winner-minus-loser gap for the edge competition gate.
    pub edge_margin: f64,
}

impl Default for QualifyConfig {
    fn default() -> Self {
        Self {
            threshold: 7.0,
            edge_margin: 1.5,
        }
    }
}

/// Outcome of applying a qualification policy to an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Qualification {
    /// Direction the policy settled on.
    pub side: Side,
    pub score: f64,
    pub grade: String,
    pub summary: String,
    pub qualified: bool,
    /// Which named policy decided ("threshold" or "edge_competition").
    pub policy: &'static str,
}

/// Apply the policy selected by the presence of an explicit side.
pub fn qualify(
    explicit_side: Option<Side>,
    evaluation: &Evaluation,
    config: &QualifyConfig,
) -> Qualification {
    match explicit_side {
        Some(side) => threshold_policy(side, evaluation, config),
        None => edge_competition_policy(evaluation, config),
    }
}

fn threshold_policy(side: Side, evaluation: &Evaluation, config: &QualifyConfig) -> Qualification {
    let eval = evaluation.side(side);
    Qualification {
        side,
        score: eval.score,
        grade: eval.grade.clone(),
        summary: eval.summary.clone(),
        qualified: eval.score >= config.threshold,
        policy: "threshold",
    }
}

fn edge_competition_policy(evaluation: &Evaluation, config: &QualifyConfig) -> Qualification {
    let (winner_side, winner, loser) = if evaluation.long.score >= evaluation.short.score {
        (Side::Long, &evaluation.long, &evaluation.short)
    } else {
        (Side::Short, &evaluation.short, &evaluation.long)
    };
    let edge = winner.score - loser.score;
    Qualification {
        side: winner_side,
        score: winner.score,
        grade: winner.grade.clone(),
        summary: winner.summary.clone(),
        qualified: winner.score >= config.threshold && edge >= config.edge_margin,
        policy: "edge_competition",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeloop_core::api::SideEval;

    fn eval(long: f64, short: f64) -> Evaluation {
        Evaluation {
            long: SideEval {
                score: long,
                grade: "B".to_string(),
                summary: "long case".to_string(),
            },
            short: SideEval {
                score: short,
                grade: "C".to_string(),
                summary: "short case".to_string(),
            },
            qualified: None,
        }
    }

    #[test]
    fn explicit_side_uses_threshold_only() {
        let config = QualifyConfig::default();

        let q = qualify(Some(Side::Long), &eval(8.2, 8.0), &config);
        assert_eq!(q.policy, "threshold");
        assert!(q.qualified);
        assert_eq!(q.side, Side::Long);

        // The near-equal short score is irrelevant under the threshold policy.
        let q = qualify(Some(Side::Short), &eval(8.2, 8.0), &config);
        assert!(q.qualified);
        assert_eq!(q.side, Side::Short);

        let q = qualify(Some(Side::Long), &eval(6.9, 1.0), &config);
        assert!(!q.qualified);
    }

    #[test]
    fn edge_competition_requires_margin_and_threshold() {
        let config = QualifyConfig {
            threshold: 7.0,
            edge_margin: 1.5,
        };

        // Clear long edge.
        let q = qualify(None, &eval(8.5, 4.0), &config);
        assert_eq!(q.policy, "edge_competition");
        assert_eq!(q.side, Side::Long);
        assert!(q.qualified);

        // Winner above threshold but edge too small.
        let q = qualify(None, &eval(8.5, 7.8), &config);
        assert!(!q.qualified);

        // Edge large enough but winner below threshold.
        let q = qualify(None, &eval(6.0, 1.0), &config);
        assert!(!q.qualified);

        // Short can win the competition.
        let q = qualify(None, &eval(2.0, 9.0), &config);
        assert_eq!(q.side, Side::Short);
        assert!(q.qualified);
    }

    #[test]
    fn mirrored_evaluation_never_qualifies_on_edge() {
        // The lenient decoder mirrors one-sided output into both directions;
        // zero edge must not pass the competition gate.
        let config = QualifyConfig::default();
        let q = qualify(None, &eval(9.0, 9.0), &config);
        assert!(!q.qualified);
    }
}

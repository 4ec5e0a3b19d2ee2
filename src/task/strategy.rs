use crate::error::{ErrorKind, ForgeError, ForgeResult};
use crate::task::analyzer::ComplexityAnalysis;
use serde::{Deserialize, Serialize};
use std::fmt;

const REUSE_COMPLEXITY: u8 = 70;
const REUSE_MATCH: u8 = 70;
const HYBRID_COMPLEXITY: u8 = 50;
const HYBRID_MATCH: u8 = 40;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    ReuseExisting,
    CreateNew,
    Hybrid,
}

impl StrategyKind {
    /// Capability match an existing worker needs before this strategy may reuse it
    pub fn min_match(&self) -> Option<u8> {
        match self {
            StrategyKind::ReuseExisting => Some(REUSE_MATCH),
            StrategyKind::Hybrid => Some(HYBRID_MATCH),
            StrategyKind::CreateNew => None,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StrategyKind::ReuseExisting => "reuse-existing",
            StrategyKind::CreateNew => "create-new",
            StrategyKind::Hybrid => "hybrid",
        };
        f.write_str(label)
    }
}

/// Chosen way of obtaining a worker, with fallbacks tried in order
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AssignmentStrategy {
    pub kind: StrategyKind,
    pub reason: String,
    /// Percentage, 0-100
    pub confidence: u8,
    pub fallback: Option<Box<AssignmentStrategy>>,
}

impl AssignmentStrategy {
    fn create_new(reason: impl Into<String>, confidence: u8) -> Self {
        Self {
            kind: StrategyKind::CreateNew,
            reason: reason.into(),
            confidence,
            fallback: None,
        }
    }

    fn hybrid(reason: impl Into<String>, confidence: u8) -> Self {
        Self {
            kind: StrategyKind::Hybrid,
            reason: reason.into(),
            confidence,
            fallback: Some(Box::new(Self::create_new("no reusable worker was available", 60))),
        }
    }

    /// This strategy followed by each fallback
    pub fn chain(&self) -> impl Iterator<Item = &AssignmentStrategy> {
        std::iter::successors(Some(self), |strategy| strategy.fallback.as_deref())
    }
}

/// Pick a strategy from the analysis and the best template's capability overlap
pub fn select_strategy(analysis: &ComplexityAnalysis, match_score: u8) -> ForgeResult<AssignmentStrategy> {
    if match_score > 100 {
        return Err(ForgeError::analysis(
            ErrorKind::StrategyDetermination,
            &analysis.task_id,
            format!("template match score {} is outside 0-100", match_score),
        ));
    }

    let complexity = analysis.score;

    let strategy = if complexity >= REUSE_COMPLEXITY && match_score >= REUSE_MATCH {
        let bonus = ((match_score - REUSE_MATCH) / 3).min(10);
        AssignmentStrategy {
            kind: StrategyKind::ReuseExisting,
            reason: format!(
                "complexity {} with template match {} warrants a warmed-up worker",
                complexity, match_score
            ),
            confidence: 85 + bonus,
            fallback: Some(Box::new(AssignmentStrategy::hybrid(
                "reuse candidate unavailable, retrying as hybrid",
                70,
            ))),
        }
    } else if complexity >= HYBRID_COMPLEXITY && match_score >= HYBRID_MATCH {
        let bonus = ((match_score - HYBRID_MATCH) / 6).min(10);
        AssignmentStrategy::hybrid(
            format!(
                "complexity {} with partial template match {}: reuse if possible",
                complexity, match_score
            ),
            70 + bonus,
        )
    } else {
        let bonus = (HYBRID_MATCH.saturating_sub(match_score) / 4).min(10);
        AssignmentStrategy::create_new(
            format!(
                "complexity {} with template match {} does not justify reuse",
                complexity, match_score
            ),
            60 + bonus,
        )
    };

    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::analyzer::ComplexityCategory;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn analysis_with_score(score: u8) -> ComplexityAnalysis {
        ComplexityAnalysis {
            task_id: "task-1".to_string(),
            score,
            category: ComplexityCategory::from_score(score),
            capabilities: BTreeSet::new(),
            recommended_tools: BTreeSet::new(),
            estimated_effort_hours: 1.0,
            risk_factors: Vec::new(),
            system_dependencies: Vec::new(),
            analyzed_at: Utc::now(),
        }
    }

    #[test]
    fn test_thresholds() {
        let reuse = select_strategy(&analysis_with_score(70), 70).unwrap();
        assert_eq!(reuse.kind, StrategyKind::ReuseExisting);

        let hybrid = select_strategy(&analysis_with_score(69), 100).unwrap();
        assert_eq!(hybrid.kind, StrategyKind::Hybrid);

        let hybrid = select_strategy(&analysis_with_score(90), 40).unwrap();
        assert_eq!(hybrid.kind, StrategyKind::Hybrid);

        let create = select_strategy(&analysis_with_score(49), 100).unwrap();
        assert_eq!(create.kind, StrategyKind::CreateNew);

        let create = select_strategy(&analysis_with_score(90), 39).unwrap();
        assert_eq!(create.kind, StrategyKind::CreateNew);
    }

    #[test]
    fn test_fallback_chains() {
        let reuse = select_strategy(&analysis_with_score(90), 100).unwrap();
        let kinds: Vec<_> = reuse.chain().map(|strategy| strategy.kind).collect();
        assert_eq!(
            kinds,
            vec![StrategyKind::ReuseExisting, StrategyKind::Hybrid, StrategyKind::CreateNew]
        );

        let create = select_strategy(&analysis_with_score(10), 0).unwrap();
        assert_eq!(create.chain().count(), 1);
    }

    #[test]
    fn test_confidence_bases() {
        assert_eq!(select_strategy(&analysis_with_score(70), 70).unwrap().confidence, 85);
        assert_eq!(select_strategy(&analysis_with_score(100), 100).unwrap().confidence, 95);
        assert_eq!(select_strategy(&analysis_with_score(50), 40).unwrap().confidence, 70);
        assert_eq!(select_strategy(&analysis_with_score(20), 40).unwrap().confidence, 60);
        assert_eq!(select_strategy(&analysis_with_score(20), 0).unwrap().confidence, 70);
    }

    #[test]
    fn test_out_of_range_match_score() {
        let error = select_strategy(&analysis_with_score(50), 101).unwrap_err();
        assert_eq!(error.kind, ErrorKind::StrategyDetermination);
        assert!(error.is_recoverable());
    }
}

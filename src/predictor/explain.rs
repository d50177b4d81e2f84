//! Rule-based prediction explanations
//!
//! Every rule whose condition holds contributes one factor. The result always
//! carries at least one protective factor and at most `MAX_FACTORS` entries,
//! highest impact first.

use crate::types::{Factor, FactorKind, PredictionFeatures, Severity};

/// Explanations are truncated to this many factors
pub const MAX_FACTORS: usize = 5;

/// Condition over the features and the factor it produces
pub struct ExplanationRule {
    pub label: &'static str,
    pub kind: FactorKind,
    pub applies: fn(&PredictionFeatures) -> bool,
    pub impact: fn(&PredictionFeatures) -> u8,
}

pub const EXPLANATION_RULES: &[ExplanationRule] = &[
    ExplanationRule {
        label: "Late-night hours",
        kind: FactorKind::Risk,
        applies: |f| f.is_late_night,
        impact: |_| 35,
    },
    ExplanationRule {
        label: "High screen activity",
        kind: FactorKind::Risk,
        applies: |f| f.screen_unlocks_last_hour > 10,
        impact: |f| scaled(20, f.screen_unlocks_last_hour.saturating_sub(10), 2),
    },
    ExplanationRule {
        label: "Elevated stress",
        kind: FactorKind::Risk,
        applies: |f| f.stress_level >= 6,
        impact: |f| scaled(0, f.stress_level as u32, 6),
    },
    ExplanationRule {
        label: "Elevated loneliness",
        kind: FactorKind::Risk,
        applies: |f| f.loneliness_level >= 6,
        impact: |f| scaled(0, f.loneliness_level as u32, 5),
    },
    ExplanationRule {
        label: "Evening routine missed",
        kind: FactorKind::Risk,
        applies: |f| f.hour >= 20 && !f.evening_routine_done,
        impact: |_| 20,
    },
    ExplanationRule {
        label: "Evening routine completed",
        kind: FactorKind::Protective,
        applies: |f| f.evening_routine_done,
        impact: |_| 25,
    },
    ExplanationRule {
        label: "Refractory period after recent urge",
        kind: FactorKind::Protective,
        applies: |f| f.is_recent_urge,
        impact: |_| 30,
    },
];

fn scaled(base: u32, value: u32, per_unit: u32) -> u8 {
    base.saturating_add(value.saturating_mul(per_unit)).min(100) as u8
}

/// Severity follows impact: high from 40, medium from 20
pub fn severity_for(impact: u8) -> Severity {
    if impact >= 40 {
        Severity::High
    } else if impact >= 20 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn factor(label: &str, impact: u8, kind: FactorKind) -> Factor {
    Factor {
        label: label.to_string(),
        impact,
        severity: severity_for(impact),
        kind,
    }
}

/// Explain a prediction with the built-in rule table
pub fn explain(features: &PredictionFeatures) -> Vec<Factor> {
    explain_with(EXPLANATION_RULES, features)
}

/// Evaluate `rules`, then balance, rank, and truncate.
pub fn explain_with(rules: &[ExplanationRule], features: &PredictionFeatures) -> Vec<Factor> {
    let mut factors: Vec<Factor> = rules
        .iter()
        .filter(|rule| (rule.applies)(features))
        .map(|rule| factor(rule.label, (rule.impact)(features), rule.kind))
        .collect();

    if factors.is_empty() {
        return vec![factor("Baseline activity", 10, FactorKind::Risk)];
    }

    if !factors.iter().any(|f| f.kind == FactorKind::Protective) {
        factors.push(if features.is_late_night {
            factor("Monitoring active", 10, FactorKind::Protective)
        } else {
            factor("Daytime hours", 15, FactorKind::Protective)
        });
    }

    // Stable sort keeps rule order among equal impacts
    factors.sort_by(|a, b| b.impact.cmp(&a.impact));

    // Truncation must not drop the only protective factor. It ranked below
    // every kept factor, so appending it leaves the order descending.
    if factors.len() > MAX_FACTORS {
        let protective_in_top = factors[..MAX_FACTORS]
            .iter()
            .any(|f| f.kind == FactorKind::Protective);
        if !protective_in_top {
            if let Some(pos) = factors.iter().position(|f| f.kind == FactorKind::Protective) {
                let protective = factors.remove(pos);
                factors.truncate(MAX_FACTORS - 1);
                factors.push(protective);
                return factors;
            }
        }
        factors.truncate(MAX_FACTORS);
    }

    factors
}

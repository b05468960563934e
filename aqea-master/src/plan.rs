//! Work-plan generation
//!
//! One work unit per alphabet range, in plan order. Unit ids are
//! deterministic (`{source}_{lang}_{idx:02}`) so a master restart recreates
//! the same ids and the idempotent `create_work_units` leaves progress
//! untouched.

use aqea_common::config::LanguagePlan;
use aqea_common::model::WorkUnit;

pub fn build_work_units(plan: &LanguagePlan, source: &str, max_retries: i32) -> Vec<WorkUnit> {
    plan.alphabet_ranges
        .iter()
        .enumerate()
        .map(|(idx, range)| {
            let estimated = (plan.estimated_entries as f64 * range.weight).round() as i64;
            let mut unit = WorkUnit::new(
                format!("{source}_{}_{idx:02}", plan.language_code),
                plan.language_code.clone(),
                source.to_string(),
                range.start.clone(),
                range.end.clone(),
                estimated,
            );
            unit.max_retries = max_retries;
            unit
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqea_common::config::AlphabetRange;

    fn plan() -> LanguagePlan {
        LanguagePlan {
            language_code: "deu".into(),
            estimated_entries: 1000,
            alphabet_ranges: vec![
                AlphabetRange { start: "A".into(), end: "E".into(), weight: 0.3 },
                AlphabetRange { start: "F".into(), end: "M".into(), weight: 0.3 },
                AlphabetRange { start: "N".into(), end: "Z".into(), weight: 0.4 },
            ],
        }
    }

    #[test]
    fn ids_are_deterministic_and_ordered() {
        let units = build_work_units(&plan(), "wiktionary", 3);
        let ids: Vec<&str> = units.iter().map(|u| u.work_id.as_str()).collect();
        assert_eq!(
            ids,
            ["wiktionary_deu_00", "wiktionary_deu_01", "wiktionary_deu_02"]
        );
        // rebuilding yields identical ids
        let again = build_work_units(&plan(), "wiktionary", 3);
        assert_eq!(again[0].work_id, units[0].work_id);
    }

    #[test]
    fn estimates_follow_weights() {
        let units = build_work_units(&plan(), "wiktionary", 3);
        assert_eq!(units[0].estimated_entries, 300);
        assert_eq!(units[2].estimated_entries, 400);
    }

    #[test]
    fn zero_estimate_still_yields_units() {
        let mut p = plan();
        p.estimated_entries = 0;
        let units = build_work_units(&p, "wiktionary", 3);
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| u.estimated_entries == 0));
    }
}

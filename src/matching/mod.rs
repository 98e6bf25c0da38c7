//! Rule matching: which mapping rules does a filename satisfy?
//!
//! Matching is pure, so assets are matched in parallel. Results are sets of
//! rule keys; the order rules are evaluated in never changes the outcome.

mod rule;

pub use rule::{InvalidPatternPolicy, MappingRule, MatchError};

use crate::taxonomy::{AssetId, AssetRecord};
use rayon::prelude::*;
use rule::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// One (asset, rule) pairing where the rule matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub asset_id: AssetId,
    pub rule_key: String,
    pub term_paths: Vec<String>,
}

/// Match one filename against a rule set.
pub fn match_filename(filename: &str, rules: &[MappingRule]) -> Result<BTreeSet<String>, MatchError> {
    let matcher = RuleMatcher::compile(rules, InvalidPatternPolicy::Fail)?;
    Ok(matcher.match_filename(filename))
}

/// Compiled, ordered rule set
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    rules: Vec<(MappingRule, Pattern)>,
    skipped: Vec<String>,
}

impl RuleMatcher {
    /// Compile every rule. Under `Skip`, rules with invalid patterns are
    /// dropped and listed in `skipped()`.
    pub fn compile(rules: &[MappingRule], policy: InvalidPatternPolicy) -> Result<Self, MatchError> {
        let mut compiled = Vec::with_capacity(rules.len());
        let mut skipped = Vec::new();

        for rule in rules {
            match Pattern::compile(rule) {
                Ok(pattern) => compiled.push((rule.clone(), pattern)),
                Err(e) if policy == InvalidPatternPolicy::Skip => {
                    warn!(error = %e, "skipping mapping rule");
                    skipped.push(rule.key.clone());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self {
            rules: compiled,
            skipped,
        })
    }

    /// Keys of every rule the filename satisfies
    pub fn match_filename(&self, filename: &str) -> BTreeSet<String> {
        let lowered = filename.to_lowercase();
        self.rules
            .iter()
            .filter(|(_, pattern)| pattern.is_match(filename, &lowered))
            .map(|(rule, _)| rule.key.clone())
            .collect()
    }

    /// Match results for one asset, in configured rule order
    pub fn match_asset(&self, asset: &AssetRecord) -> Vec<MatchResult> {
        let lowered = asset.filename.to_lowercase();
        let results: Vec<MatchResult> = self
            .rules
            .iter()
            .filter(|(_, pattern)| pattern.is_match(&asset.filename, &lowered))
            .map(|(rule, _)| MatchResult {
                asset_id: asset.id,
                rule_key: rule.key.clone(),
                term_paths: rule.term_paths.clone(),
            })
            .collect();

        if results.is_empty() {
            debug!(asset = %asset.id, filename = %asset.filename, "no rule matched");
        }
        results
    }

    /// Match all assets concurrently. Output keeps asset order.
    pub fn match_assets(&self, assets: &[AssetRecord]) -> Vec<MatchResult> {
        assets
            .par_iter()
            .map(|asset| self.match_asset(asset))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Rules that compiled, in configured order
    pub fn rules(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.iter().map(|(rule, _)| rule)
    }

    /// Keys of rules dropped because their pattern was invalid
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wedding_rules() -> Vec<MappingRule> {
        vec![
            MappingRule::keyword("Formals", "Formals", &["Wedding > Portraits"]),
            MappingRule::keyword("Candids", "Candids", &["Wedding > Preparations"]),
            MappingRule::regex("Numbered", r"_\d{3}\.jpg$", &["Archive"]),
        ]
    }

    #[test]
    fn all_matching_rules_are_kept() {
        let matched = match_filename("Smith_Formals_001.jpg", &wedding_rules()).unwrap();
        assert_eq!(matched, BTreeSet::from(["Formals".to_string(), "Numbered".to_string()]));
    }

    #[test]
    fn no_match_is_empty_set() {
        let matched = match_filename("IMG_0001.png", &wedding_rules()).unwrap();
        assert!(matched.is_empty());
    }

    #[test]
    fn rule_order_does_not_change_result() {
        let rules = wedding_rules();
        let mut reversed = rules.clone();
        reversed.reverse();
        for name in ["Smith_Formals_001.jpg", "candids-formals.JPG", "x_123.jpg"] {
            assert_eq!(
                match_filename(name, &rules).unwrap(),
                match_filename(name, &reversed).unwrap()
            );
        }
    }

    #[test]
    fn invalid_pattern_fails_by_default() {
        let mut rules = wedding_rules();
        rules.push(MappingRule::regex("Broken", "(", &["X"]));
        assert!(RuleMatcher::compile(&rules, InvalidPatternPolicy::Fail).is_err());
    }

    #[test]
    fn invalid_pattern_can_be_skipped() {
        let mut rules = wedding_rules();
        rules.push(MappingRule::regex("Broken", "(", &["X"]));
        let matcher = RuleMatcher::compile(&rules, InvalidPatternPolicy::Skip).unwrap();
        assert_eq!(matcher.skipped(), ["Broken".to_string()]);
        assert_eq!(matcher.rules().count(), 3);
    }

    #[test]
    fn match_assets_keeps_asset_order() {
        let matcher = RuleMatcher::compile(&wedding_rules(), InvalidPatternPolicy::Fail).unwrap();
        let assets = vec![
            AssetRecord::new(2, "Jones_Candids.jpg", ""),
            AssetRecord::new(1, "Smith_Formals_001.jpg", ""),
            AssetRecord::new(3, "nothing.png", ""),
        ];
        let results = matcher.match_assets(&assets);
        let pairs: Vec<(i64, &str)> = results.iter().map(|r| (r.asset_id.0, r.rule_key.as_str())).collect();
        assert_eq!(pairs, vec![(2, "Candids"), (1, "Formals"), (1, "Numbered")]);
        assert_eq!(results[1].term_paths, vec!["Wedding > Portraits"]);
    }
}

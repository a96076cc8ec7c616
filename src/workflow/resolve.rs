//! Rule resolution: picks the one rule that routes an application.
//!
//! Pure over in-memory rules so the ordering can be tested without a database.
//! Among matching rules the most specific wins:
//!
//! 1. post-scoped before post-agnostic,
//! 2. nearest department scope (exact, parent, ..., unscoped last),
//! 3. tightest `min_magnitude` threshold,
//! 4. higher `priority`,
//! 5. lower id.

use std::cmp::Reverse;

use super::types::{ApplicationType, Rule};

/// Organisational attributes of the applicant that rules match against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicantProfile {
    pub user_id: i64,
    pub department_id: Option<i64>,
    pub post_id: Option<i64>,
    /// The applicant's department followed by its ancestors, nearest first.
    pub department_chain: Vec<i64>,
}

/// Sort key of a matching rule; smaller is more specific.
type Specificity = (u8, usize, Reverse<i64>, Reverse<i64>, i64);

/// `Some(key)` when `rule` covers the application, `None` otherwise.
pub fn rule_specificity(
    rule: &Rule,
    app_type: ApplicationType,
    applicant: &ApplicantProfile,
    magnitude: i64,
) -> Option<Specificity> {
    if !rule.enabled || rule.app_type != app_type {
        return None;
    }

    let post_rank = match rule.post_id {
        None => 1,
        Some(post) if applicant.post_id == Some(post) => 0,
        Some(_) => return None,
    };

    let distance = match rule.department_id {
        None => usize::MAX,
        Some(dept) => applicant.department_chain.iter().position(|d| *d == dept)?,
    };

    if let Some(min) = rule.min_magnitude {
        if magnitude < min {
            return None;
        }
    }

    Some((
        post_rank,
        distance,
        Reverse(rule.min_magnitude.unwrap_or(i64::MIN)),
        Reverse(rule.priority),
        rule.id,
    ))
}

/// The most specific enabled rule covering the application, if any.
pub fn select_rule<'a>(
    rules: &'a [Rule],
    app_type: ApplicationType,
    applicant: &ApplicantProfile,
    magnitude: i64,
) -> Option<&'a Rule> {
    rules
        .iter()
        .filter_map(|rule| {
            rule_specificity(rule, app_type, applicant, magnitude).map(|key| (key, rule))
        })
        .min_by_key(|(key, _)| *key)
        .map(|(_, rule)| rule)
}

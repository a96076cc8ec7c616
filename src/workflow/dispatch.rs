//! Task dispatch: turns a rule into a per-step approver plan and decides
//! when a step is finished.
//!
//! Organisation lookups go through [`OrgDirectory`] so the planning logic
//! runs the same against SQLite and against the in-memory fixture in tests.

use super::resolve::ApplicantProfile;
use super::types::{ApprovalMode, ApproverSpec, PostScope, TaskStatus};
use crate::error::AppError;

/// Read-only view of the organisation needed to resolve approvers.
pub trait OrgDirectory {
    /// Leader of a department, if one is set.
    fn department_leader(&self, department_id: i64) -> Result<Option<i64>, AppError>;

    fn is_active_user(&self, user_id: i64) -> Result<bool, AppError>;

    /// Active holders of a post, optionally restricted to one department,
    /// ordered by user id.
    fn post_holders(&self, post_id: i64, department_id: Option<i64>) -> Result<Vec<i64>, AppError>;
}

/// Result of evaluating the tasks of the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Waiting,
    Approved,
    Rejected,
}

/// Resolve every approver slot of a rule into a group of candidate users.
///
/// Inactive users and the applicant are dropped. Leader slots walk up the
/// department chain past vacant, inactive or self-leadership. A slot left
/// empty is an error.
pub fn resolve_approvers<D: OrgDirectory + ?Sized>(
    approvers: &[ApproverSpec],
    applicant: &ApplicantProfile,
    org: &D,
) -> Result<Vec<Vec<i64>>, AppError> {
    let mut groups = Vec::with_capacity(approvers.len());

    for spec in approvers {
        let candidates = match spec {
            ApproverSpec::User { user_id } => vec![*user_id],
            ApproverSpec::DepartmentLeader => leader_from(0, applicant, org)?.into_iter().collect(),
            ApproverSpec::SuperiorLeader { levels } => {
                leader_from(*levels as usize, applicant, org)?.into_iter().collect()
            }
            ApproverSpec::Post { post_id, scope: PostScope::Any } => {
                org.post_holders(*post_id, None)?
            }
            ApproverSpec::Post { post_id, scope: PostScope::ApplicantDepartment } => {
                match applicant.department_id {
                    Some(dept) => org.post_holders(*post_id, Some(dept))?,
                    None => Vec::new(),
                }
            }
        };

        let mut group: Vec<i64> = Vec::with_capacity(candidates.len());
        for user_id in candidates {
            if user_id == applicant.user_id || group.contains(&user_id) {
                continue;
            }
            if org.is_active_user(user_id)? {
                group.push(user_id);
            }
        }

        if group.is_empty() {
            return Err(AppError::NoApprover(format!("{spec} resolves to no eligible user")));
        }
        groups.push(group);
    }

    Ok(groups)
}

/// First usable leader at `level` or above in the applicant's department chain.
fn leader_from<D: OrgDirectory + ?Sized>(
    level: usize,
    applicant: &ApplicantProfile,
    org: &D,
) -> Result<Option<i64>, AppError> {
    for dept in applicant.department_chain.iter().skip(level) {
        if let Some(leader) = org.department_leader(*dept)? {
            if leader != applicant.user_id && org.is_active_user(leader)? {
                return Ok(Some(leader));
            }
        }
    }
    Ok(None)
}

/// Lay candidate groups out as steps according to the approval mode.
pub fn plan_steps(mode: ApprovalMode, groups: Vec<Vec<i64>>) -> Vec<Vec<i64>> {
    match mode {
        ApprovalMode::Sequential => groups,
        ApprovalMode::Countersign | ApprovalMode::OrSign => {
            let mut merged: Vec<i64> = Vec::new();
            for user_id in groups.into_iter().flatten() {
                if !merged.contains(&user_id) {
                    merged.push(user_id);
                }
            }
            vec![merged]
        }
    }
}

/// Decide a step from the statuses of its live tasks.
///
/// Transferred and cancelled tasks are ignored: a transfer leaves a fresh
/// pending task behind, and cancellation only happens once a step is closed.
pub fn step_outcome(mode: ApprovalMode, statuses: &[TaskStatus]) -> StepOutcome {
    let live = statuses
        .iter()
        .filter(|s| !matches!(s, TaskStatus::Transferred | TaskStatus::Cancelled));

    let mut approved = 0usize;
    let mut total = 0usize;
    for status in live {
        total += 1;
        match status {
            TaskStatus::Rejected => return StepOutcome::Rejected,
            TaskStatus::Approved => approved += 1,
            _ => {}
        }
    }

    let done = match mode {
        ApprovalMode::Countersign => total > 0 && approved == total,
        ApprovalMode::Sequential | ApprovalMode::OrSign => approved > 0,
    };
    if done { StepOutcome::Approved } else { StepOutcome::Waiting }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct FakeOrg {
        leaders: HashMap<i64, i64>,
        inactive: HashSet<i64>,
        /// (post_id, department_id, user_id)
        posts: Vec<(i64, i64, i64)>,
    }

    impl OrgDirectory for FakeOrg {
        fn department_leader(&self, department_id: i64) -> Result<Option<i64>, AppError> {
            Ok(self.leaders.get(&department_id).copied())
        }

        fn is_active_user(&self, user_id: i64) -> Result<bool, AppError> {
            Ok(!self.inactive.contains(&user_id))
        }

        fn post_holders(&self, post_id: i64, department_id: Option<i64>) -> Result<Vec<i64>, AppError> {
            let mut ids: Vec<i64> = self
                .posts
                .iter()
                .filter(|(p, d, u)| {
                    *p == post_id
                        && department_id.is_none_or(|want| want == *d)
                        && !self.inactive.contains(u)
                })
                .map(|(_, _, u)| *u)
                .collect();
            ids.sort_unstable();
            Ok(ids)
        }
    }

    fn applicant(user_id: i64) -> ApplicantProfile {
        ApplicantProfile {
            user_id,
            department_id: Some(30),
            post_id: None,
            department_chain: vec![30, 20, 10],
        }
    }

    fn org() -> FakeOrg {
        FakeOrg {
            leaders: HashMap::from([(30, 3), (20, 2), (10, 1)]),
            inactive: HashSet::new(),
            posts: vec![(100, 30, 31), (100, 20, 21), (100, 30, 32)],
        }
    }

    #[test]
    fn leaders_resolve_along_chain() {
        let groups = resolve_approvers(
            &[
                ApproverSpec::DepartmentLeader,
                ApproverSpec::SuperiorLeader { levels: 1 },
                ApproverSpec::SuperiorLeader { levels: 2 },
            ],
            &applicant(50),
            &org(),
        )
        .unwrap();
        assert_eq!(groups, vec![vec![3], vec![2], vec![1]]);
    }

    #[test]
    fn leader_applying_escalates_to_parent() {
        let groups =
            resolve_approvers(&[ApproverSpec::DepartmentLeader], &applicant(3), &org()).unwrap();
        assert_eq!(groups, vec![vec![2]]);
    }

    #[test]
    fn vacant_or_inactive_leader_escalates() {
        let mut org = org();
        org.leaders.remove(&30);
        org.inactive.insert(2);
        let groups =
            resolve_approvers(&[ApproverSpec::DepartmentLeader], &applicant(50), &org).unwrap();
        assert_eq!(groups, vec![vec![1]]);
    }

    #[test]
    fn superior_beyond_root_is_no_approver() {
        let err = resolve_approvers(
            &[ApproverSpec::SuperiorLeader { levels: 3 }],
            &applicant(50),
            &org(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NoApprover(_)));
    }

    #[test]
    fn post_scope_filters_by_applicant_department() {
        let any = resolve_approvers(
            &[ApproverSpec::Post { post_id: 100, scope: PostScope::Any }],
            &applicant(50),
            &org(),
        )
        .unwrap();
        assert_eq!(any, vec![vec![21, 31, 32]]);

        let local = resolve_approvers(
            &[ApproverSpec::Post { post_id: 100, scope: PostScope::ApplicantDepartment }],
            &applicant(31),
            &org(),
        )
        .unwrap();
        assert_eq!(local, vec![vec![32]]);
    }

    #[test]
    fn fixed_user_must_be_active_and_not_applicant() {
        let mut org = org();
        org.inactive.insert(9);
        assert!(resolve_approvers(&[ApproverSpec::User { user_id: 9 }], &applicant(50), &org).is_err());
        assert!(resolve_approvers(&[ApproverSpec::User { user_id: 50 }], &applicant(50), &org).is_err());
        let ok = resolve_approvers(&[ApproverSpec::User { user_id: 8 }], &applicant(50), &org).unwrap();
        assert_eq!(ok, vec![vec![8]]);
    }

    #[test]
    fn sequential_plan_keeps_groups() {
        let plan = plan_steps(ApprovalMode::Sequential, vec![vec![3], vec![21, 31], vec![3]]);
        assert_eq!(plan, vec![vec![3], vec![21, 31], vec![3]]);
    }

    #[test]
    fn parallel_plans_merge_into_one_step() {
        let groups = vec![vec![3], vec![21, 3], vec![1]];
        assert_eq!(plan_steps(ApprovalMode::Countersign, groups.clone()), vec![vec![3, 21, 1]]);
        assert_eq!(plan_steps(ApprovalMode::OrSign, groups), vec![vec![3, 21, 1]]);
    }

    #[test]
    fn countersign_waits_for_everyone() {
        use TaskStatus::*;
        assert_eq!(step_outcome(ApprovalMode::Countersign, &[Approved, Pending]), StepOutcome::Waiting);
        assert_eq!(step_outcome(ApprovalMode::Countersign, &[Approved, Approved]), StepOutcome::Approved);
        assert_eq!(
            step_outcome(ApprovalMode::Countersign, &[Approved, Transferred, Approved]),
            StepOutcome::Approved
        );
        assert_eq!(step_outcome(ApprovalMode::Countersign, &[Approved, Rejected]), StepOutcome::Rejected);
        assert_eq!(step_outcome(ApprovalMode::Countersign, &[]), StepOutcome::Waiting);
    }

    #[test]
    fn or_sign_and_sequential_close_on_first_approval() {
        use TaskStatus::*;
        for mode in [ApprovalMode::OrSign, ApprovalMode::Sequential] {
            assert_eq!(step_outcome(mode, &[Pending, Pending]), StepOutcome::Waiting);
            assert_eq!(step_outcome(mode, &[Pending, Approved]), StepOutcome::Approved);
            assert_eq!(step_outcome(mode, &[Rejected, Pending]), StepOutcome::Rejected);
        }
    }
}

//! Workflow vocabulary: application kinds, approval modes, rules, tasks.
//!
//! Enums are stored in SQLite as their snake_case names; [`as_str`] and
//! `parse` are the only conversions between the two forms.
//!
//! [`as_str`]: ApprovalMode::as_str

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Declares a string-backed enum with `as_str` / `parse` helpers.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Result<Self, AppError> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(AppError::Validation(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
pub(crate) use text_enum;

text_enum!(
    /// What is being requested.
    ApplicationType {
        Leave => "leave",
        Reimbursement => "reimbursement",
    }
);

text_enum!(
    /// How the tasks of a rule are materialised and resolved.
    ApprovalMode {
        Sequential => "sequential",
        Countersign => "countersign",
        OrSign => "or_sign",
    }
);

text_enum!(
    ApplicationStatus {
        Draft => "draft",
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Withdrawn => "withdrawn",
    }
);

text_enum!(
    TaskStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Cancelled => "cancelled",
        Transferred => "transferred",
    }
);

text_enum!(
    /// Audit trail entries recorded against an application.
    EventAction {
        Created => "created",
        Updated => "updated",
        Submitted => "submitted",
        Approved => "approved",
        Rejected => "rejected",
        Withdrawn => "withdrawn",
        Reopened => "reopened",
        Transferred => "transferred",
        StepAdvanced => "step_advanced",
        Completed => "completed",
    }
);

/// Where holders of a post are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostScope {
    #[default]
    Any,
    ApplicantDepartment,
}

/// One approver slot of a rule; resolves to a group of candidate users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApproverSpec {
    User { user_id: i64 },
    DepartmentLeader,
    /// Leader of the department `levels` above the applicant's (1 = parent).
    SuperiorLeader { levels: u32 },
    Post {
        post_id: i64,
        #[serde(default)]
        scope: PostScope,
    },
}

impl std::fmt::Display for ApproverSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApproverSpec::User { user_id } => write!(f, "user #{user_id}"),
            ApproverSpec::DepartmentLeader => f.write_str("department leader"),
            ApproverSpec::SuperiorLeader { levels } => write!(f, "superior leader (+{levels})"),
            ApproverSpec::Post { post_id, scope: PostScope::Any } => write!(f, "post #{post_id}"),
            ApproverSpec::Post { post_id, scope: PostScope::ApplicantDepartment } => {
                write!(f, "post #{post_id} in applicant department")
            }
        }
    }
}

/// A routing rule: which applications it covers and who approves them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub app_type: ApplicationType,
    /// Applies to this department and its descendants; `None` = everyone.
    pub department_id: Option<i64>,
    /// Applies only to applicants holding this post; `None` = any post.
    pub post_id: Option<i64>,
    /// Lower bound on leave days / reimbursement cents.
    pub min_magnitude: Option<i64>,
    pub priority: i64,
    pub mode: ApprovalMode,
    pub approvers: Vec<ApproverSpec>,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleInput {
    pub name: String,
    pub app_type: ApplicationType,
    #[serde(default)]
    pub department_id: Option<i64>,
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub min_magnitude: Option<i64>,
    #[serde(default)]
    pub priority: i64,
    pub mode: ApprovalMode,
    pub approvers: Vec<ApproverSpec>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Type-specific body of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApplicationDetail {
    Leave {
        leave_kind: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        days: i64,
    },
    Reimbursement {
        category: String,
        amount_cents: i64,
    },
}

impl ApplicationDetail {
    pub fn app_type(&self) -> ApplicationType {
        match self {
            ApplicationDetail::Leave { .. } => ApplicationType::Leave,
            ApplicationDetail::Reimbursement { .. } => ApplicationType::Reimbursement,
        }
    }

    /// The quantity rule thresholds compare against.
    pub fn magnitude(&self) -> i64 {
        match self {
            ApplicationDetail::Leave { days, .. } => *days,
            ApplicationDetail::Reimbursement { amount_cents, .. } => *amount_cents,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            ApplicationDetail::Leave { leave_kind, start_date, end_date, days } => {
                if leave_kind.trim().is_empty() {
                    return Err(AppError::Validation("leave_kind must not be empty".into()));
                }
                if start_date > end_date {
                    return Err(AppError::Validation("start_date is after end_date".into()));
                }
                let span = (*end_date - *start_date).num_days() + 1;
                if *days <= 0 || *days > span {
                    return Err(AppError::Validation(format!(
                        "days must be between 1 and {span}"
                    )));
                }
            }
            ApplicationDetail::Reimbursement { category, amount_cents } => {
                if category.trim().is_empty() {
                    return Err(AppError::Validation("category must not be empty".into()));
                }
                if *amount_cents <= 0 {
                    return Err(AppError::Validation("amount_cents must be positive".into()));
                }
            }
        }
        Ok(())
    }
}

/// Fields an applicant fills in for a draft.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationInput {
    pub title: String,
    #[serde(default)]
    pub reason: String,
    pub detail: ApplicationDetail,
}

impl ApplicationInput {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("title must not be empty".into()));
        }
        self.detail.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Application {
    pub id: i64,
    pub applicant_id: i64,
    pub app_type: ApplicationType,
    pub title: String,
    pub reason: String,
    pub detail: ApplicationDetail,
    pub status: ApplicationStatus,
    pub rule_id: Option<i64>,
    pub mode: Option<ApprovalMode>,
    /// Approver ids per step, frozen at submission.
    pub plan: Vec<Vec<i64>>,
    /// Incremented on every submission; tasks carry the round they belong to.
    pub round: i64,
    /// 1-based; 0 while in draft.
    pub current_step: i64,
    pub total_steps: i64,
    pub created_at: String,
    pub updated_at: String,
    pub submitted_at: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: i64,
    pub application_id: i64,
    pub round: i64,
    pub step: i64,
    pub approver_id: i64,
    pub status: TaskStatus,
    pub comment: Option<String>,
    pub created_at: String,
    pub acted_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: i64,
    pub application_id: i64,
    pub actor_id: Option<i64>,
    pub action: EventAction,
    pub comment: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

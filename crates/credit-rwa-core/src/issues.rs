//! Accumulated run diagnostics.
//!
//! Referential, structural and data-quality problems never abort a run. Each
//! one is recorded as a [`CalculationIssue`] naming the references it affects,
//! and the run carries on with the affected scope excluded or clamped.

use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueSeverity {
    /// Value clamped or defaulted; results for the scope are still usable.
    Warning,
    /// Scope excluded from the results.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueCategory {
    Referential,
    Structural,
    DataQuality,
    Configuration,
}

/// Machine-readable issue code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueCode {
    DuplicateReference,
    UnknownReference,
    MissingCounterparty,
    NegativeAmount,
    HierarchyCycle,
    DepthExceeded,
    ExcludedSubtree,
    NegativeUndrawn,
    SubLimitBreach,
    NestedLendingGroup,
    UnlinkedProtection,
    EmptyProtectionScope,
    IneligibleCollateral,
    NegativeRiskWeight,
    MaturityAdjustmentDisabled,
}

impl IssueCode {
    pub fn category(self) -> IssueCategory {
        match self {
            IssueCode::DuplicateReference
            | IssueCode::UnknownReference
            | IssueCode::MissingCounterparty => IssueCategory::Referential,
            IssueCode::HierarchyCycle | IssueCode::DepthExceeded | IssueCode::ExcludedSubtree => {
                IssueCategory::Structural
            }
            IssueCode::MaturityAdjustmentDisabled => IssueCategory::Configuration,
            IssueCode::NegativeAmount
            | IssueCode::NegativeUndrawn
            | IssueCode::SubLimitBreach
            | IssueCode::NestedLendingGroup
            | IssueCode::UnlinkedProtection
            | IssueCode::EmptyProtectionScope
            | IssueCode::IneligibleCollateral
            | IssueCode::NegativeRiskWeight => IssueCategory::DataQuality,
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ---------------------------------------------------------------------------
// Issue record
// ---------------------------------------------------------------------------

/// A single reported problem, tied to the references it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationIssue {
    pub severity: IssueSeverity,
    pub category: IssueCategory,
    pub code: IssueCode,
    /// Affected record references, sorted.
    pub references: Vec<String>,
    pub message: String,
}

impl std::fmt::Display for CalculationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:?}/{}] {} ({})",
            self.severity,
            self.code,
            self.message,
            self.references.join(", ")
        )
    }
}

/// Append-only issue accumulator threaded through a run.
#[derive(Debug, Default)]
pub struct IssueLog {
    issues: Vec<CalculationIssue>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, code: IssueCode, references: Vec<String>, message: impl Into<String>) {
        self.push(IssueSeverity::Error, code, references, message.into());
    }

    pub fn warning(
        &mut self,
        code: IssueCode,
        references: Vec<String>,
        message: impl Into<String>,
    ) {
        self.push(IssueSeverity::Warning, code, references, message.into());
    }

    fn push(
        &mut self,
        severity: IssueSeverity,
        code: IssueCode,
        mut references: Vec<String>,
        message: String,
    ) {
        references.sort();
        references.dedup();
        warn!(?severity, %code, references = ?references, "{}", message);
        self.issues.push(CalculationIssue {
            severity,
            category: code.category(),
            code,
            references,
            message,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Messages of warning-severity issues, for the output envelope.
    pub fn warning_messages(&self) -> Vec<String> {
        warning_messages(&self.issues)
    }

    pub fn into_issues(self) -> Vec<CalculationIssue> {
        self.issues
    }
}

/// Messages of warning-severity issues in `issues`.
pub fn warning_messages(issues: &[CalculationIssue]) -> Vec<String> {
    issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Warning)
        .map(|i| i.message.clone())
        .collect()
}

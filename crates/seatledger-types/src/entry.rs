//! Entry verification verdicts.
//!
//! Four independent checks are computed for every scan and all four are
//! always present in the verdict, whichever failed first:
//!
//! | Check          | Compares                                              |
//! |----------------|-------------------------------------------------------|
//! | `Ownership`    | buyer of record ↔ ledger owner ↔ buyer's wallet       |
//! | `Usage`        | relational `is_used` ↔ ledger `is_used`               |
//! | `Identity`     | identity proof on file ↔ ledger face-verified flag    |
//! | `Cancellation` | relational `cancelled_at` ↔ ledger cancellation flag  |
//!
//! A check flagged `inconsistent` means the two sources disagree on a
//! jointly authoritative fact. Such faults are reported, never resolved.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{LedgerTokenId, UserId};

/// Which entry check produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Ownership,
    Usage,
    Identity,
    Cancellation,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ownership => write!(f, "ownership"),
            Self::Usage => write!(f, "usage"),
            Self::Identity => write!(f, "identity"),
            Self::Cancellation => write!(f, "cancellation"),
        }
    }
}

/// Result of one entry check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub kind: CheckKind,
    pub valid: bool,
    /// Whether a failure of this check denies entry.
    pub enforced: bool,
    /// Ledger and relational store disagree.
    pub inconsistent: bool,
    pub detail: Option<String>,
}

impl CheckOutcome {
    #[must_use]
    pub fn pass(kind: CheckKind) -> Self {
        Self {
            kind,
            valid: true,
            enforced: true,
            inconsistent: false,
            detail: None,
        }
    }

    #[must_use]
    pub fn fail(kind: CheckKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            valid: false,
            enforced: true,
            inconsistent: false,
            detail: Some(detail.into()),
        }
    }

    /// A failure caused by ledger/store disagreement.
    #[must_use]
    pub fn inconsistency(kind: CheckKind, detail: impl Into<String>) -> Self {
        Self {
            inconsistent: true,
            ..Self::fail(kind, detail)
        }
    }

    #[must_use]
    pub fn advisory(mut self) -> Self {
        self.enforced = false;
        self
    }

    /// `true` if this check does not block entry.
    #[must_use]
    pub fn permits_entry(&self) -> bool {
        self.valid || !self.enforced
    }
}

/// All four check outcomes of one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryChecks {
    pub ownership: CheckOutcome,
    pub usage: CheckOutcome,
    pub identity: CheckOutcome,
    pub cancellation: CheckOutcome,
}

impl EntryChecks {
    pub fn iter(&self) -> impl Iterator<Item = &CheckOutcome> {
        [
            &self.ownership,
            &self.usage,
            &self.identity,
            &self.cancellation,
        ]
        .into_iter()
    }

    #[must_use]
    pub fn get(&self, kind: CheckKind) -> &CheckOutcome {
        match kind {
            CheckKind::Ownership => &self.ownership,
            CheckKind::Usage => &self.usage,
            CheckKind::Identity => &self.identity,
            CheckKind::Cancellation => &self.cancellation,
        }
    }
}

/// The reconciler's answer for one `(token, buyer)` scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryVerdict {
    pub token_id: LedgerTokenId,
    pub buyer_id: UserId,
    pub can_enter: bool,
    pub checks: EntryChecks,
    /// One message per failed check, advisory failures prefixed.
    pub errors: Vec<String>,
    /// Both sources agree the ticket was already admitted.
    pub already_used: bool,
}

impl EntryVerdict {
    /// Assemble a verdict; `can_enter` is the AND of every enforced check.
    #[must_use]
    pub fn from_checks(
        token_id: LedgerTokenId,
        buyer_id: UserId,
        checks: EntryChecks,
        already_used: bool,
    ) -> Self {
        let can_enter = checks.iter().all(CheckOutcome::permits_entry);
        let errors = checks
            .iter()
            .filter(|c| !c.valid)
            .map(|c| {
                let detail = c.detail.as_deref().unwrap_or("failed");
                if c.enforced {
                    format!("{}: {detail}", c.kind)
                } else {
                    format!("{} (advisory): {detail}", c.kind)
                }
            })
            .collect();
        Self {
            token_id,
            buyer_id,
            can_enter,
            checks,
            errors,
            already_used,
        }
    }

    /// Checks where ledger and store disagree.
    pub fn inconsistencies(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| c.inconsistent)
    }

    #[must_use]
    pub fn has_inconsistency(&self) -> bool {
        self.inconsistencies().next().is_some()
    }
}

/// Result of `admit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionOutcome {
    /// Entry granted; the ticket is now used on both sides.
    Admitted(EntryVerdict),
    /// A repeated scan of a ticket already admitted.
    AlreadyUsed(EntryVerdict),
    /// Entry refused; see `errors` in the verdict.
    Denied(EntryVerdict),
}

impl AdmissionOutcome {
    #[must_use]
    pub fn verdict(&self) -> &EntryVerdict {
        match self {
            Self::Admitted(v) | Self::AlreadyUsed(v) | Self::Denied(v) => v,
        }
    }

    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

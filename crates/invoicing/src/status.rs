//! Invoice status lifecycle.
//!
//! ```text
//! draft ──> sent ──> viewed ──> paid
//!             │         │        ^
//!             └──> overdue ──────┘
//! draft | sent | viewed | overdue ──> void
//! ```
//!
//! `paid` and `void` are terminal. Re-entering the current state is a no-op.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use billdesk_core::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    Paid,
    Overdue,
    Void,
}

/// Lifecycle timestamp set the first time an invoice enters a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStamp {
    SentAt,
    ViewedAt,
    PaidAt,
}

/// Result of planning a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Target equals the current status.
    Unchanged,
    /// The status changes; `stamp` names the timestamp to set if still unset.
    Changed { stamp: Option<LifecycleStamp> },
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Viewed,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Void,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }

    /// Issued and still awaiting payment.
    pub fn is_payable(self) -> bool {
        match self {
            InvoiceStatus::Sent | InvoiceStatus::Viewed | InvoiceStatus::Overdue => true,
            InvoiceStatus::Draft | InvoiceStatus::Paid | InvoiceStatus::Void => false,
        }
    }

    /// Apply the transition table.
    pub fn plan_transition(self, to: InvoiceStatus) -> Result<TransitionOutcome, DomainError> {
        use InvoiceStatus::*;

        if self == to {
            return Ok(TransitionOutcome::Unchanged);
        }

        let stamp = match (self, to) {
            (Draft, Sent) => Some(LifecycleStamp::SentAt),
            (Sent, Viewed) => Some(LifecycleStamp::ViewedAt),
            (Sent | Viewed | Overdue, Paid) => Some(LifecycleStamp::PaidAt),
            (Sent | Viewed, Overdue) => None,
            (Draft | Sent | Viewed | Overdue, Void) => None,
            _ => return Err(DomainError::invalid_transition(self, to)),
        };
        Ok(TransitionOutcome::Changed { stamp })
    }

    pub fn can_transition_to(self, to: InvoiceStatus) -> bool {
        self.plan_transition(to).is_ok()
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown invoice status: '{s}'")))
    }
}

/// Whether an invoice is overdue at `as_of`.
///
/// Sent and viewed invoices become overdue once the due date has passed (strictly
/// before the UTC date of `as_of`). Invoices explicitly marked overdue stay overdue.
pub fn is_overdue(status: InvoiceStatus, due_date: NaiveDate, as_of: DateTime<Utc>) -> bool {
    match status {
        InvoiceStatus::Sent | InvoiceStatus::Viewed => due_date < as_of.date_naive(),
        InvoiceStatus::Overdue => true,
        InvoiceStatus::Draft | InvoiceStatus::Paid | InvoiceStatus::Void => false,
    }
}

/// The status shown to users: `overdue` whenever [`is_overdue`] holds.
pub fn presented_status(status: InvoiceStatus, due_date: NaiveDate, as_of: DateTime<Utc>) -> InvoiceStatus {
    if is_overdue(status, due_date, as_of) {
        InvoiceStatus::Overdue
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use InvoiceStatus::*;

    const ALLOWED: [(InvoiceStatus, InvoiceStatus); 11] = [
        (Draft, Sent),
        (Sent, Viewed),
        (Sent, Paid),
        (Viewed, Paid),
        (Overdue, Paid),
        (Sent, Overdue),
        (Viewed, Overdue),
        (Draft, Void),
        (Sent, Void),
        (Viewed, Void),
        (Overdue, Void),
    ];

    #[test]
    fn every_table_edge_is_allowed() {
        for (from, to) in ALLOWED {
            assert!(
                matches!(from.plan_transition(to), Ok(TransitionOutcome::Changed { .. })),
                "{from} -> {to} rejected"
            );
        }
    }

    #[test]
    fn unlisted_pairs_are_invalid_transitions() {
        for from in InvoiceStatus::ALL {
            for to in InvoiceStatus::ALL {
                if from == to || ALLOWED.contains(&(from, to)) {
                    continue;
                }
                assert_eq!(
                    from.plan_transition(to),
                    Err(DomainError::invalid_transition(from, to)),
                    "{from} -> {to} accepted"
                );
            }
        }
        assert!(!Paid.can_transition_to(Draft));
        assert!(!Void.can_transition_to(Sent));
    }

    #[test]
    fn same_state_is_a_no_op() {
        for status in InvoiceStatus::ALL {
            assert_eq!(status.plan_transition(status), Ok(TransitionOutcome::Unchanged));
        }
    }

    #[test]
    fn stamps_follow_the_target_status() {
        assert_eq!(
            Draft.plan_transition(Sent),
            Ok(TransitionOutcome::Changed { stamp: Some(LifecycleStamp::SentAt) })
        );
        assert_eq!(
            Sent.plan_transition(Viewed),
            Ok(TransitionOutcome::Changed { stamp: Some(LifecycleStamp::ViewedAt) })
        );
        assert_eq!(
            Overdue.plan_transition(Paid),
            Ok(TransitionOutcome::Changed { stamp: Some(LifecycleStamp::PaidAt) })
        );
        assert_eq!(Sent.plan_transition(Void), Ok(TransitionOutcome::Changed { stamp: None }));
    }

    #[test]
    fn parses_and_displays_lowercase_names() {
        for status in InvoiceStatus::ALL {
            assert_eq!(status.to_string().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert_eq!("PAID".parse::<InvoiceStatus>().unwrap(), Paid);
        assert!("archived".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn overdue_is_derived_from_due_date() {
        let due = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let on_due = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 0).unwrap();
        let after_due = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 1).unwrap();

        assert!(!is_overdue(Sent, due, on_due));
        assert!(is_overdue(Sent, due, after_due));
        assert!(is_overdue(Viewed, due, after_due));
        assert!(is_overdue(Overdue, due, on_due));
        for status in [Draft, Paid, Void] {
            assert!(!is_overdue(status, due, after_due));
        }

        assert_eq!(presented_status(Viewed, due, after_due), Overdue);
        assert_eq!(presented_status(Viewed, due, on_due), Viewed);
        assert_eq!(presented_status(Paid, due, after_due), Paid);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = InvoiceStatus> {
            proptest::sample::select(InvoiceStatus::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: no walk through the table ever leaves a terminal state.
            #[test]
            fn terminal_states_are_closed(path in proptest::collection::vec(any_status(), 1..20)) {
                let mut current = Draft;
                let mut terminal: Option<InvoiceStatus> = None;
                for target in path {
                    if let Ok(outcome) = current.plan_transition(target) {
                        if outcome != TransitionOutcome::Unchanged {
                            current = target;
                        }
                    }
                    if let Some(t) = terminal {
                        prop_assert_eq!(current, t);
                    }
                    if current.is_terminal() {
                        terminal = Some(current);
                    }
                }
            }
        }
    }
}

//! Purpose: Hold active loans and drive every availability transition.
//! Exports: `LoanId`, `Loan`, `LoanPolicy`, `Ledger`, `DEFAULT_LOAN_DAYS`, `MAX_LOAN_DAYS`.
//! Role: The only writer of the catalog partition and of users' held-book sets.
//! Invariants: At most one active loan references a given book.
//! Invariants: Loan ids come from a counter that starts at 1 and never goes back,
//! Invariants: even after loans are closed.
//! Invariants: A rejected create or close leaves every component untouched.
//! Notes: Closed loans are dropped; no return history is kept.
use std::collections::BTreeMap;
use std::fmt;

use time::{Duration, OffsetDateTime};

use crate::core::catalog::{BookId, Catalog};
use crate::core::error::{Error, ErrorKind};
use crate::core::membership::{Membership, UserId};

pub const DEFAULT_LOAN_DAYS: u32 = 14;
/// Longest loan period accepted from configuration (ten years).
pub const MAX_LOAN_DAYS: u32 = 3650;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LoanId(pub u64);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Loan {
    pub user: UserId,
    pub book: BookId,
    pub loaned_at: OffsetDateTime,
    pub due_at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LoanPolicy {
    pub loan_days: u32,
    /// Reject borrowers that are not registered members.
    pub require_known_user: bool,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            loan_days: DEFAULT_LOAN_DAYS,
            require_known_user: false,
        }
    }
}

impl LoanPolicy {
    pub fn loan_period(&self) -> Duration {
        Duration::days(i64::from(self.loan_days))
    }
}

#[derive(Clone, Debug)]
pub struct Ledger {
    loans: BTreeMap<LoanId, Loan>,
    next_id: u64,
    policy: LoanPolicy,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(LoanPolicy::default())
    }
}

impl Ledger {
    pub fn new(policy: LoanPolicy) -> Self {
        Self {
            loans: BTreeMap::new(),
            next_id: 1,
            policy,
        }
    }

    pub fn policy(&self) -> LoanPolicy {
        self.policy
    }

    pub fn create_loan(
        &mut self,
        catalog: &mut Catalog,
        members: &mut Membership,
        user: UserId,
        book: BookId,
        now: OffsetDateTime,
    ) -> Result<LoanId, Error> {
        if !catalog.is_available(book) {
            tracing::debug!(book = book.0, user = user.0, "loan rejected: book unavailable");
            return Err(Error::new(ErrorKind::BookUnavailable)
                .with_message("book is not available")
                .with_hint("Return the active loan first or pick another book.")
                .with_book(book.0)
                .with_user(user.0));
        }
        if self.policy.require_known_user && !members.contains(user) {
            tracing::debug!(book = book.0, user = user.0, "loan rejected: unknown user");
            return Err(Error::new(ErrorKind::UserNotFound)
                .with_message("borrower is not a registered user")
                .with_hint("Register the user before lending to them.")
                .with_book(book.0)
                .with_user(user.0));
        }
        let due_at = now.checked_add(self.policy.loan_period()).ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message("due date is out of range")
                .with_book(book.0)
        })?;
        let next_id = self.next_id.checked_add(1).ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("loan id space exhausted")
        })?;
        if !catalog.mark_borrowed(book) {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("availability changed during loan creation")
                .with_book(book.0));
        }

        let id = LoanId(self.next_id);
        self.next_id = next_id;
        members.hold(user, book);
        self.loans.insert(
            id,
            Loan {
                user,
                book,
                loaned_at: now,
                due_at,
            },
        );
        tracing::debug!(loan = id.0, book = book.0, user = user.0, "loan created");
        Ok(id)
    }

    pub fn close_loan(
        &mut self,
        catalog: &mut Catalog,
        members: &mut Membership,
        id: LoanId,
    ) -> Result<Loan, Error> {
        let Some(loan) = self.loans.remove(&id) else {
            tracing::debug!(loan = id.0, "close rejected: loan not found");
            return Err(Error::new(ErrorKind::LoanNotFound)
                .with_message("loan not found")
                .with_hint("The loan may already have been returned.")
                .with_loan(id.0));
        };
        catalog.mark_available(loan.book);
        members.release(loan.user, loan.book);
        tracing::debug!(loan = id.0, book = loan.book.0, user = loan.user.0, "loan closed");
        Ok(loan)
    }

    pub fn get_loan(&self, id: LoanId) -> Result<&Loan, Error> {
        self.loans.get(&id).ok_or_else(|| {
            Error::new(ErrorKind::LoanNotFound)
                .with_message("loan not found")
                .with_loan(id.0)
        })
    }

    pub fn loans(&self) -> impl Iterator<Item = (LoanId, &Loan)> + '_ {
        self.loans.iter().map(|(id, loan)| (*id, loan))
    }

    pub fn loan_for_book(&self, book: BookId) -> Option<(LoanId, &Loan)> {
        self.loans().find(|(_, loan)| loan.book == book)
    }

    /// Id the next successful `create_loan` will assign.
    pub fn next_loan_id(&self) -> LoanId {
        LoanId(self.next_id)
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Ledger, LoanId, LoanPolicy, MAX_LOAN_DAYS};
    use crate::core::catalog::{BookId, Catalog};
    use crate::core::error::ErrorKind;
    use crate::core::membership::{Membership, UserId};
    use time::{Duration, OffsetDateTime};

    fn fixture() -> (Catalog, Membership) {
        let mut catalog = Catalog::new();
        catalog.add_book("Dune", "Frank Herbert", 1965);
        catalog.add_book("Emma", "Jane Austen", 1815);
        let mut members = Membership::new();
        members.add_user("Ada", "ada@example.org");
        members.add_user("Grace", "grace@example.org");
        (catalog, members)
    }

    fn at(unix: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(unix).expect("timestamp")
    }

    #[test]
    fn create_marks_book_borrowed_and_sets_due_date() {
        let (mut catalog, mut members) = fixture();
        let mut ledger = Ledger::default();
        let now = at(1_700_000_000);

        let id = ledger
            .create_loan(&mut catalog, &mut members, UserId(1), BookId(1), now)
            .expect("loan");
        assert_eq!(id, LoanId(1));

        let loan = ledger.get_loan(id).expect("loan");
        assert_eq!(loan.loaned_at, now);
        assert_eq!(loan.due_at - loan.loaned_at, Duration::days(14));
        assert!(catalog.borrowed_ids().contains(&BookId(1)));
        assert!(!catalog.get_book(BookId(1)).expect("book").is_available());
        assert!(
            members
                .get_user(UserId(1))
                .expect("user")
                .held_books()
                .contains(&BookId(1))
        );
    }

    #[test]
    fn second_loan_on_same_book_is_rejected_without_mutation() {
        let (mut catalog, mut members) = fixture();
        let mut ledger = Ledger::default();
        let now = at(1_700_000_000);
        ledger
            .create_loan(&mut catalog, &mut members, UserId(1), BookId(1), now)
            .expect("loan");

        let err = ledger
            .create_loan(&mut catalog, &mut members, UserId(2), BookId(1), now)
            .expect_err("unavailable");
        assert_eq!(err.kind(), ErrorKind::BookUnavailable);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.next_loan_id(), LoanId(2));
        assert!(
            members
                .get_user(UserId(2))
                .expect("user")
                .held_books()
                .is_empty()
        );
    }

    #[test]
    fn unknown_book_is_unavailable() {
        let (mut catalog, mut members) = fixture();
        let mut ledger = Ledger::default();
        let err = ledger
            .create_loan(&mut catalog, &mut members, UserId(1), BookId(99), at(0))
            .expect_err("unavailable");
        assert_eq!(err.kind(), ErrorKind::BookUnavailable);
    }

    #[test]
    fn relaxed_policy_accepts_unregistered_borrowers() {
        let (mut catalog, mut members) = fixture();
        let mut ledger = Ledger::default();
        let id = ledger
            .create_loan(&mut catalog, &mut members, UserId(77), BookId(2), at(0))
            .expect("loan");
        assert_eq!(ledger.get_loan(id).expect("loan").user, UserId(77));

        ledger
            .close_loan(&mut catalog, &mut members, id)
            .expect("close");
        assert!(catalog.is_available(BookId(2)));
    }

    #[test]
    fn strict_policy_rejects_unregistered_borrowers() {
        let (mut catalog, mut members) = fixture();
        let mut ledger = Ledger::new(LoanPolicy {
            require_known_user: true,
            ..LoanPolicy::default()
        });
        let err = ledger
            .create_loan(&mut catalog, &mut members, UserId(77), BookId(2), at(0))
            .expect_err("unknown user");
        assert_eq!(err.kind(), ErrorKind::UserNotFound);
        assert!(catalog.is_available(BookId(2)));
        assert_eq!(ledger.next_loan_id(), LoanId(1));
    }

    #[test]
    fn close_restores_availability_and_double_close_fails() {
        let (mut catalog, mut members) = fixture();
        let mut ledger = Ledger::default();
        let id = ledger
            .create_loan(&mut catalog, &mut members, UserId(1), BookId(1), at(0))
            .expect("loan");

        let loan = ledger
            .close_loan(&mut catalog, &mut members, id)
            .expect("close");
        assert_eq!(loan.book, BookId(1));
        assert!(catalog.is_available(BookId(1)));
        assert!(catalog.borrowed_ids().is_empty());
        assert!(
            members
                .get_user(UserId(1))
                .expect("user")
                .held_books()
                .is_empty()
        );

        let err = ledger
            .close_loan(&mut catalog, &mut members, id)
            .expect_err("closed twice");
        assert_eq!(err.kind(), ErrorKind::LoanNotFound);
        assert_eq!(err.loan(), Some(1));
    }

    #[test]
    fn loan_ids_keep_increasing_across_closes() {
        let (mut catalog, mut members) = fixture();
        let mut ledger = Ledger::default();
        let mut seen = Vec::new();
        for _ in 0..4 {
            let id = ledger
                .create_loan(&mut catalog, &mut members, UserId(1), BookId(1), at(0))
                .expect("loan");
            seen.push(id);
            ledger
                .close_loan(&mut catalog, &mut members, id)
                .expect("close");
        }
        assert_eq!(seen, vec![LoanId(1), LoanId(2), LoanId(3), LoanId(4)]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn custom_loan_period_is_applied() {
        let (mut catalog, mut members) = fixture();
        let mut ledger = Ledger::new(LoanPolicy {
            loan_days: 7,
            ..LoanPolicy::default()
        });
        let id = ledger
            .create_loan(&mut catalog, &mut members, UserId(1), BookId(1), at(0))
            .expect("loan");
        let loan = ledger.get_loan(id).expect("loan");
        assert_eq!(loan.due_at, at(7 * 24 * 60 * 60));
        assert_eq!(ledger.loan_for_book(BookId(1)).map(|(id, _)| id), Some(id));
    }

    #[test]
    fn longest_loan_period_still_has_a_due_date() {
        let (mut catalog, mut members) = fixture();
        let mut ledger = Ledger::new(LoanPolicy {
            loan_days: MAX_LOAN_DAYS,
            ..LoanPolicy::default()
        });
        let now = OffsetDateTime::now_utc();
        let id = ledger
            .create_loan(&mut catalog, &mut members, UserId(1), BookId(1), now)
            .expect("loan");
        let loan = ledger.get_loan(id).expect("loan");
        assert_eq!(loan.due_at - now, Duration::days(i64::from(MAX_LOAN_DAYS)));
    }
}

// Full consistency scan over a library's derived state.
// Never mutates; callers decide what to do with the report.
use std::collections::{BTreeMap, BTreeSet};

use crate::core::catalog::BookId;
use crate::core::library::Library;
use crate::core::membership::UserId;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationIssue {
    pub code: &'static str,
    pub message: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, code: &'static str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            code,
            message: message.into(),
        });
    }
}

pub fn validate_library(library: &Library) -> ValidationReport {
    let mut report = ValidationReport::default();
    let catalog = library.catalog();
    let available = catalog.available_ids();
    let borrowed = catalog.borrowed_ids();

    for id in available.intersection(borrowed) {
        report.push("partition_overlap", format!("book {id} is both available and borrowed"));
    }
    for (id, book) in catalog.books() {
        let in_available = available.contains(&id);
        if !in_available && !borrowed.contains(&id) {
            report.push("partition_gap", format!("book {id} is in neither set"));
        }
        if book.is_available() != in_available {
            report.push(
                "flag_mismatch",
                format!("book {id} flag disagrees with the available set"),
            );
        }
        if !catalog.authors().contains(&book.author) {
            report.push("author_missing", format!("author of book {id} is not indexed"));
        }
    }
    for id in available.union(borrowed) {
        if !catalog.contains(*id) {
            report.push("unknown_book", format!("book {id} is indexed but not catalogued"));
        }
    }

    let mut loaned: BTreeSet<BookId> = BTreeSet::new();
    let mut held: BTreeMap<UserId, BTreeSet<BookId>> = BTreeMap::new();
    let next_id = library.ledger().next_loan_id();
    for (loan_id, loan) in library.ledger().loans() {
        if !loaned.insert(loan.book) {
            report.push(
                "double_loan",
                format!("book {} has more than one active loan", loan.book),
            );
        }
        if !borrowed.contains(&loan.book) {
            report.push(
                "loan_not_borrowed",
                format!("loan {loan_id} references book {} outside the borrowed set", loan.book),
            );
        }
        if loan_id >= next_id {
            report.push(
                "loan_id_ahead",
                format!("loan {loan_id} is not below the next loan id {next_id}"),
            );
        }
        held.entry(loan.user).or_default().insert(loan.book);
    }
    for id in borrowed.difference(&loaned) {
        report.push("borrowed_without_loan", format!("book {id} is borrowed with no loan"));
    }

    let empty = BTreeSet::new();
    for (user_id, user) in library.members().users() {
        let expected = held.get(&user_id).unwrap_or(&empty);
        if user.held_books() != expected {
            report.push(
                "held_mismatch",
                format!("user {user_id} held books disagree with active loans"),
            );
        }
    }

    report
}

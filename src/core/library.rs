//! Purpose: Explicit state container tying catalog, membership and ledger together.
//! Exports: `Library`, `Summary`.
//! Role: Constructed once by the request layer and passed by reference to every operation.
//! Invariants: Loan creation and closure always go through the ledger, which is handed
//! Invariants: the catalog and membership it is allowed to mutate.
//! Notes: Callers that share a `Library` across threads must hold one lock across the
//! Notes: whole call; the availability check and the transition are not separately safe.
use time::OffsetDateTime;

use crate::core::catalog::{Book, BookId, Catalog};
use crate::core::error::Error;
use crate::core::ledger::{Ledger, Loan, LoanId, LoanPolicy};
use crate::core::membership::{Membership, User, UserId};
use crate::core::query::{self, SearchHit, Statistics};
use crate::core::seed;

/// Landing-page counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub total_books: usize,
    pub available_books: usize,
    pub total_users: usize,
    pub active_loans: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Library {
    catalog: Catalog,
    members: Membership,
    ledger: Ledger,
}

impl Library {
    pub fn new(policy: LoanPolicy) -> Self {
        Self {
            catalog: Catalog::new(),
            members: Membership::new(),
            ledger: Ledger::new(policy),
        }
    }

    /// A library preloaded with the startup dataset.
    pub fn seeded(policy: LoanPolicy) -> Self {
        let mut library = Self::new(policy);
        seed::load_seed(&mut library);
        library
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn members(&self) -> &Membership {
        &self.members
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn add_book(
        &mut self,
        title: impl Into<String>,
        author: impl Into<String>,
        year: i32,
    ) -> BookId {
        self.catalog.add_book(title, author, year)
    }

    pub fn get_book(&self, id: BookId) -> Result<&Book, Error> {
        self.catalog.get_book(id)
    }

    pub fn add_user(&mut self, name: impl Into<String>, email: impl Into<String>) -> UserId {
        self.members.add_user(name, email)
    }

    pub fn get_user(&self, id: UserId) -> Result<&User, Error> {
        self.members.get_user(id)
    }

    pub fn create_loan(&mut self, user: UserId, book: BookId) -> Result<LoanId, Error> {
        self.create_loan_at(user, book, OffsetDateTime::now_utc())
    }

    pub fn create_loan_at(
        &mut self,
        user: UserId,
        book: BookId,
        now: OffsetDateTime,
    ) -> Result<LoanId, Error> {
        self.ledger
            .create_loan(&mut self.catalog, &mut self.members, user, book, now)
    }

    pub fn close_loan(&mut self, id: LoanId) -> Result<Loan, Error> {
        self.ledger
            .close_loan(&mut self.catalog, &mut self.members, id)
    }

    pub fn search(&self, term: &str) -> Vec<SearchHit<'_>> {
        query::search(&self.catalog, term)
    }

    pub fn statistics(&self) -> Statistics {
        query::statistics(&self.catalog, &self.ledger)
    }

    pub fn summary(&self) -> Summary {
        Summary {
            total_books: self.catalog.len(),
            available_books: self.catalog.available_ids().len(),
            total_users: self.members.len(),
            active_loans: self.ledger.len(),
        }
    }
}

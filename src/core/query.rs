// Read-only views: text search over the catalog and aggregate statistics.
// Every call scans current state; nothing here is cached.
use std::collections::BTreeSet;

use crate::core::catalog::{Book, BookId, Catalog};
use crate::core::ledger::Ledger;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchHit<'a> {
    pub id: BookId,
    pub book: &'a Book,
    pub is_available: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    pub total_books: usize,
    pub available: usize,
    pub borrowed: usize,
    pub total_authors: usize,
    pub active_borrowers: usize,
    pub active_loans: usize,
    pub authors: Vec<String>,
}

/// Case-insensitive substring match on title or author, in catalog order.
pub fn search<'a>(catalog: &'a Catalog, term: &str) -> Vec<SearchHit<'a>> {
    if term.is_empty() {
        return Vec::new();
    }
    let needle = term.to_lowercase();
    catalog
        .books()
        .filter(|(_, book)| {
            book.title.to_lowercase().contains(&needle)
                || book.author.to_lowercase().contains(&needle)
        })
        .map(|(id, book)| SearchHit {
            id,
            book,
            is_available: catalog.is_available(id),
        })
        .collect()
}

pub fn statistics(catalog: &Catalog, ledger: &Ledger) -> Statistics {
    let borrowers: BTreeSet<_> = ledger.loans().map(|(_, loan)| loan.user).collect();
    Statistics {
        total_books: catalog.len(),
        available: catalog.available_ids().len(),
        borrowed: catalog.borrowed_ids().len(),
        total_authors: catalog.authors().len(),
        active_borrowers: borrowers.len(),
        active_loans: ledger.len(),
        authors: catalog.authors().iter().cloned().collect(),
    }
}

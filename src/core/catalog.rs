//! Purpose: Own the set of books, each book's availability flag, and the derived indices.
//! Exports: `BookId`, `Book`, `Catalog`.
//! Role: Leaf component; read by queries, mutated for availability only by the ledger.
//! Invariants: `available` and `borrowed` partition the catalog's book ids.
//! Invariants: A book's flag is true iff its id is in `available`.
//! Invariants: Books and authors only grow; there is no removal path.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::error::{Error, ErrorKind};
use crate::core::next_sequential_id;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BookId(pub u64);

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub year: i32,
    available: bool,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.available
    }
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    books: BTreeMap<BookId, Book>,
    available: BTreeSet<BookId>,
    borrowed: BTreeSet<BookId>,
    authors: BTreeSet<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an available book under `max(existing id) + 1`, or `1` for an empty catalog.
    pub fn add_book(
        &mut self,
        title: impl Into<String>,
        author: impl Into<String>,
        year: i32,
    ) -> BookId {
        let id = BookId(next_sequential_id(
            self.books.keys().next_back().map(|id| id.0),
        ));
        let author = author.into();
        self.authors.insert(author.clone());
        self.books.insert(
            id,
            Book {
                title: title.into(),
                author,
                year,
                available: true,
            },
        );
        self.available.insert(id);
        id
    }

    pub fn get_book(&self, id: BookId) -> Result<&Book, Error> {
        self.books.get(&id).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("book not found")
                .with_book(id.0)
        })
    }

    /// Books in id order, which is also insertion order.
    pub fn books(&self) -> impl Iterator<Item = (BookId, &Book)> + '_ {
        self.books.iter().map(|(id, book)| (*id, book))
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn contains(&self, id: BookId) -> bool {
        self.books.contains_key(&id)
    }

    pub fn is_available(&self, id: BookId) -> bool {
        self.available.contains(&id)
    }

    pub fn available_ids(&self) -> &BTreeSet<BookId> {
        &self.available
    }

    pub fn borrowed_ids(&self) -> &BTreeSet<BookId> {
        &self.borrowed
    }

    pub fn authors(&self) -> &BTreeSet<String> {
        &self.authors
    }

    // Availability transitions are reserved for the ledger.

    /// Moves an available book into the borrowed set. Returns false and leaves
    /// state untouched when the book is not currently available.
    pub(crate) fn mark_borrowed(&mut self, id: BookId) -> bool {
        if !self.available.contains(&id) {
            return false;
        }
        let Some(book) = self.books.get_mut(&id) else {
            return false;
        };
        book.available = false;
        self.available.remove(&id);
        self.borrowed.insert(id);
        true
    }

    pub(crate) fn mark_available(&mut self, id: BookId) {
        let Some(book) = self.books.get_mut(&id) else {
            return;
        };
        book.available = true;
        self.borrowed.remove(&id);
        self.available.insert(id);
    }
}

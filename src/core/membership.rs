// Registered users and the books each one currently holds.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::catalog::BookId;
use crate::core::error::{Error, ErrorKind};
use crate::core::next_sequential_id;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct User {
    pub name: String,
    pub email: String,
    held: BTreeSet<BookId>,
}

impl User {
    pub fn held_books(&self) -> &BTreeSet<BookId> {
        &self.held
    }
}

#[derive(Clone, Debug, Default)]
pub struct Membership {
    users: BTreeMap<UserId, User>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user under `max(existing id) + 1`. Emails are not checked for uniqueness.
    pub fn add_user(&mut self, name: impl Into<String>, email: impl Into<String>) -> UserId {
        let id = UserId(next_sequential_id(
            self.users.keys().next_back().map(|id| id.0),
        ));
        self.users.insert(
            id,
            User {
                name: name.into(),
                email: email.into(),
                held: BTreeSet::new(),
            },
        );
        id
    }

    pub fn get_user(&self, id: UserId) -> Result<&User, Error> {
        self.users.get(&id).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("user not found")
                .with_user(id.0)
        })
    }

    pub fn users(&self) -> impl Iterator<Item = (UserId, &User)> + '_ {
        self.users.iter().map(|(id, user)| (*id, user))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.users.contains_key(&id)
    }

    // Held-book sets are derived from the ledger and only touched by it.

    /// No-op for unregistered users: loans may reference them when foreign keys are relaxed.
    pub(crate) fn hold(&mut self, user: UserId, book: BookId) {
        if let Some(entry) = self.users.get_mut(&user) {
            entry.held.insert(book);
        }
    }

    pub(crate) fn release(&mut self, user: UserId, book: BookId) {
        if let Some(entry) = self.users.get_mut(&user) {
            entry.held.remove(&book);
        }
    }
}

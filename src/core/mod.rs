// Core modules implementing the catalog, membership, loan ledger and queries.
pub mod catalog;
pub mod error;
pub mod ledger;
pub mod library;
pub mod membership;
pub mod query;
pub mod seed;
pub mod validate;

/// `max + 1` id assignment shared by books and users; `1` when nothing exists yet.
pub(crate) fn next_sequential_id(last: Option<u64>) -> u64 {
    last.map_or(1, |last| last.saturating_add(1))
}

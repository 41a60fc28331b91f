//! Purpose: Define the stable public Rust API boundary for shelfkeep.
//! Exports: Core types and operations needed by the CLI, the server and tests.
//! Role: Public, additive-only surface over the internal `core` modules.
//! Invariants: Availability mutators stay crate-private; only the ledger reaches them.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::catalog::{Book, BookId, Catalog};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::ledger::{DEFAULT_LOAN_DAYS, Ledger, Loan, LoanId, LoanPolicy, MAX_LOAN_DAYS};
pub use crate::core::library::{Library, Summary};
pub use crate::core::membership::{Membership, User, UserId};
pub use crate::core::query::{SearchHit, Statistics};
pub use crate::core::validate::{ValidationIssue, ValidationReport, validate_library};

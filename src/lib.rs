//! Purpose: Library crate behind the `shelfkeep` CLI and HTTP server.
//! Exports: `api` (public surface), `core` (engine), `notice` (one-shot notices).
//! Role: Loan lifecycle and availability tracking for a small lending library.
//! Invariants: All state lives in an explicit `Library` value; there are no globals.
//! Invariants: The engine never performs I/O; callers own requests and rendering.
pub mod api;
pub mod core;
pub mod notice;

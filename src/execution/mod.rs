//! Integration point for the SQL parser, planner, and executor.
//!
//! Those live in a collaborating crate, not here: the core only promises
//! that the executor can issue typed, row-level `Insert`/`Update`/`Delete`/
//! `Scan` calls against a [`crate::Database`] inside a transaction. This
//! module exists so `lib.rs`'s module path is stable for that collaborator
//! to build against; it carries no logic of its own.

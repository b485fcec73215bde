//! # Repository Module
//!
//! Data access for the hub's durable documents. The only repository today is
//! the state document store; the table-per-document pattern leaves room for
//! an audit log later without touching callers.

pub mod state;

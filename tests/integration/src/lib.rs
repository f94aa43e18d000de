//! Integration tests for the eID authentication flow
//!
//! This test suite validates, against an in-memory identity service channel:
//! - Single-flight start and cancel semantics
//! - Access-rights and PIN negotiation
//! - Reduction of every ending to exactly one outcome callback
//! - Replays of recorded service sessions



#[cfg(test)]
mod negotiation_tests;

#[cfg(test)]
mod termination_tests;

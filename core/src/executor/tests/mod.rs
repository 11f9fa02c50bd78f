//! Tests for the execution coordinator
//!
//! Organized by feature area

mod console_tests;
mod helpers;
mod isolation_tests;
mod timeout_tests;

// Library root: exposes the timetable service to `src/main.rs` and to the
// integration tests in `tests/`.

pub mod api;
pub mod db;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod schedule;
pub mod store;

// Binary plumbing. Public so the entry point can reach it.
pub mod cli;
pub mod config;
pub mod logging;

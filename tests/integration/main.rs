//! Integration tests for the harvester
//!
//! `harvest_tests` drives the coordinator with a scripted in-process client,
//! `reddit_tests` runs a full harvest against a mock API server.

mod common;
mod harvest_tests;
mod reddit_tests;

//! Cowrie Trading Engine Library
//!
//! This library provides the core components for the Cowrie automated
//! trading engine: the trade manager control loop, the domain model, and
//! the exchange/persistence/notification adapters around it.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod task_runner;

//! Floodgate - Admission Control for Agent Gateways
//!
//! This crate implements the rate limiting and circuit breaker layer that
//! gates inbound agent requests before they reach expensive model calls.
//! Each request is counted against three subjects (the user, the client
//! address, and the agent route) across overlapping minute, hour, and day
//! windows, by either an in-process backend or one backed by a shared
//! counter store. Downstream outcomes feed a per-route circuit breaker.
//!
//! The subsystem is biased to fail open: when the counter store misbehaves,
//! checks fall back to local counters or admit without counting. Admission
//! control exists to protect availability, so it must never become the
//! outage itself.

pub mod breaker;
pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
pub mod store;

//! Wallet Throttle - sliding-window attempt limiting for wallet flows.
//!
//! This crate implements a per-key sliding-window rate limiter with a
//! cancellable background sweep, and the named policies (login, OTP,
//! payment, password reset) that guard a wallet backend against repeated
//! attempts.

pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod policy;
pub mod ratelimit;

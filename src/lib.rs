//! Turnstile - Rate Limited Record Service
//!
//! This crate implements a small HTTP service exposing CRUD endpoints over
//! in-memory person records. Every endpoint is guarded by a named admission
//! policy backed by one of four limiter algorithms: fixed window, sliding
//! window, token bucket or concurrency limit.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;

//! # Dispatch Sample Library
//!
//! A small system built on `action-dispatch`, exposed as a library for
//! integration testing.

pub mod clients;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod model;
pub mod services;

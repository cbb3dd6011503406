//! donation-celebrator library crate.
//!
//! This module exposes the internal components for integration testing.

pub mod config;
pub mod currency;
pub mod donation;
pub mod donation_alerts;
pub mod poller;
pub mod video;
pub mod widget;

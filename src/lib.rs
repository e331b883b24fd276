//! sitepulse - web analytics collection and dashboard backend
//!
//! Events come in through `POST /api/track`, land in an append-only SQLite
//! log, and are folded into a fixed-shape report on every
//! `GET /api/metrics`. Registration form submissions take a separate path
//! into their own table.

pub mod api;
pub mod auth;
pub mod config;
pub mod event_store;
pub mod metrics;
pub mod registration;
pub mod retry;
pub mod sqlite_pragma;

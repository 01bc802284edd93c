#![doc = include_str!("../README.md")]

//! # SQLite session
//!
//! A [`quarry::Session`] over one embedded `SQLite` connection, intended for
//! development and tests.

#![forbid(unsafe_code)]

mod convert;
mod session;

pub use session::{ConnectOptions, SqliteSession};

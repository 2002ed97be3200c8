//! Partnership agreement statistics and expiry notifications.
//!
//! The analysis core is pure: callers load a record snapshot, pass in
//! today's date and the user's read keys, and get back statistics and a
//! sorted notification list.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod models;
pub mod read_state;
pub mod report;
pub mod source;

//! Tweet archive bot library.
//!
//! Watches an X account for mentions and direct messages, archives the
//! referenced posts to permanent decentralized storage and replies with a
//! link to the archived copy.

#![allow(clippy::needless_raw_string_hashes)]

pub mod archiver;
pub mod commentary;
pub mod config;
pub mod constants;
pub mod db;
pub mod processors;
pub mod reply;
pub mod scheduler;
pub mod storage;
pub mod thread;
pub mod twitter;

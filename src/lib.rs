//! MemoryVault: a local catalog of personal media.
//!
//! Files picked by the user are copied into an archive directory and
//! described by rows in a SQLite database (titles, dates, tags, people,
//! collections). The UI shell talks to the catalog through [`ipc`].

pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod storage;

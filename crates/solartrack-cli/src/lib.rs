//! Command-line front end: offline diffing and cell lookups, change log
//! inspection and the long-running `watch` poller.

pub mod cli;

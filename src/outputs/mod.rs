//! Files written after a crawl finishes.
//!
//! The output table itself is appended during the crawl by
//! [`crate::sink::RecordSink`]; this module only holds the end-of-run
//! artifacts.
//!
//! # Submodules
//!
//! - [`json`]: per-outlet crawl report (`<sanitised-domain>_crawl.json`)

pub mod json;

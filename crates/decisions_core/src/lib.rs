//! Harvesting of municipal decision records from the Ahjo open-data archive.

pub mod changes;
pub mod config;
pub mod datetime;
pub mod db;
pub mod dirlist;
pub mod fetch;
pub mod filename;
pub mod scanner;
pub mod schema;
pub mod sync;
pub mod xml;

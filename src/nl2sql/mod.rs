// SPDX-License-Identifier: MIT

//! Natural-language to SQL application layer

pub mod config;
pub mod db;
pub mod examples;
pub mod formatter;
pub mod memory;
pub mod resolver;
pub mod schema;
pub mod sql;
pub mod workflow;

// SPDX-License-Identifier: MIT

pub mod adk;
pub mod nl2sql;

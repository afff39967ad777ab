// SPDX-License-Identifier: MIT

pub mod builder;
pub mod graph;
pub mod state;

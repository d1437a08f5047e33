// SPDX-License-Identifier: MIT

//! Operator CLI for the jobmesh connection fabric: a thin HTTP client
//! over `jobmesh-api`'s REST routes.

pub mod cli;
pub mod client;
pub mod color;
pub mod commands;
pub mod env;
pub mod error;
pub mod output;

// SPDX-License-Identifier: MIT

//! Fatal-invariant containment.
//!
//! A duplicate terminal transition, or any other assertion of a broken
//! cross-process invariant, is not recoverable in-process: the state in
//! the Shared State Store is trusted over in-memory assumptions, so we
//! log a structured event and let a supervisor restart the process.
//! Data state remains consistent because every transition that
//! matters was applied atomically against the SSS.

/// Log a structured fatal event and exit the process.
///
/// Never returns. Call this only when a broken invariant has been
/// detected and continuing to run risks corrupting visible state.
pub fn crash(context: &str, message: &str) -> ! {
    tracing::error!(fatal = true, context, message, "unrecoverable invariant violation");
    std::process::exit(1);
}

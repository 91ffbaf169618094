// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Isolated tool runtime: child-process sandboxing for high-risk tools.

pub mod breaker;
pub mod runtime;
pub mod worker;

pub use breaker::CircuitBreaker;
pub use runtime::IsolatedToolRuntime;
pub use worker::{
    FsWriteRequest, ShellExecRequest, WebFetchRequest, WorkerRequest, WorkerResponse, execute,
    run_worker,
};

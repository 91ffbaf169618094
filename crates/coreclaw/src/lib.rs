// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coreclaw application wiring, exposed as a library for the binary and
//! the end-to-end tests.

pub mod app;
pub mod cli;

pub use app::CoreclawApp;

// Copyright 2026 Chainscrape Contributors
// SPDX-License-Identifier: Apache-2.0

//! chainscrape runtime library: captures an options chain from a live page
//! and normalizes it into a side-by-side strike table.
//!
//! The crate is layered bottom-up: [`chain`] turns raw payloads and markup
//! into an [`chain::OptionChain`], [`capture`] waits for the data response in
//! a [`renderer::RenderContext`], and [`scrape`] ties one request to one
//! browser session.

pub mod capture;
pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod renderer;
pub mod rest;
pub mod scrape;
pub mod session;

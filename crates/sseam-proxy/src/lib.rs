//! Sseam - SSE-normalizing HTTP proxy for strict streaming chat clients.
//!
//! Some OpenAI-compatible upstreams emit Server-Sent-Events that strict
//! downstream parsers reject: `data:` lines missing the space after the
//! field name, tool-call deltas without the mandatory `index`, and a
//! hardcoded `gpt-4o-mini` fast-model name. This crate proxies the whole
//! HTTP surface to the upstream and repairs the stream in flight.
//!
//! Design goals:
//! - Forward any method and path verbatim, injecting upstream auth.
//! - Rewrite `text/event-stream` responses event-by-event, preserving
//!   everything the fixes do not touch.
//! - Pass upstream errors and non-streaming bodies through untouched.

pub mod config;
pub mod rewrite;
pub mod server;
pub mod streaming;

pub use config::ProxyConfig;
pub use server::{bind, serve};

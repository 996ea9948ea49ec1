//! Shared fixtures for the integration suites.
//!
//! - [`rpc_mock`]: mockito-backed upstream speaking Solana JSON-RPC, for
//!   tests that go through the real HTTP client.
//! - [`scripted`]: an in-process [`UpstreamTransport`] with per-URL replies
//!   and a call log.
//! - [`test_helpers`]: the [`TestEdge`] engine harness and request builders.
//!
//! [`UpstreamTransport`]: sanctos_core::upstream::UpstreamTransport
//! [`TestEdge`]: test_helpers::TestEdge


pub use rpc_mock::RpcMockBuilder;
pub use scripted::ScriptedTransport;
pub use test_helpers::{body_json, cache_tag, header, rpc_batch, rpc_call, TestEdge};

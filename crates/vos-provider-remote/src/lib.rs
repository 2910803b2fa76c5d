//! Remote client-trait providers (§6): two namespaces backed by a small
//! client trait rather than a concrete transport, so the provider itself
//! stays agnostic to what protocol the remote service actually speaks:
//! `object` wraps a key/value object service, `tool` wraps a tool-call /
//! resource server of the kind `stencila-agents::mcp` connects to.

mod object;
mod tool;

pub use object::{AuthHeader, HttpObjectClient, InMemoryObjectClient, ObjectClient, ObjectMeta, RemoteObjectProvider};
pub use tool::{ResourceInfo, RemoteToolProvider, StaticToolClient, ToolCallResult, ToolClient, ToolInfo, sanitize_name};

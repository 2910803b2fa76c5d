//! The remote tool/resource-server provider (§6): projects a remote
//! tool-call / resource server (the kind `stencila-agents::mcp` connects to
//! via its `ConnectionPool`) as a read-only, executable namespace:
//! `/tools/<name>` and `/resources/<slug>`. `GetPrompt` is part of the
//! client contract (§6 lists it among the methods a tool-server client
//! needs) but is not itself projected into the namespace: a caller that
//! wants rendered prompt text calls [`ToolClient::get_prompt`] directly.
//!
//! Grounded on `stencila-agents::mcp::register_mcp_tools`: tool metadata is
//! discovered once (here, via [`RemoteToolProvider::refresh`], mirroring
//! that function's per-server `tools()` call) and cached; `sanitize_name`
//! below mirrors that module's `sanitize_for_tool_name`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use vos_provider::{
    ByteReader, Entry, Environment, Executable, ListOptions, Permission, Provider, Readable,
    VfsError, VfsFile, VfsResult,
};

/// One tool's metadata, as reported by [`ToolClient::list_tools`].
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// The result of a completed tool call.
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    pub content: String,
    pub is_error: bool,
}

/// One resource's metadata, as reported by [`ToolClient::list_resources`].
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    pub mime_type: Option<String>,
}

/// The contract a remote tool/resource server must satisfy (§6: "a small
/// set of methods … `CallTool`, `GetPrompt`, …"). Transport is the
/// implementer's choice; no bundled HTTP/JSON-RPC client ships here since
/// the wire format of a specific tool server is explicitly out of scope
/// (§1).
#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn list_tools(&self) -> VfsResult<Vec<ToolInfo>>;
    async fn call_tool(&self, name: &str, args: serde_json::Value) -> VfsResult<ToolCallResult>;
    async fn list_resources(&self) -> VfsResult<Vec<ResourceInfo>>;
    async fn read_resource(&self, uri: &str) -> VfsResult<Vec<u8>>;
    async fn get_prompt(&self, name: &str, args: serde_json::Value) -> VfsResult<String>;
}

/// Replace every character outside `[a-zA-Z0-9_]` with `_`, mirroring
/// `stencila-agents::mcp::sanitize_for_tool_name` so a tool or resource
/// name with slashes, dots, or hyphens still becomes a valid single path
/// segment.
#[must_use]
pub fn sanitize_name(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

enum Kind {
    Tool(ToolInfo),
    Resource(ResourceInfo),
}

/// Caches tool and resource metadata from `C: ToolClient` and exposes them
/// as a namespace: `/tools/<name>` are executable (and readable, returning
/// a synthetic help document, mirroring the in-memory provider's
/// function-entry convention, §4.4), `/resources/<slug>` are readable.
pub struct RemoteToolProvider<C: ToolClient> {
    client: C,
    entries: RwLock<HashMap<String, Kind>>,
}

impl<C: ToolClient> RemoteToolProvider<C> {
    #[must_use]
    pub fn new(client: C) -> Self {
        RemoteToolProvider {
            client,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Discover tools and resources from the remote server and replace the
    /// cached registry. Call once at startup and again whenever the caller
    /// wants to pick up server-side additions (no background poll is
    /// specified for this provider, unlike the HTTP-polling one).
    pub async fn refresh(&self) -> VfsResult<()> {
        let mut next = HashMap::new();

        for info in self.client.list_tools().await? {
            let slug = sanitize_name(&info.name);
            next.insert(format!("tools/{slug}"), Kind::Tool(info));
        }
        for info in self.client.list_resources().await? {
            let slug = sanitize_name(&info.name);
            next.insert(format!("resources/{slug}"), Kind::Resource(info));
        }

        *self.entries.write() = next;
        Ok(())
    }

    fn tool_help(info: &ToolInfo) -> String {
        format!("{} - {}\nUsage: {} [json-args]\nSchema: {}\n", info.name, info.description, info.name, info.input_schema)
    }
}

fn key(path: &str) -> String {
    vos_path::normalize(path).trim_start_matches('/').to_string()
}

fn display_path(k: &str) -> String {
    if k.is_empty() {
        "/".to_string()
    } else {
        format!("/{k}")
    }
}

/// Parse a tool's CLI-style argument vector into the JSON object
/// `call_tool` expects: a single argument that parses as JSON is passed
/// through verbatim; otherwise `key=value` pairs build an object, and bare
/// words are collected under `"args"`.
fn parse_call_args(args: &[String]) -> serde_json::Value {
    if args.len() == 1 {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&args[0]) {
            return v;
        }
    }
    let mut object = serde_json::Map::new();
    let mut bare = Vec::new();
    for arg in args {
        if let Some((k, v)) = arg.split_once('=') {
            object.insert(k.to_string(), serde_json::Value::String(v.to_string()));
        } else {
            bare.push(serde_json::Value::String(arg.clone()));
        }
    }
    if !bare.is_empty() {
        object.insert("args".to_string(), serde_json::Value::Array(bare));
    }
    serde_json::Value::Object(object)
}

#[async_trait]
impl<C: ToolClient> Provider for RemoteToolProvider<C> {
    async fn stat(&self, path: &str) -> VfsResult<Entry> {
        let k = key(path);
        if k.is_empty() || k == "tools" || k == "resources" {
            return Ok(Entry::dir(display_path(&k), Permission::RX));
        }
        let entries = self.entries.read();
        match entries.get(&k) {
            Some(Kind::Tool(_)) => Ok(Entry::file(display_path(&k), Permission::RX, 0)),
            Some(Kind::Resource(info)) => {
                let mut entry = Entry::file(display_path(&k), Permission::RO, 0);
                if let Some(mime) = &info.mime_type {
                    entry = entry.with_mime_type(mime.clone());
                }
                Ok(entry)
            }
            None => Err(VfsError::not_found(display_path(&k))),
        }
    }

    async fn list(&self, path: &str, opts: &ListOptions) -> VfsResult<Vec<Entry>> {
        let k = key(path);
        let entries = self.entries.read();
        let mut out = Vec::new();
        if k.is_empty() {
            if entries.keys().any(|e| e.starts_with("tools/")) {
                out.push(Entry::dir("/tools", Permission::RX));
            }
            if entries.keys().any(|e| e.starts_with("resources/")) {
                out.push(Entry::dir("/resources", Permission::RX));
            }
        } else {
            let prefix = format!("{k}/");
            for (full_key, kind) in entries.iter() {
                if full_key.strip_prefix(prefix.as_str()).is_some() {
                    let path = display_path(full_key);
                    out.push(match kind {
                        Kind::Tool(_) => Entry::file(path, Permission::RX, 0),
                        Kind::Resource(_) => Entry::file(path, Permission::RO, 0),
                    });
                }
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(max) = opts.max_results {
            out.truncate(max);
        }
        Ok(out)
    }

    fn as_readable(&self) -> Option<&dyn Readable> {
        Some(self)
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

enum OpenTarget {
    Help(String),
    ResourceUri(String),
}

#[async_trait]
impl<C: ToolClient> Readable for RemoteToolProvider<C> {
    async fn open(&self, path: &str) -> VfsResult<VfsFile> {
        let k = key(path);
        let target = {
            let entries = self.entries.read();
            match entries.get(&k) {
                Some(Kind::Tool(info)) => OpenTarget::Help(Self::tool_help(info)),
                Some(Kind::Resource(info)) => OpenTarget::ResourceUri(info.uri.clone()),
                None => return Err(VfsError::not_found(display_path(&k))),
            }
        };
        let bytes = match target {
            OpenTarget::Help(help) => help.into_bytes(),
            OpenTarget::ResourceUri(uri) => self.client.read_resource(&uri).await?,
        };
        Ok(VfsFile::from_reader(display_path(&k), Box::new(std::io::Cursor::new(bytes))))
    }
}

#[async_trait]
impl<C: ToolClient> Executable for RemoteToolProvider<C> {
    async fn exec(&self, path: &str, args: Vec<String>, _stdin: Option<ByteReader>, _env: &Environment) -> VfsResult<ByteReader> {
        let k = key(path);
        let kind = {
            let entries = self.entries.read();
            match entries.get(&k) {
                Some(Kind::Tool(info)) => info.name.clone(),
                Some(Kind::Resource(_)) => {
                    return Err(VfsError::NotExecutable { path: display_path(&k) });
                }
                None => return Err(VfsError::not_found(display_path(&k))),
            }
        };
        let args_json = parse_call_args(&args);
        let result = self.client.call_tool(&kind, args_json).await?;
        if result.is_error {
            return Err(VfsError::Other { message: result.content });
        }
        Ok(Box::new(std::io::Cursor::new(result.content.into_bytes())))
    }
}

/// An in-memory [`ToolClient`] used by tests: a fixed registry of tools and
/// resources plus a recorded call log, so tests can assert both the
/// namespace shape and the arguments a call received.
pub struct StaticToolClient {
    tools: Vec<ToolInfo>,
    resources: Vec<(ResourceInfo, Vec<u8>)>,
    responses: HashMap<String, String>,
}

impl StaticToolClient {
    #[must_use]
    pub fn new() -> Self {
        StaticToolClient {
            tools: Vec::new(),
            resources: Vec::new(),
            responses: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_tool(mut self, name: impl Into<String>, description: impl Into<String>, response: impl Into<String>) -> Self {
        let name = name.into();
        self.responses.insert(name.clone(), response.into());
        self.tools.push(ToolInfo {
            name,
            description: description.into(),
            input_schema: serde_json::json!({}),
        });
        self
    }

    #[must_use]
    pub fn with_resource(mut self, uri: impl Into<String>, name: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.resources.push((
            ResourceInfo {
                uri: uri.into(),
                name: name.into(),
                mime_type: None,
            },
            body.into(),
        ));
        self
    }
}

impl Default for StaticToolClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolClient for StaticToolClient {
    async fn list_tools(&self) -> VfsResult<Vec<ToolInfo>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, _args: serde_json::Value) -> VfsResult<ToolCallResult> {
        match self.responses.get(name) {
            Some(body) => Ok(ToolCallResult { content: body.clone(), is_error: false }),
            None => Err(VfsError::not_found(format!("/tools/{name}"))),
        }
    }

    async fn list_resources(&self) -> VfsResult<Vec<ResourceInfo>> {
        Ok(self.resources.iter().map(|(info, _)| info.clone()).collect())
    }

    async fn read_resource(&self, uri: &str) -> VfsResult<Vec<u8>> {
        self.resources
            .iter()
            .find(|(info, _)| info.uri == uri)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| VfsError::not_found(uri))
    }

    async fn get_prompt(&self, name: &str, _args: serde_json::Value) -> VfsResult<String> {
        Err(VfsError::not_supported(format!("/prompts/{name}"), "get_prompt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn provider() -> RemoteToolProvider<StaticToolClient> {
        let client = StaticToolClient::new()
            .with_tool("search-web", "search the web", "no results")
            .with_resource("file:///readme", "readme", b"hello".to_vec());
        let p = RemoteToolProvider::new(client);
        p.refresh().await.unwrap();
        p
    }

    #[tokio::test]
    async fn list_root_shows_tools_and_resources_dirs() {
        let p = provider().await;
        let entries = p.list("", &ListOptions::default()).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["resources", "tools"]);
    }

    #[tokio::test]
    async fn exec_on_registered_tool_calls_through() {
        let p = provider().await;
        let mut out = p.exec("tools/search_web", vec!["q=rust".to_string()], None, &Environment::new()).await.unwrap();
        let mut buf = Vec::new();
        use tokio::io::AsyncReadExt;
        out.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"no results");
    }

    #[tokio::test]
    async fn open_on_resource_reads_its_body() {
        let p = provider().await;
        let mut f = p.as_readable().unwrap().open("resources/readme").await.unwrap();
        assert_eq!(f.read_to_end().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn open_on_tool_returns_synthetic_help() {
        let p = provider().await;
        let mut f = p.as_readable().unwrap().open("tools/search_web").await.unwrap();
        let help = String::from_utf8(f.read_to_end().await.unwrap()).unwrap();
        assert!(help.contains("search-web"));
        assert!(help.contains("Usage"));
    }

    #[test]
    fn sanitize_name_replaces_non_word_chars() {
        assert_eq!(sanitize_name("search-web.v2"), "search_web_v2");
    }

    #[test]
    fn parse_call_args_prefers_a_single_json_argument() {
        let v = parse_call_args(&["{\"q\":\"rust\"}".to_string()]);
        assert_eq!(v, serde_json::json!({"q": "rust"}));
    }

    #[test]
    fn parse_call_args_builds_object_from_key_value_pairs() {
        let v = parse_call_args(&["q=rust".to_string(), "bare".to_string()]);
        assert_eq!(v["q"], "rust");
        assert_eq!(v["args"][0], "bare");
    }
}

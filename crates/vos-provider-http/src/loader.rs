//! Declarative loaders that translate a document into `Add` calls (§4.7).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::parser::Parser;
use crate::source::SourceConfig;
use crate::HttpProvider;

/// Recognizable name/id fields, tried in order, used by both loaders when
/// inferring a JSON parser from a schema (§4.7 OpenAPI loader).
const NAME_FIELDS: &[&str] = &["name", "title", "username", "label", "slug"];
const ID_FIELDS: &[&str] = &["id", "_id", "uuid", "key"];

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Consume a schema document
/// `{baseURL, defaults: {headers}, sources: {<name>: {url|path, headers,
/// parser: {...}}}}` and register one source per entry (§4.7 Schema
/// loader).
pub async fn load_schema(provider: &Arc<HttpProvider>, doc: &Value) {
    let base_url = doc.get("baseURL").and_then(Value::as_str).unwrap_or("");
    let default_headers = doc
        .get("defaults")
        .and_then(|d| d.get("headers"))
        .and_then(Value::as_object)
        .map(|m| headers_from_object(m))
        .unwrap_or_default();

    let Some(sources) = doc.get("sources").and_then(Value::as_object) else {
        return;
    };

    for (name, spec) in sources {
        let url = if let Some(url) = spec.get("url").and_then(Value::as_str) {
            url.to_string()
        } else if let Some(path) = spec.get("path").and_then(Value::as_str) {
            join_url(base_url, path)
        } else {
            continue;
        };

        let mut headers = default_headers.clone();
        if let Some(obj) = spec.get("headers").and_then(Value::as_object) {
            headers.extend(headers_from_object(obj));
        }

        let parser = spec.get("parser").map_or(Parser::Auto, parse_parser_spec);

        provider
            .add(SourceConfig { name: name.clone(), url, parser, headers }, None)
            .await;
    }
}

fn headers_from_object(obj: &serde_json::Map<String, Value>) -> HashMap<String, String> {
    obj.iter()
        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
        .collect()
}

fn parse_parser_spec(spec: &Value) -> Parser {
    match spec.get("type").and_then(Value::as_str) {
        Some("rss") | Some("atom") | Some("rssAtom") => Parser::RssAtom,
        Some("json") => Parser::json(
            str_field(spec, "arrayField"),
            str_field(spec, "nameField"),
            str_field(spec, "idField"),
        ),
        Some("raw") => Parser::Raw { filename: str_field(spec, "filename") },
        _ => Parser::Auto,
    }
}

fn str_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(ToString::to_string)
}

/// Walk `paths.*.get` of an OpenAPI 3 document and register one source per
/// non-parameterized path, inferring the parser from the 200 response
/// schema (§4.7 OpenAPI loader).
pub async fn load_openapi(provider: &Arc<HttpProvider>, doc: &Value, base_url: &str) {
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return;
    };

    for (path, item) in paths {
        if path.contains('{') {
            continue;
        }
        let Some(get) = item.get("get") else { continue };

        let name = path.trim_start_matches('/').replace('/', "-");
        let name = if name.is_empty() { "root".to_string() } else { name };
        let url = join_url(base_url, path);
        let parser = infer_parser_from_operation(get, doc);

        provider
            .add(SourceConfig { name, url, parser, headers: HashMap::new() }, None)
            .await;
    }
}

fn response_schema<'a>(operation: &'a Value, doc: &'a Value) -> Option<&'a Value> {
    let schema = operation
        .get("responses")
        .and_then(|r| r.get("200"))
        .and_then(|r| r.get("content"))
        .and_then(|c| c.get("application/json"))
        .and_then(|c| c.get("schema"))?;
    resolve_ref(schema, doc)
}

/// Single-level `$ref` resolution against `#/components/schemas/...`
/// (§4.7: "Single-level `$ref` resolution … is required").
fn resolve_ref<'a>(schema: &'a Value, doc: &'a Value) -> Option<&'a Value> {
    match schema.get("$ref").and_then(Value::as_str) {
        Some(reference) => {
            let name = reference.rsplit('/').next()?;
            doc.get("components")?.get("schemas")?.get(name)
        }
        None => Some(schema),
    }
}

fn infer_parser_from_operation(operation: &Value, doc: &Value) -> Parser {
    let Some(schema) = response_schema(operation, doc) else {
        return Parser::Auto;
    };

    if schema.get("type").and_then(Value::as_str) == Some("array") {
        let item_schema = schema.get("items").and_then(|items| resolve_ref(items, doc));
        let properties = item_schema.and_then(|s| s.get("properties")).and_then(Value::as_object);

        let Some(properties) = properties else {
            return Parser::json(None, None, None);
        };
        let name_field = NAME_FIELDS.iter().find(|f| properties.contains_key(**f)).map(|f| (*f).to_string());
        let id_field = ID_FIELDS.iter().find(|f| properties.contains_key(**f)).map(|f| (*f).to_string());
        return Parser::json(None, name_field, id_field);
    }

    if schema.get("type").and_then(Value::as_str) == Some("object") {
        return Parser::Raw { filename: None };
    }

    Parser::Auto
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn schema_loader_registers_each_source() {
        let provider = Arc::new(HttpProvider::new());
        let doc = json!({
            "baseURL": "https://example.test",
            "sources": {
                "posts": {"path": "/posts", "parser": {"type": "rss"}},
                "raw": {"url": "https://other.test/data", "parser": {"type": "raw"}}
            }
        });
        load_schema(&provider, &doc).await;
        assert_eq!(provider.sources.lock().await.len(), 2);
    }

    #[test]
    fn infers_json_parser_with_name_and_id_fields() {
        let doc = json!({
            "components": {"schemas": {"Item": {"type": "object", "properties": {"id": {}, "title": {}}}}},
            "paths": {}
        });
        let operation = json!({
            "responses": {"200": {"content": {"application/json": {"schema": {
                "type": "array",
                "items": {"$ref": "#/components/schemas/Item"}
            }}}}}
        });
        let parser = infer_parser_from_operation(&operation, &doc);
        match parser {
            Parser::Json { name_field, id_field, .. } => {
                assert_eq!(name_field.as_deref(), Some("title"));
                assert_eq!(id_field.as_deref(), Some("id"));
            }
            other => panic!("expected Json parser, got {other:?}"),
        }
    }

    #[test]
    fn object_response_infers_raw() {
        let doc = json!({});
        let operation = json!({
            "responses": {"200": {"content": {"application/json": {"schema": {"type": "object"}}}}}
        });
        assert_eq!(infer_parser_from_operation(&operation, &doc), Parser::Raw { filename: None });
    }

    #[test]
    fn parameterized_paths_are_not_walked() {
        assert!("/users/{id}".contains('{'));
    }
}

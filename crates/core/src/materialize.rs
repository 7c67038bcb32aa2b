//! Request materialization.
//!
//! Turns a [`ParameterSchema`] plus [`CallArgs`] into a [`MaterializedRequest`]
//! addressed at the configured base URL. Pure: no I/O, no clock, same inputs
//! give byte-identical output.
//!
//! ```text
//! args ──► path slots ──► url (base path + concrete path, merged query)
//!      ──► headers (+ Cookies, Content-Type, minus delivery headers)
//!      ──► body (checked against the declared type, canonical JSON)
//! ```

use std::collections::BTreeMap;

use serde_json::Value;
use url::Url;
use url::form_urlencoded;

use crate::args::CallArgs;
use crate::canonical::to_canonical_vec;
use crate::converter::scalar_to_string;
use crate::error::{MaterializeError, MaterializeResult};
use crate::request::MaterializedRequest;
use crate::schema::{Param, ParamKind, ParameterSchema};
use crate::template::Segment;

/// Headers with this prefix are set by the queue on delivery and are never
/// forwarded when a request is materialized.
pub const DELIVERY_HEADER_PREFIX: &str = "x-cloudtasks-";

/// Name of the single header cookie parameters are folded into.
pub const COOKIE_HEADER: &str = "Cookies";

pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Materializes requests against one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMaterializer {
    base_url: Url,
}

impl RequestMaterializer {
    pub fn new(base_url: &str) -> MaterializeResult<Self> {
        let invalid = |reason: String| MaterializeError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };

        let mut url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("not a hierarchical url".to_string()));
        }
        url.set_fragment(None);

        Ok(Self { base_url: url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn materialize(
        &self,
        schema: &ParameterSchema,
        args: &CallArgs,
    ) -> MaterializeResult<MaterializedRequest> {
        let url = self.url(schema, args)?;
        let headers = headers(schema, args)?;
        let body = body(schema, args)?;

        Ok(MaterializedRequest {
            method: schema.method(),
            url,
            headers,
            body,
        })
    }

    fn url(&self, schema: &ParameterSchema, args: &CallArgs) -> MaterializeResult<String> {
        let path = concrete_path(schema, args)?;

        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_matches('/'),
            path.trim_matches('/')
        );
        if joined.starts_with('/') {
            url.set_path(&joined);
        } else {
            url.set_path(&format!("/{joined}"));
        }

        let mut query = QueryMap::parse(url.query().unwrap_or_default());
        for param in schema.params().iter().filter(|p| p.kind == ParamKind::Query) {
            if let Some(values) = query_values(param, args)? {
                query.set(&param.alias, values);
            }
        }
        url.set_query(None);
        if !query.is_empty() {
            url.set_query(Some(&query.encode()));
        }

        Ok(url.into())
    }
}

/// One-shot form of [`RequestMaterializer::materialize`].
pub fn materialize(
    schema: &ParameterSchema,
    base_url: &str,
    args: &CallArgs,
) -> MaterializeResult<MaterializedRequest> {
    RequestMaterializer::new(base_url)?.materialize(schema, args)
}

fn lookup<'a>(param: &'a Param, args: &'a CallArgs) -> Option<&'a Value> {
    args.get(&param.name).or(param.default.as_ref())
}

fn concrete_path(schema: &ParameterSchema, args: &CallArgs) -> MaterializeResult<String> {
    let mut path = String::new();
    for segment in schema.template().segments() {
        match segment {
            Segment::Literal(text) => path.push_str(text),
            Segment::Slot { name, converter } => {
                let param = schema
                    .path_params()
                    .find(|p| &p.name == name)
                    .ok_or_else(|| MaterializeError::missing(name.as_str()))?;
                let value = lookup(param, args).ok_or_else(|| MaterializeError::missing(name.as_str()))?;
                path.push_str(&converter.convert(name, value)?);
            }
        }
    }
    Ok(path)
}

fn query_values(param: &Param, args: &CallArgs) -> MaterializeResult<Option<Vec<String>>> {
    let Some(value) = lookup(param, args) else {
        if param.required {
            return Err(MaterializeError::missing(&param.name));
        }
        return Ok(None);
    };

    let values = match value {
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| scalar_to_string(v).ok_or_else(|| MaterializeError::invalid_type(&param.name, "scalar or list of scalars")))
            .collect::<MaterializeResult<Vec<_>>>()?,
        other => vec![
            scalar_to_string(other).ok_or_else(|| MaterializeError::invalid_type(&param.name, "scalar or list of scalars"))?,
        ],
    };
    Ok(Some(values))
}

fn headers(schema: &ParameterSchema, args: &CallArgs) -> MaterializeResult<BTreeMap<String, String>> {
    let mut headers = BTreeMap::new();
    let mut cookies = Vec::new();

    for param in schema.params() {
        match param.kind {
            ParamKind::Header => {
                if is_delivery_header(&param.alias) {
                    continue;
                }
                let Some(value) = lookup(param, args) else {
                    if param.required {
                        return Err(MaterializeError::missing(&param.name));
                    }
                    continue;
                };
                let text = match value {
                    Value::Array(items) => items
                        .iter()
                        .map(|v| scalar_to_string(v).ok_or_else(|| MaterializeError::invalid_type(&param.name, "scalar")))
                        .collect::<MaterializeResult<Vec<_>>>()?
                        .join(", "),
                    other => scalar_to_string(other)
                        .ok_or_else(|| MaterializeError::invalid_type(&param.name, "scalar"))?,
                };
                headers.insert(param.alias.clone(), text);
            }
            ParamKind::Cookie => {
                let Some(value) = lookup(param, args) else {
                    if param.required {
                        return Err(MaterializeError::missing(&param.name));
                    }
                    continue;
                };
                let text = scalar_to_string(value)
                    .ok_or_else(|| MaterializeError::invalid_type(&param.name, "scalar"))?;
                cookies.push(format!("{}={}", param.alias, text));
            }
            ParamKind::Path(_) | ParamKind::Query => {}
        }
    }

    if !cookies.is_empty() {
        headers.insert(COOKIE_HEADER.to_string(), cookies.join("; "));
    }
    headers.retain(|k, _| !k.eq_ignore_ascii_case(CONTENT_TYPE_HEADER));
    headers.insert(CONTENT_TYPE_HEADER.to_string(), JSON_CONTENT_TYPE.to_string());

    Ok(headers)
}

fn body(schema: &ParameterSchema, args: &CallArgs) -> MaterializeResult<Option<Vec<u8>>> {
    let Some(body) = schema.body() else {
        return Ok(None);
    };

    let value = match (args.get(&body.name), &body.default) {
        (Some(value), _) => body
            .ty
            .check(value.clone())
            .map_err(|_| MaterializeError::wrong_type(&body.name, body.ty.name()))?,
        (None, _) if body.required => return Err(MaterializeError::missing(&body.name)),
        (None, Some(default)) => default.clone(),
        (None, None) => return Ok(None),
    };

    Ok(Some(to_canonical_vec(&value)?))
}

/// Whether a header name belongs to the queue's delivery metadata.
pub fn is_delivery_header(name: &str) -> bool {
    name.to_ascii_lowercase()
        .replace('_', "-")
        .starts_with(DELIVERY_HEADER_PREFIX)
}

/// Insertion-ordered query mapping; setting a key replaces all its values.
#[derive(Debug, Default)]
struct QueryMap {
    entries: Vec<(String, Vec<String>)>,
}

impl QueryMap {
    /// Blank values in the base query are dropped.
    fn parse(query: &str) -> Self {
        let mut map = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            match map.entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, values)) => values.push(value.into_owned()),
                None => map.entries.push((key.into_owned(), vec![value.into_owned()])),
            }
        }
        map
    }

    fn set(&mut self, key: &str, values: Vec<String>) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((key.to_string(), values)),
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, v)| v.is_empty())
    }

    fn encode(&self) -> String {
        let mut out = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.entries {
            for value in values {
                out.append_pair(key, value);
            }
        }
        out.finish()
    }
}

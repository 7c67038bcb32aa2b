//! Declarative description of a handler's parameters.
//!
//! A [`ParameterSchema`] is built once per handler, validated at construction
//! and read-only afterwards. Parameter kinds are a closed set ([`ParamKind`]);
//! the materializer matches on it exhaustively.

use std::collections::BTreeSet;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::converter::PathConverter;
use crate::error::SchemaError;
use crate::method::HttpMethod;
use crate::template::PathTemplate;

/// Where a parameter lives on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Path(PathConverter),
    Query,
    Header,
    Cookie,
}

/// A non-body parameter.
///
/// `name` is the key looked up in the call arguments, `alias` is the name
/// used on the wire (query key, header name, cookie name).
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub alias: String,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl Param {
    /// A path parameter. Its converter is taken from the template slot.
    pub fn path(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            kind: ParamKind::Path(PathConverter::default()),
            required: true,
            default: None,
        }
    }

    pub fn query(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            kind: ParamKind::Query,
            required: false,
            default: None,
        }
    }

    /// A header parameter. The wire name defaults to `name` with `_` as `-`.
    pub fn header(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.replace('_', "-"),
            name,
            kind: ParamKind::Header,
            required: false,
            default: None,
        }
    }

    pub fn cookie(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            kind: ParamKind::Cookie,
            required: false,
            default: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_path(&self) -> bool {
        matches!(self.kind, ParamKind::Path(_))
    }
}

/// The declared type of a body parameter.
///
/// Checking a value decodes it into the type and re-encodes it, so the body
/// that goes on the wire is exactly what the handler would deserialize.
#[derive(Clone, Copy)]
pub struct BodyType {
    name: &'static str,
    check: fn(Value) -> Result<Value, serde_json::Error>,
}

impl BodyType {
    pub fn of<T: Serialize + DeserializeOwned>() -> Self {
        Self {
            name: short_type_name::<T>(),
            check: round_trip::<T>,
        }
    }

    /// Accepts any JSON value unchanged.
    pub fn any() -> Self {
        Self {
            name: "json",
            check: Ok,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn check(&self, value: Value) -> Result<Value, serde_json::Error> {
        (self.check)(value)
    }
}

impl core::fmt::Debug for BodyType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BodyType").field("name", &self.name).finish()
    }
}

fn round_trip<T: Serialize + DeserializeOwned>(value: Value) -> Result<Value, serde_json::Error> {
    let typed: T = serde_json::from_value(value)?;
    serde_json::to_value(&typed)
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    // `alloc::vec::Vec<my::Item>` keeps its generics; plain paths lose the module.
    if full.contains('<') {
        full
    } else {
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// The body parameter, at most one per handler.
#[derive(Debug, Clone)]
pub struct BodyParam {
    pub name: String,
    pub required: bool,
    pub default: Option<Value>,
    pub ty: BodyType,
}

impl BodyParam {
    pub fn required<T: Serialize + DeserializeOwned>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            default: None,
            ty: BodyType::of::<T>(),
        }
    }

    /// Optional body with no default: absent arguments produce no body.
    pub fn optional<T: Serialize + DeserializeOwned>(name: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required::<T>(name)
        }
    }

    /// Optional body falling back to `default` when the argument is absent.
    pub fn with_default<T: Serialize + DeserializeOwned>(
        name: impl Into<String>,
        default: &T,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let default = serde_json::to_value(default).map_err(|e| SchemaError::InvalidDefault {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            default: Some(default),
            ..Self::optional::<T>(name)
        })
    }

    /// Body accepting arbitrary JSON.
    pub fn json(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            required,
            default: None,
            ty: BodyType::any(),
        }
    }
}

/// Everything the materializer needs to know about one handler.
#[derive(Debug, Clone)]
pub struct ParameterSchema {
    unique_id: String,
    method: HttpMethod,
    template: PathTemplate,
    params: Vec<Param>,
    body: Option<BodyParam>,
}

impl ParameterSchema {
    pub fn builder(
        unique_id: impl Into<String>,
        method: HttpMethod,
        path_template: impl Into<String>,
    ) -> SchemaBuilder {
        SchemaBuilder {
            unique_id: unique_id.into(),
            methods: vec![method.as_str().to_string()],
            template: path_template.into(),
            params: Vec::new(),
            body: None,
        }
    }

    /// Builder for a route registered with an arbitrary verb list; `build`
    /// rejects anything other than exactly one supported verb.
    pub fn for_route<I, S>(
        unique_id: impl Into<String>,
        methods: I,
        path_template: impl Into<String>,
    ) -> SchemaBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SchemaBuilder {
            unique_id: unique_id.into(),
            methods: methods.into_iter().map(Into::into).collect(),
            template: path_template.into(),
            params: Vec::new(),
            body: None,
        }
    }

    /// Stable handler identity; default name for scheduled jobs.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn body(&self) -> Option<&BodyParam> {
        self.body.as_ref()
    }

    /// Path parameters in template slot order.
    pub fn path_params(&self) -> impl Iterator<Item = &Param> {
        self.template
            .slots()
            .filter_map(move |(slot, _)| self.params.iter().find(|p| p.is_path() && p.name == slot))
    }
}

/// Collects parameters and validates them on [`SchemaBuilder::build`].
#[derive(Debug)]
pub struct SchemaBuilder {
    unique_id: String,
    methods: Vec<String>,
    template: String,
    params: Vec<Param>,
    body: Option<BodyParam>,
}

impl SchemaBuilder {
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn body(mut self, body: BodyParam) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Result<ParameterSchema, SchemaError> {
        let method = HttpMethod::from_route_methods(&self.methods)?;
        let template = PathTemplate::parse(&self.template)?;

        let mut names = BTreeSet::new();
        for name in self
            .params
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.body.iter().map(|b| b.name.as_str()))
        {
            if !names.insert(name) {
                return Err(SchemaError::DuplicateParam(name.to_string()));
            }
        }

        for (slot, _) in template.slots() {
            if !self.params.iter().any(|p| p.is_path() && p.name == slot) {
                return Err(SchemaError::UnboundSlot(slot.to_string()));
            }
        }

        let mut params = self.params;
        for param in params.iter_mut() {
            if let ParamKind::Path(converter) = &mut param.kind {
                *converter = template
                    .converter_for(&param.name)
                    .ok_or_else(|| SchemaError::UnusedPathParam(param.name.clone()))?;
            }
        }

        Ok(ParameterSchema {
            unique_id: self.unique_id,
            method,
            template,
            params,
            body: self.body,
        })
    }
}

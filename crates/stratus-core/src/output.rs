//! Deferred output values
//!
//! Most attributes of a declared resource (ids, ARNs, endpoints) only exist
//! once the provisioning engine has applied it. An [`Output`] is either a
//! value that is already known, such as a config entry or an upstream stack
//! output, or a pending [`Expr`] the engine evaluates at apply time.
//!
//! Pending values serialize to a small JSON expression language:
//!
//! ```json
//! {"$ref": "eks-cluster.endpoint"}
//! {"$fn": "trimprefix", "args": [{"$ref": "eks-cluster.issuer"}, "https://"]}
//! {"$concat": ["arn:", {"$ref": "role.name"}]}
//! {"$entries": [[{"$ref": "oidc.url"}, "system:serviceaccount:ns:app"]]}
//! {"$secret": {"$ref": "db-password.result"}}
//! ```
//!
//! Secret-ness is sticky: any output derived from a secret is secret too.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::{CoreError, Result};

/// Key of the envelope wrapping secret values
pub const SECRET_KEY: &str = "$secret";
/// Placeholder shown instead of secret values
pub const MASK: &str = "[secret]";

const REF_KEY: &str = "$ref";
const FN_KEY: &str = "$fn";
const CONCAT_KEY: &str = "$concat";
const OBJECT_KEY: &str = "$object";
const ENTRIES_KEY: &str = "$entries";

/// Reference to an attribute of a declared resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrRef {
    pub resource: String,
    pub attribute: String,
}

impl AttrRef {
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }

    /// Parse `resource.attribute`; the attribute may itself contain dots
    pub fn parse(s: &str) -> Option<Self> {
        let (resource, attribute) = s.split_once('.')?;
        if resource.is_empty() || attribute.is_empty() {
            return None;
        }
        Some(Self::new(resource, attribute))
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// Functions the engine evaluates over pending values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `trimprefix(s, prefix)`
    TrimPrefix,
    /// `trimsuffix(s, suffix)`
    TrimSuffix,
    /// `after(s, sep)`: everything after the first `sep`
    After,
    /// `base64(s)`
    Base64,
    /// `jsonencode(value)`
    JsonEncode,
}

impl Function {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrimPrefix => "trimprefix",
            Self::TrimSuffix => "trimsuffix",
            Self::After => "after",
            Self::Base64 => "base64",
            Self::JsonEncode => "jsonencode",
        }
    }

    /// Evaluate over known arguments
    fn eval(&self, args: &[JsonValue]) -> JsonValue {
        let text = |i: usize| args.get(i).and_then(JsonValue::as_str).unwrap_or_default();
        match self {
            Self::TrimPrefix => {
                let s = text(0);
                JsonValue::String(s.strip_prefix(text(1)).unwrap_or(s).to_string())
            }
            Self::TrimSuffix => {
                let s = text(0);
                JsonValue::String(s.strip_suffix(text(1)).unwrap_or(s).to_string())
            }
            Self::After => {
                let s = text(0);
                let rest = s.split_once(text(1)).map(|(_, rest)| rest).unwrap_or(s);
                JsonValue::String(rest.to_string())
            }
            Self::Base64 => JsonValue::String(STANDARD.encode(text(0))),
            Self::JsonEncode => JsonValue::String(
                args.first()
                    .map(JsonValue::to_string)
                    .unwrap_or_else(|| "null".to_string()),
            ),
        }
    }
}

/// A value the engine computes at apply time
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ref(AttrRef),
    Literal(JsonValue),
    Call { function: Function, args: Vec<Expr> },
    Concat(Vec<Expr>),
    Object(IndexMap<String, Expr>),
    Array(Vec<Expr>),
    /// Object whose keys are computed too
    Entries(Vec<(Expr, Expr)>),
}

impl Expr {
    /// Wire form consumed by the engine
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Ref(r) => serde_json::json!({ REF_KEY: r.to_string() }),
            Self::Literal(v) => v.clone(),
            Self::Call { function, args } => serde_json::json!({
                FN_KEY: function.name(),
                "args": args.iter().map(Expr::to_json).collect::<Vec<_>>(),
            }),
            Self::Concat(parts) => serde_json::json!({
                CONCAT_KEY: parts.iter().map(Expr::to_json).collect::<Vec<_>>(),
            }),
            Self::Object(fields) => {
                let map: serde_json::Map<String, JsonValue> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::json!({ OBJECT_KEY: map })
            }
            Self::Array(items) => JsonValue::Array(items.iter().map(Expr::to_json).collect()),
            Self::Entries(entries) => {
                let pairs: Vec<JsonValue> = entries
                    .iter()
                    .map(|(k, v)| JsonValue::Array(vec![k.to_json(), v.to_json()]))
                    .collect();
                serde_json::json!({ ENTRIES_KEY: pairs })
            }
        }
    }

    /// All resource attributes this expression reads
    pub fn references(&self) -> Vec<&AttrRef> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a AttrRef>) {
        match self {
            Self::Ref(r) => out.push(r),
            Self::Literal(_) => {}
            Self::Call { args, .. } => args.iter().for_each(|a| a.collect_refs(out)),
            Self::Concat(parts) => parts.iter().for_each(|p| p.collect_refs(out)),
            Self::Object(fields) => fields.values().for_each(|v| v.collect_refs(out)),
            Self::Array(items) => items.iter().for_each(|i| i.collect_refs(out)),
            Self::Entries(entries) => entries.iter().for_each(|(k, v)| {
                k.collect_refs(out);
                v.collect_refs(out);
            }),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }

        match self {
            Self::Ref(r) => write!(f, "{}", r),
            Self::Literal(v) => write!(f, "{}", v),
            Self::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                join(f, args)?;
                write!(f, ")")
            }
            Self::Concat(parts) => {
                write!(f, "concat(")?;
                join(f, parts)?;
                write!(f, ")")
            }
            Self::Object(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Self::Array(items) => {
                write!(f, "[")?;
                join(f, items)?;
                write!(f, "]")
            }
            Self::Entries(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[derive(Clone, PartialEq)]
enum State<T> {
    Known(T),
    Pending(Expr),
}

/// A value that may only be known at apply time
#[derive(Clone, PartialEq)]
pub struct Output<T> {
    state: State<T>,
    secret: bool,
}

impl<T> Output<T> {
    /// A plain, already known value
    pub fn known(value: T) -> Self {
        Self {
            state: State::Known(value),
            secret: false,
        }
    }

    /// A known value that must be handled as a secret
    pub fn secret(value: T) -> Self {
        Self {
            state: State::Known(value),
            secret: true,
        }
    }

    /// A value computed by the engine
    pub fn pending(expr: Expr) -> Self {
        Self {
            state: State::Pending(expr),
            secret: false,
        }
    }

    /// Attribute of a declared resource
    pub fn attribute(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::pending(Expr::Ref(AttrRef::new(resource, attribute)))
    }

    /// Mark this output as secret
    pub fn into_secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }

    pub fn is_known(&self) -> bool {
        matches!(self.state, State::Known(_))
    }

    /// The value, if already known
    pub fn value(&self) -> Option<&T> {
        match &self.state {
            State::Known(v) => Some(v),
            State::Pending(_) => None,
        }
    }

    /// The expression, if still pending
    pub fn expr(&self) -> Option<&Expr> {
        match &self.state {
            State::Known(_) => None,
            State::Pending(e) => Some(e),
        }
    }

    /// Transform a known value
    ///
    /// Arbitrary closures cannot be shipped to the engine, so mapping a
    /// pending value is an error. Use [`Output::call`] for transformations the
    /// engine understands.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Result<Output<U>> {
        match self.state {
            State::Known(v) => Ok(Output {
                state: State::Known(f(v)),
                secret: self.secret,
            }),
            State::Pending(expr) => Err(CoreError::Unresolved {
                expression: expr.to_string(),
            }),
        }
    }
}

impl<T: Serialize> Output<T> {
    /// Expression form, turning known values into literals
    pub fn to_expr(&self) -> Expr {
        match &self.state {
            State::Known(v) => Expr::Literal(serde_json::to_value(v).unwrap_or(JsonValue::Null)),
            State::Pending(e) => e.clone(),
        }
    }

    /// Wire form including the secret envelope
    pub fn to_json(&self) -> JsonValue {
        let inner = self.to_expr().to_json();
        if self.secret {
            serde_json::json!({ SECRET_KEY: inner })
        } else {
            inner
        }
    }

    /// Widen into an untyped output
    pub fn erase(&self) -> Output<JsonValue> {
        match &self.state {
            State::Known(v) => Output {
                state: State::Known(serde_json::to_value(v).unwrap_or(JsonValue::Null)),
                secret: self.secret,
            },
            State::Pending(e) => Output {
                state: State::Pending(e.clone()),
                secret: self.secret,
            },
        }
    }
}

impl Output<JsonValue> {
    /// Apply an engine function; evaluated now when every argument is known
    pub fn call(function: Function, args: Vec<Output<JsonValue>>) -> Output<String> {
        let secret = args.iter().any(Output::is_secret);
        let known: Option<Vec<JsonValue>> = args.iter().map(|a| a.value().cloned()).collect();

        let state = match known {
            Some(values) => match function.eval(&values) {
                JsonValue::String(s) => State::Known(s),
                other => State::Known(other.to_string()),
            },
            None => State::Pending(Expr::Call {
                function,
                args: args.iter().map(Output::to_expr).collect(),
            }),
        };
        Output { state, secret }
    }

    /// Build a JSON object from named outputs
    pub fn json_object(fields: Vec<(&str, Output<JsonValue>)>) -> Output<JsonValue> {
        let secret = fields.iter().any(|(_, o)| o.is_secret());
        let all_known = fields.iter().all(|(_, o)| o.is_known());

        let state = if all_known {
            let map: serde_json::Map<String, JsonValue> = fields
                .into_iter()
                .map(|(k, o)| (k.to_string(), o.value().cloned().unwrap_or(JsonValue::Null)))
                .collect();
            State::Known(JsonValue::Object(map))
        } else {
            State::Pending(Expr::Object(
                fields
                    .into_iter()
                    .map(|(k, o)| (k.to_string(), o.to_expr()))
                    .collect(),
            ))
        };
        Output { state, secret }
    }
}

impl Output<JsonValue> {
    /// Build a JSON array from outputs
    pub fn json_array(items: Vec<Output<JsonValue>>) -> Output<JsonValue> {
        let secret = items.iter().any(Output::is_secret);
        let known: Option<Vec<JsonValue>> = items.iter().map(|i| i.value().cloned()).collect();

        let state = match known {
            Some(values) => State::Known(JsonValue::Array(values)),
            None => State::Pending(Expr::Array(items.iter().map(Output::to_expr).collect())),
        };
        Output { state, secret }
    }

    /// Build a JSON object whose keys may be pending
    pub fn json_entries(entries: Vec<(Output<String>, Output<JsonValue>)>) -> Output<JsonValue> {
        let secret = entries.iter().any(|(k, v)| k.is_secret() || v.is_secret());
        let all_known = entries.iter().all(|(k, v)| k.is_known() && v.is_known());

        let state = if all_known {
            let map: serde_json::Map<String, JsonValue> = entries
                .iter()
                .filter_map(|(k, v)| Some((k.value()?.clone(), v.value()?.clone())))
                .collect();
            State::Known(JsonValue::Object(map))
        } else {
            State::Pending(Expr::Entries(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_expr(), v.to_expr()))
                    .collect(),
            ))
        };
        Output { state, secret }
    }
}

impl Output<String> {
    /// Apply a function taking this value and optional string arguments
    pub fn apply(&self, function: Function, extra: &[&str]) -> Output<String> {
        let mut args = vec![self.erase()];
        args.extend(extra.iter().map(|s| lit_json(s)));
        Output::<JsonValue>::call(function, args)
    }

    /// Strip a leading prefix (e.g. the URL scheme of an issuer)
    pub fn trim_prefix(&self, prefix: &str) -> Output<String> {
        self.apply(Function::TrimPrefix, &[prefix])
    }

    /// Strip a trailing suffix (e.g. the zone of a record name)
    pub fn trim_suffix(&self, suffix: &str) -> Output<String> {
        self.apply(Function::TrimSuffix, &[suffix])
    }

    /// Everything after the first `sep`
    pub fn after(&self, sep: &str) -> Output<String> {
        self.apply(Function::After, &[sep])
    }

    /// Base64-encode the value
    pub fn base64(&self) -> Output<String> {
        self.apply(Function::Base64, &[])
    }

    /// Concatenate string parts
    pub fn format(parts: Vec<Output<String>>) -> Output<String> {
        let secret = parts.iter().any(Output::is_secret);
        let known: Option<Vec<&String>> = parts.iter().map(Output::value).collect();

        let state = match known {
            Some(values) => State::Known(values.into_iter().map(String::as_str).collect()),
            None => State::Pending(Expr::Concat(parts.iter().map(Output::to_expr).collect())),
        };
        Output { state, secret }
    }
}

/// Known string literal, for use with [`Output::format`]
pub fn lit(s: impl Into<String>) -> Output<String> {
    Output::known(s.into())
}

fn lit_json(s: &str) -> Output<JsonValue> {
    Output::known(JsonValue::String(s.to_string()))
}

impl<T: Serialize> Serialize for Output<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<T: fmt::Debug> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.state, self.secret) {
            (_, true) => write!(f, "Output({})", MASK),
            (State::Known(v), false) => write!(f, "Output({:?})", v),
            (State::Pending(e), false) => write!(f, "Output(<{}>)", e),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.state, self.secret) {
            (_, true) => write!(f, "{}", MASK),
            (State::Known(v), false) => write!(f, "{}", v),
            (State::Pending(e), false) => write!(f, "<computed: {}>", e),
        }
    }
}

/// Replace every secret envelope with a mask
pub fn mask_secrets(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) if map.len() == 1 && map.contains_key(SECRET_KEY) => {
            JsonValue::String(MASK.to_string())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), mask_secrets(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(mask_secrets).collect()),
        other => other.clone(),
    }
}

/// Collect every `$ref` target in a wire-form document
pub fn collect_references(value: &JsonValue) -> Vec<AttrRef> {
    let mut refs = Vec::new();
    walk_refs(value, &mut refs);
    refs
}

fn walk_refs(value: &JsonValue, out: &mut Vec<AttrRef>) {
    match value {
        JsonValue::Object(map) => {
            if map.len() == 1 {
                if let Some(r) = map.get(REF_KEY).and_then(JsonValue::as_str).and_then(AttrRef::parse) {
                    out.push(r);
                    return;
                }
            }
            map.values().for_each(|v| walk_refs(v, out));
        }
        JsonValue::Array(items) => items.iter().for_each(|v| walk_refs(v, out)),
        _ => {}
    }
}

/// Resolved outputs of an applied stack
///
/// Written by the provisioning engine after apply. Secret values are stored
/// wrapped in a `{"$secret": ...}` envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackOutputs(IndexMap<String, JsonValue>);

impl StackOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a plain value
    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        self.0.insert(key.into(), value);
    }

    /// Record a secret value
    pub fn insert_secret(&mut self, key: impl Into<String>, value: JsonValue) {
        self.0
            .insert(key.into(), serde_json::json!({ SECRET_KEY: value }));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read a value as a known output, unwrapping the secret envelope
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<Result<Output<T>>> {
        let raw = self.0.get(key)?;
        let (value, secret) = match raw {
            JsonValue::Object(map) if map.len() == 1 && map.contains_key(SECRET_KEY) => {
                (map[SECRET_KEY].clone(), true)
            }
            other => (other.clone(), false),
        };
        Some(
            serde_json::from_value::<T>(value)
                .map(|v| if secret { Output::secret(v) } else { Output::known(v) })
                .map_err(CoreError::from),
        )
    }

    /// Copy with secrets masked, for display
    pub fn masked(&self) -> JsonValue {
        mask_secrets(&serde_json::to_value(&self.0).unwrap_or(JsonValue::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_serializes_as_value() {
        let out = Output::known("vpc-123".to_string());
        assert_eq!(serde_json::to_value(&out).unwrap(), json!("vpc-123"));
    }

    #[test]
    fn test_pending_serializes_as_ref() {
        let out: Output<String> = Output::attribute("demo-vpc", "id");
        assert_eq!(out.to_json(), json!({"$ref": "demo-vpc.id"}));
        assert!(!out.is_known());
    }

    #[test]
    fn test_secret_envelope() {
        let out = Output::secret("hunter2".to_string());
        assert_eq!(out.to_json(), json!({"$secret": "hunter2"}));
        assert_eq!(out.to_string(), MASK);
        assert!(!format!("{:?}", out).contains("hunter2"));
    }

    #[test]
    fn test_map_known() {
        let out = Output::known(3).map(|n| n * 2).unwrap();
        assert_eq!(out.value(), Some(&6));
    }

    #[test]
    fn test_map_pending_is_unresolved() {
        let out: Output<String> = Output::attribute("role", "arn");
        let err = out.map(|s| s.len()).unwrap_err();
        assert!(err.to_string().contains("role.arn"));
    }

    #[test]
    fn test_map_keeps_secret() {
        let out = Output::secret("abc".to_string()).map(|s| s.len()).unwrap();
        assert!(out.is_secret());
    }

    #[test]
    fn test_trim_prefix_known_and_pending() {
        let known = Output::known("https://x.eks.amazonaws.com/id/ABC".to_string());
        assert_eq!(
            known.trim_prefix("https://").value().unwrap(),
            "x.eks.amazonaws.com/id/ABC"
        );

        let pending: Output<String> = Output::attribute("cluster", "issuer");
        assert_eq!(
            pending.trim_prefix("https://").to_json(),
            json!({"$fn": "trimprefix", "args": [{"$ref": "cluster.issuer"}, "https://"]})
        );
    }

    #[test]
    fn test_trim_suffix_known() {
        let name = lit("_abc.api.cloudlan.net.");
        assert_eq!(name.trim_suffix(".cloudlan.net.").value().unwrap(), "_abc.api");
        assert_eq!(name.trim_suffix(".other.").value().unwrap(), "_abc.api.cloudlan.net.");
    }

    #[test]
    fn test_after_first_separator() {
        let arn = Output::known(
            "arn:aws:iam::123:oidc-provider/oidc.eks.us-east-1.amazonaws.com/id/ABC".to_string(),
        );
        assert_eq!(
            arn.after("/").value().unwrap(),
            "oidc.eks.us-east-1.amazonaws.com/id/ABC"
        );
    }

    #[test]
    fn test_format_mixed_is_pending_concat() {
        let out = Output::<String>::format(vec![
            lit("--apiserver-endpoint '"),
            Output::attribute("eks", "endpoint"),
            lit("'"),
        ]);
        assert_eq!(
            out.to_json(),
            json!({"$concat": ["--apiserver-endpoint '", {"$ref": "eks.endpoint"}, "'"]})
        );
    }

    #[test]
    fn test_format_known_joins() {
        let out = Output::<String>::format(vec![lit("a"), lit("-"), lit("b")]);
        assert_eq!(out.value().unwrap(), "a-b");
    }

    #[test]
    fn test_base64_known() {
        assert_eq!(lit("hello").base64().value().unwrap(), "aGVsbG8=");
    }

    #[test]
    fn test_object_jsonencode_stays_secret() {
        let creds = Output::<JsonValue>::json_object(vec![
            ("username", Output::known(json!("root"))),
            ("password", Output::<String>::attribute("pw", "result").into_secret().erase()),
        ]);
        let encoded = Output::<JsonValue>::call(Function::JsonEncode, vec![creds]);
        assert!(encoded.is_secret());
        let wire = encoded.to_json();
        assert_eq!(wire["$secret"]["$fn"], "jsonencode");
        assert_eq!(
            wire["$secret"]["args"][0]["$object"]["password"],
            json!({"$ref": "pw.result"})
        );
    }

    #[test]
    fn test_object_known_encodes_now() {
        let creds = Output::<JsonValue>::json_object(vec![("username", Output::known(json!("root")))]);
        let encoded = Output::<JsonValue>::call(Function::JsonEncode, vec![creds]);
        assert_eq!(encoded.value().unwrap(), r#"{"username":"root"}"#);
    }

    #[test]
    fn test_entries_with_pending_key() {
        let key = Output::<String>::attribute("oidc", "arn").after("/");
        let doc = Output::<JsonValue>::json_entries(vec![(
            Output::<String>::format(vec![key, lit(":sub")]),
            Output::known(json!("system:serviceaccount:kube-system:cluster-autoscaler")),
        )]);
        let wire = doc.to_json();
        let pair = &wire["$entries"][0];
        assert_eq!(pair[0]["$concat"][1], ":sub");
        assert_eq!(pair[1], "system:serviceaccount:kube-system:cluster-autoscaler");
        assert_eq!(collect_references(&wire), vec![AttrRef::new("oidc", "arn")]);
    }

    #[test]
    fn test_entries_known_is_object() {
        let doc = Output::<JsonValue>::json_entries(vec![(lit("a"), Output::known(json!(1)))]);
        assert_eq!(doc.value().unwrap(), &json!({"a": 1}));
    }

    #[test]
    fn test_array_mixed_is_pending() {
        let arr = Output::<JsonValue>::json_array(vec![
            Output::known(json!("x")),
            Output::<String>::attribute("sg", "id").erase(),
        ]);
        assert_eq!(arr.to_json(), json!(["x", {"$ref": "sg.id"}]));
    }

    #[test]
    fn test_mask_secrets_nested() {
        let doc = json!({
            "stringData": {"DB_PASSWORD": {"$secret": "p"}, "DB_USERNAME": "root"},
            "list": [{"$secret": {"$ref": "x.y"}}]
        });
        let masked = mask_secrets(&doc);
        assert_eq!(masked["stringData"]["DB_PASSWORD"], MASK);
        assert_eq!(masked["stringData"]["DB_USERNAME"], "root");
        assert_eq!(masked["list"][0], MASK);
    }

    #[test]
    fn test_collect_references() {
        let doc = json!({
            "vpcId": {"$ref": "vpc.id"},
            "userData": {"$fn": "base64", "args": [{"$concat": ["x", {"$ref": "eks.endpoint"}]}]},
            "secret": {"$secret": {"$ref": "pw.result"}}
        });
        let refs = collect_references(&doc);
        assert_eq!(
            refs,
            vec![
                AttrRef::new("vpc", "id"),
                AttrRef::new("eks", "endpoint"),
                AttrRef::new("pw", "result"),
            ]
        );
    }

    #[test]
    fn test_attr_ref_parse_nested_attribute() {
        let r = AttrRef::parse("eks-cluster.identities[0].oidcs[0].issuer").unwrap();
        assert_eq!(r.resource, "eks-cluster");
        assert_eq!(r.attribute, "identities[0].oidcs[0].issuer");
        assert!(AttrRef::parse("no-dot").is_none());
    }

    #[test]
    fn test_stack_outputs_secret_roundtrip() {
        let mut outputs = StackOutputs::new();
        outputs.insert("db_admin_username", json!("root"));
        outputs.insert_secret("db_admin_password", json!("s3cret"));

        let user: Output<String> = outputs.get("db_admin_username").unwrap().unwrap();
        let pass: Output<String> = outputs.get("db_admin_password").unwrap().unwrap();
        assert!(!user.is_secret());
        assert!(pass.is_secret());
        assert_eq!(pass.value().unwrap(), "s3cret");
        assert!(outputs.get::<String>("missing").is_none());
        assert_eq!(outputs.masked()["db_admin_password"], MASK);
    }

    #[test]
    fn test_stack_outputs_type_mismatch() {
        let mut outputs = StackOutputs::new();
        outputs.insert("public_subnet_ids", json!("not-a-list"));
        assert!(outputs.get::<Vec<String>>("public_subnet_ids").unwrap().is_err());
    }
}

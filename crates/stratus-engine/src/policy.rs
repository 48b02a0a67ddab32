//! IAM policy documents
//!
//! Documents are built from [`Output`]s so ARNs of resources declared in the
//! same stack can be embedded; the document is JSON-encoded immediately when
//! everything is known, otherwise by the engine at apply time.

use indexmap::IndexMap;
use serde_json::{Value as JsonValue, json};
use stratus_core::{Function, Output, lit};

const VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
        }
    }
}

/// Who a trust statement applies to
#[derive(Debug, Clone)]
pub enum Principal {
    /// AWS service such as `eks.amazonaws.com`
    Service(String),
    /// Identity provider, by ARN
    Federated(Output<String>),
}

/// `{test: {variable: values}}`
#[derive(Debug, Clone)]
pub struct Condition {
    pub test: String,
    pub variable: Output<String>,
    pub values: Vec<Output<String>>,
}

impl Condition {
    pub fn string_equals(variable: Output<String>, value: Output<String>) -> Self {
        Self {
            test: "StringEquals".to_string(),
            variable,
            values: vec![value],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<Output<String>>,
    pub principal: Option<Principal>,
    pub conditions: Vec<Condition>,
}

impl Statement {
    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sid: None,
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: Vec::new(),
            principal: None,
            conditions: Vec::new(),
        }
    }

    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn resource(mut self, resource: Output<String>) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    fn to_output(&self) -> Output<JsonValue> {
        let mut fields: Vec<(&str, Output<JsonValue>)> = Vec::new();
        if let Some(sid) = &self.sid {
            fields.push(("Sid", Output::known(json!(sid))));
        }
        fields.push(("Effect", Output::known(json!(self.effect.as_str()))));

        match &self.principal {
            Some(Principal::Service(service)) => {
                fields.push(("Principal", Output::known(json!({ "Service": service }))));
            }
            Some(Principal::Federated(arn)) => {
                let principal = Output::<JsonValue>::json_object(vec![("Federated", arn.erase())]);
                fields.push(("Principal", principal));
            }
            None => {}
        }

        fields.push(("Action", Output::known(single_or_list(&self.actions))));

        if !self.resources.is_empty() {
            let resources = if self.resources.len() == 1 {
                self.resources[0].erase()
            } else {
                Output::<JsonValue>::json_array(self.resources.iter().map(Output::erase).collect())
            };
            fields.push(("Resource", resources));
        }

        if !self.conditions.is_empty() {
            let mut by_test: IndexMap<&str, Vec<(Output<String>, Output<JsonValue>)>> =
                IndexMap::new();
            for condition in &self.conditions {
                let values = if condition.values.len() == 1 {
                    condition.values[0].erase()
                } else {
                    Output::<JsonValue>::json_array(
                        condition.values.iter().map(Output::erase).collect(),
                    )
                };
                by_test
                    .entry(condition.test.as_str())
                    .or_default()
                    .push((condition.variable.clone(), values));
            }
            let tests = by_test
                .into_iter()
                .map(|(test, entries)| (lit(test), Output::<JsonValue>::json_entries(entries)))
                .collect();
            fields.push(("Condition", Output::<JsonValue>::json_entries(tests)));
        }

        Output::<JsonValue>::json_object(fields)
    }
}

fn single_or_list(items: &[String]) -> JsonValue {
    match items {
        [single] => json!(single),
        _ => json!(items),
    }
}

/// An IAM policy document
#[derive(Debug, Clone, Default)]
pub struct PolicyDocument {
    statements: Vec<Statement>,
    raw: Vec<JsonValue>,
}

impl PolicyDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Document from caller-supplied statements, kept verbatim
    pub fn from_raw(statements: &[JsonValue]) -> Self {
        Self {
            statements: Vec::new(),
            raw: statements.to_vec(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.raw.is_empty()
    }

    /// Document as JSON
    pub fn to_output(&self) -> Output<JsonValue> {
        let mut statements: Vec<Output<JsonValue>> =
            self.raw.iter().cloned().map(Output::known).collect();
        statements.extend(self.statements.iter().map(Statement::to_output));

        Output::<JsonValue>::json_object(vec![
            ("Version", Output::known(json!(VERSION))),
            ("Statement", Output::<JsonValue>::json_array(statements)),
        ])
    }

    /// Document as the JSON string IAM expects
    pub fn to_json_string(&self) -> Output<String> {
        Output::<JsonValue>::call(Function::JsonEncode, vec![self.to_output()])
    }
}

/// Trust policy letting an AWS service assume a role
pub fn assume_role_policy(service: &str) -> Output<String> {
    PolicyDocument::new()
        .statement(
            Statement::allow(["sts:AssumeRole"])
                .principal(Principal::Service(service.to_string())),
        )
        .to_json_string()
}

/// Trust policy letting one Kubernetes service account assume a role
///
/// `provider_host` is the OIDC issuer without its scheme; the subject must
/// match `system:serviceaccount:<namespace>:<name>` exactly.
pub fn web_identity_trust(
    provider_arn: Output<String>,
    provider_host: Output<String>,
    namespace: &str,
    service_account: &str,
) -> PolicyDocument {
    let variable = Output::<String>::format(vec![provider_host, lit(":sub")]);
    let subject = lit(format!("system:serviceaccount:{namespace}:{service_account}"));

    PolicyDocument::new().statement(
        Statement::allow(["sts:AssumeRoleWithWebIdentity"])
            .principal(Principal::Federated(provider_arn))
            .condition(Condition::string_equals(variable, subject)),
    )
}

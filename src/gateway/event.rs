//! API Gateway proxy-integration event types.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An inbound proxy-integration request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiGatewayProxyRequest {
    #[serde(deserialize_with = "null_as_default")]
    pub resource: String,
    #[serde(deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(deserialize_with = "null_as_default")]
    pub http_method: String,
    #[serde(deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub query_string_parameters: HashMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub path_parameters: HashMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub stage_variables: HashMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub request_context: ProxyRequestContext,
    /// The raw body. Base64 bodies are passed through undecoded.
    #[serde(deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(deserialize_with = "null_as_default")]
    pub is_base64_encoded: bool,
}

/// Request metadata added by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyRequestContext {
    #[serde(deserialize_with = "null_as_default")]
    pub account_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub stage: String,
    #[serde(deserialize_with = "null_as_default")]
    pub request_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub api_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub resource_path: String,
    /// Whatever the configured authorizer attached, e.g. `{"claims": {...}}`.
    pub authorizer: Option<HashMap<String, Value>>,
}

impl ProxyRequestContext {
    /// The `sub` claim of the authorizer, if the authorizer carries one.
    pub fn authorizer_subject(&self) -> Option<&str> {
        authorizer_subject(self)
    }
}

/// Extract the `sub` claim from `authorizer.claims`.
///
/// Returns `None` when there is no authorizer, no claims object, or the
/// subject is missing or not a string.
pub fn authorizer_subject(ctx: &ProxyRequestContext) -> Option<&str> {
    ctx.authorizer.as_ref()?.get("claims")?.as_object()?.get("sub")?.as_str()
}

/// The response handed back to the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiGatewayProxyResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

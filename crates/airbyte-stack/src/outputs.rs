use serde::Serialize;

/// Values a stack exposes to its operators once it is declared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOutputs {
    pub namespace: String,
    pub helm_release_name: String,
    pub airbyte_url: String,

    /// `host:port` of the self-hosted database, if the stack declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
}

impl StackOutputs {
    /// Pretty printed JSON, the format the outputs are published in.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

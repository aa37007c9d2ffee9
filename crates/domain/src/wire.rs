use serde::Deserialize;

/// Enum values arrive either by name (`"paid"`) or by legacy numeric code.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CodeOrName {
    Code(i64),
    Name(String),
}

//! Utility functions for rendering stacks in the YAML file format
use std::io::Write;

use serde::ser;
use snafu::{ResultExt, Snafu};

use crate::{graph, stack::Stack};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize YAML"))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("failed to write YAML document separator"))]
    WriteDocumentSeparator { source: std::io::Error },

    #[snafu(display("failed to order the stack's resources"))]
    OrderResources { source: graph::Error },
}

/// Serializes the given data structure as an explicit YAML document and writes it to a [`Write`].
///
/// Enums are serialized as a YAML map containing one entry in which the key identifies the variant
/// name.
///
/// # Example
///
/// ```
/// use airbyte_stack::yaml;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// #[serde(rename_all = "camelCase")]
/// enum Password {
///     Env(String),
/// }
///
/// #[derive(Serialize)]
/// struct Database {
///     password: Password,
/// }
///
/// let value = Database {
///     password: Password::Env("DB_PASSWORD".into()),
/// };
///
/// let mut buf = Vec::new();
/// yaml::serialize_to_explicit_document(&mut buf, &value).unwrap();
/// let actual_yaml = std::str::from_utf8(&buf).unwrap();
///
/// let expected_yaml = "---
/// password:
///   env: DB_PASSWORD
/// ";
///
/// assert_eq!(expected_yaml, actual_yaml);
/// ```
///
/// # Errors
///
/// Serialization can fail if `T`'s implementation of `Serialize` decides to return an error.
pub fn serialize_to_explicit_document<T, W>(mut writer: W, value: &T) -> Result<()>
where
    T: ser::Serialize,
    W: Write,
{
    writer
        .write_all(b"---\n")
        .context(WriteDocumentSeparatorSnafu)?;
    let mut serializer = serde_yaml::Serializer::new(writer);
    serde_yaml::with::singleton_map_recursive::serialize(value, &mut serializer)
        .context(SerializeYamlSnafu)?;
    Ok(())
}

/// Writes every manifest of `stack` as its own document, in apply order.
///
/// The Helm release is rendered as a plain document holding the chart coordinates and
/// the value set.
pub fn render_stack<W>(mut writer: W, stack: &Stack) -> Result<()>
where
    W: Write,
{
    for resource in stack.graph().apply_order().context(OrderResourcesSnafu)? {
        serialize_to_explicit_document(&mut writer, &resource.manifest)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::config::StackConfig;

    #[test]
    fn minimal_stack_renders_namespace_before_release() {
        let spec = serde_yaml::from_str::<StackConfig>(indoc! {"
            namespace: airbyte
            repoUrl: https://airbytehq.github.io/helm-charts
            chart: airbyte
            chartVersion: 0.50.0
            appImageTag: 0.50.0
            airbyteUrl: http://localhost:8000
        "})
        .expect("invalid test input")
        .validate()
        .expect("config must be valid");
        let stack = Stack::declare(&spec).expect("stack must be declared");

        let mut buf = Vec::new();
        render_stack(&mut buf, &stack).expect("stack must render");
        let rendered = String::from_utf8(buf).expect("rendered YAML must be UTF-8");

        assert_eq!(rendered.matches("---\n").count(), 2);
        let namespace = rendered.find("kind: Namespace").expect("namespace is rendered");
        let release = rendered.find("chart: airbyte").expect("release is rendered");
        assert!(namespace < release);
        assert!(rendered.contains("timeoutSeconds: 1800"));
    }
}

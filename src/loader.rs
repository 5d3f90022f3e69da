//! Parses a providers file into a list of [`Provider`]s.

use serde_json::Value;
use tracing::warn;

use crate::model::{provider_from_value, sanitize_provider_name, Provider};
use crate::variables::VariableResolver;

/// Parse the three accepted top-level shapes of a providers file:
/// a bare array, `{providers: [...]}`, `{providers: {...}}`, or a single
/// provider object.
///
/// Variable-substitutes and name-sanitizes every entry. An entry that fails
/// to parse or substitute is logged and skipped rather than aborting the
/// whole batch (spec.md §7).
pub fn load_providers(raw: &str, resolver: &VariableResolver) -> crate::Result<Vec<Provider>> {
    let value: Value = serde_json::from_str(raw)?;
    let entries = split_entries(value);

    let mut providers = Vec::with_capacity(entries.len());
    for entry in entries {
        match build_provider(entry, resolver) {
            Ok(p) => providers.push(p),
            Err(e) => warn!(error = %e, "skipping unparsable provider entry"),
        }
    }
    Ok(providers)
}

fn split_entries(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("providers") {
            Some(Value::Array(items)) => items,
            Some(single @ Value::Object(_)) => vec![single],
            Some(_) | None => vec![Value::Object(obj)],
        },
        other => vec![other],
    }
}

fn build_provider(entry: Value, resolver: &VariableResolver) -> crate::Result<Provider> {
    let mut provider = provider_from_value(entry)
        .map_err(|e| crate::Error::Config(format!("invalid provider entry: {e}")))?;
    resolver.substitute_provider(&mut provider)?;
    let sanitized = sanitize_provider_name(provider.name(), provider.kind());
    provider.set_name(sanitized);
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> VariableResolver {
        VariableResolver::new()
    }

    #[test]
    fn accepts_bare_array_shape() {
        let raw = r#"[{"type":"http","name":"a","url":"http://x"}]"#;
        let providers = load_providers(raw, &resolver()).unwrap();
        assert_eq!(providers.len(), 1);
    }

    #[test]
    fn accepts_providers_array_shape() {
        let raw = r#"{"providers":[{"type":"http","name":"a","url":"http://x"}]}"#;
        let providers = load_providers(raw, &resolver()).unwrap();
        assert_eq!(providers.len(), 1);
    }

    #[test]
    fn accepts_single_object_shape() {
        let raw = r#"{"type":"http","name":"a","url":"http://x"}"#;
        let providers = load_providers(raw, &resolver()).unwrap();
        assert_eq!(providers.len(), 1);
    }

    #[test]
    fn sanitizes_dotted_names() {
        let raw = r#"{"type":"http","name":"my.http","url":"http://x"}"#;
        let providers = load_providers(raw, &resolver()).unwrap();
        assert_eq!(providers[0].name(), "my_http");
    }

    #[test]
    fn skips_bad_entries_without_aborting_batch() {
        let raw = r#"[{"type":"http","name":"ok","url":"http://x"},{"type":"bogus"}]"#;
        let providers = load_providers(raw, &resolver()).unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name(), "ok");
    }
}

//! Variable substitution: `${NAME}` / `$NAME` references resolved against an
//! inline map, then an ordered list of [`VariableLoader`]s, then the process
//! environment.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("static variable pattern is valid")
    })
}

/// A source of variable values consulted after the inline map and before the
/// process environment.
pub trait VariableLoader: Send + Sync {
    /// Look up a single variable by name.
    fn get(&self, name: &str) -> Option<String>;
}

/// Loads variables from a `.env`-style file via `dotenvy`, without mutating
/// the process environment.
pub struct DotEnvLoader {
    values: HashMap<String, String>,
}

impl DotEnvLoader {
    /// Parse a `.env` file at `path` ahead of time.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let values = dotenvy::from_path_iter(path.as_ref())
            .map_err(|e| Error::Config(format!("reading .env file: {e}")))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()
            .map_err(|e| Error::Config(format!("parsing .env file: {e}")))?;
        Ok(Self { values })
    }
}

impl VariableLoader for DotEnvLoader {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// A static in-memory loader, mainly useful in tests.
pub struct MapLoader(pub HashMap<String, String>);

impl VariableLoader for MapLoader {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// Resolves `${NAME}`/`$NAME` references against three tiers, in order:
/// an inline map, an ordered list of loaders, then `std::env::var`.
#[derive(Default)]
pub struct VariableResolver {
    inline: HashMap<String, String>,
    loaders: Vec<Box<dyn VariableLoader>>,
}

impl VariableResolver {
    /// An empty resolver that falls through straight to the environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the inline tier, the highest-priority source.
    #[must_use]
    pub fn with_inline(mut self, inline: HashMap<String, String>) -> Self {
        self.inline = inline;
        self
    }

    /// Append a loader to the end of the loader chain.
    #[must_use]
    pub fn with_loader(mut self, loader: Box<dyn VariableLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Resolve a single variable name against the three tiers, or `None` if
    /// it isn't defined in any of them. Not finding a variable is not an
    /// error — callers leave the literal reference in place (spec.md §4.1).
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<String> {
        if let Some(v) = self.inline.get(name) {
            return Some(v.clone());
        }
        for loader in &self.loaders {
            if let Some(v) = loader.get(name) {
                return Some(v);
            }
        }
        std::env::var(name).ok()
    }

    /// Substitute every string leaf of a [`crate::model::Provider`] in place.
    pub fn substitute_provider(&self, provider: &mut crate::model::Provider) -> Result<()> {
        provider.substitute_strings(|s| self.substitute(s))
    }

    /// Replace every `${NAME}`/`$NAME` occurrence in `input`. A reference
    /// that can't be resolved in any tier is left as its original literal
    /// text rather than erroring, so this is a total function: idempotent,
    /// `substitute(substitute(v)) == substitute(v)`.
    pub fn substitute(&self, input: &str) -> Result<String> {
        if !input.as_bytes().contains(&b'$') {
            return Ok(input.to_string());
        }
        let replaced = pattern().replace_all(input, |caps: &regex::Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .expect("one alternative always matches")
                .as_str();
            self.resolve(name).unwrap_or_else(|| caps.get(0).expect("whole match always present").as_str().to_string())
        });
        Ok(replaced.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_braced_and_bare_forms() {
        let mut inline = HashMap::new();
        inline.insert("FOO".to_string(), "bar".to_string());
        let resolver = VariableResolver::new().with_inline(inline);
        assert_eq!(resolver.substitute("x=${FOO}").unwrap(), "x=bar");
        assert_eq!(resolver.substitute("x=$FOO!").unwrap(), "x=bar!");
    }

    #[test]
    fn leaves_plain_strings_untouched() {
        let resolver = VariableResolver::new();
        assert_eq!(resolver.substitute("no variables here").unwrap(), "no variables here");
    }

    #[test]
    fn missing_variable_leaves_literal_text_in_place() {
        let resolver = VariableResolver::new();
        assert_eq!(
            resolver.substitute("${DEFINITELY_NOT_SET_ANYWHERE}").unwrap(),
            "${DEFINITELY_NOT_SET_ANYWHERE}"
        );
        assert_eq!(resolver.substitute("$ALSO_NOT_SET too").unwrap(), "$ALSO_NOT_SET too");
    }

    #[test]
    fn substitute_is_idempotent_on_unresolved_references() {
        let resolver = VariableResolver::new();
        let once = resolver.substitute("${STILL_UNSET}").unwrap();
        let twice = resolver.substitute(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn loader_is_consulted_before_environment() {
        let mut map = HashMap::new();
        map.insert("FOO".to_string(), "from-loader".to_string());
        let resolver = VariableResolver::new().with_loader(Box::new(MapLoader(map)));
        assert_eq!(resolver.substitute("${FOO}").unwrap(), "from-loader");
    }
}

/// Translation lookup for user-facing strings
///
/// Templates use `@name` style placeholders. The default catalog is the
/// identity translation with placeholder substitution.

use std::collections::HashMap;

pub trait Translator: Send + Sync {
    /// Translate `template` and substitute `args` into it
    fn text(&self, template: &str, args: &[(&str, &str)]) -> String;
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, source: impl Into<String>, translated: impl Into<String>) -> Self {
        self.entries.insert(source.into(), translated.into());
        self
    }
}

impl Translator for Catalog {
    fn text(&self, template: &str, args: &[(&str, &str)]) -> String {
        let translated = self
            .entries
            .get(template)
            .map(String::as_str)
            .unwrap_or(template);
        substitute(translated, args)
    }
}

/// Replace placeholders, longest first so `@name` never clobbers `@name_full`
pub fn substitute(template: &str, args: &[(&str, &str)]) -> String {
    let mut ordered: Vec<&(&str, &str)> = args.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    ordered
        .into_iter()
        .fold(template.to_string(), |acc, (key, value)| acc.replace(key, value))
}

//! Hidden-ref filtering (`core.hideRefs`).

/// A single `core.hideRefs` entry: a name prefix, optionally negated with `!`.
#[derive(Clone)]
struct HidePattern {
    prefix: String,
    negate: bool,
}

/// A set of `core.hideRefs` prefixes, applied in config order.
///
/// A ref is hidden if the last matching prefix is not negated. Negated
/// entries (`!refs/foo`) unhide a ref that an earlier, broader prefix
/// would otherwise have hidden — matching C git's `ref_is_hidden`.
#[derive(Default, Clone)]
pub struct HideRefs {
    patterns: Vec<HidePattern>,
}

impl HideRefs {
    /// Build from the raw `core.hideRefs` config values, in the order they
    /// were read (later entries take precedence over earlier ones).
    pub fn from_config_values<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let patterns = values
            .into_iter()
            .map(|v| match v.strip_prefix('!') {
                Some(rest) => HidePattern {
                    prefix: rest.to_string(),
                    negate: true,
                },
                None => HidePattern {
                    prefix: v.to_string(),
                    negate: false,
                },
            })
            .collect();
        Self { patterns }
    }

    /// Whether no hideRefs entries are configured (filtering is a no-op).
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `name` is hidden under this configuration.
    pub fn is_hidden(&self, name: &str) -> bool {
        let mut hidden = false;
        for pattern in &self.patterns {
            if name.starts_with(pattern.prefix.as_str()) {
                hidden = !pattern.negate;
            }
        }
        hidden
    }
}

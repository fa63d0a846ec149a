//! Identifier-to-module resolution over a [`FileSnapshot`].
//!
//! `fooBar` becomes the case-insensitive pattern `foo[-_]?bar`, matched
//! against the trailing path segment of every indexed file, allowing the
//! directory-as-module forms `.../fooBar/index.js` and `.../fooBar/package.json`
//! and any extension qualifiers (`.js`, `.jsx`, `.web.js`, ...).

use globset::GlobSet;
use regex::Regex;
use serde::Serialize;

use crate::config::Config;
use crate::index::FileSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCandidate {
    /// Lookup path the file was found under; `None` for alias hits.
    pub lookup_path: Option<String>,
    /// Module specifier: path relative to the lookup path, extension and
    /// trailing `/index` or `/package` stripped.
    pub import_path: String,
    /// Human-facing path shown for disambiguation.
    pub display_name: String,
    /// Whether the canonical import binds named members destructured.
    pub is_destructured: bool,
}

pub struct Resolver<'a> {
    config: &'a Config,
    excludes: GlobSet,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a Config) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            excludes: config.exclude_set()?,
        })
    }

    /// Resolve an identifier to ranked candidates.
    ///
    /// Empty, singleton, and multiple results are all ordinary values: the
    /// caller auto-accepts a singleton, hands many to the chooser, and
    /// reports "no module found" for none.
    pub fn resolve(&self, identifier: &str, snapshot: &FileSnapshot) -> Vec<ModuleCandidate> {
        if let Some(alias) = self.config.aliases.get(identifier) {
            // Aliases always short-circuit the file search.
            return vec![ModuleCandidate {
                lookup_path: None,
                import_path: alias.path().to_string(),
                display_name: alias.path().to_string(),
                is_destructured: alias.destructured(),
            }];
        }

        let pattern = match word_pattern(identifier) {
            Some(pattern) => pattern,
            None => return Vec::new(),
        };

        let prefixes: Vec<(&String, Option<String>)> = self
            .config
            .lookup_paths
            .iter()
            .map(|lookup| (lookup, lookup_prefix(lookup)))
            .collect();

        // One pass over the snapshot; every lookup path is tried against
        // each file in declaration order, so a file reachable through
        // overlapping lookup paths yields a single candidate: the shorter
        // import path wins, equal lengths keep the earlier-declared lookup
        // path (the incumbent wins ties).
        let mut candidates: Vec<ModuleCandidate> = Vec::new();
        for path in snapshot.paths() {
            if self.excludes.is_match(path) {
                continue;
            }
            let mut best: Option<ModuleCandidate> = None;
            for (lookup, prefix) in &prefixes {
                let rel = match prefix {
                    Some(prefix) => match path.strip_prefix(prefix.as_str()) {
                        Some(rel) => rel,
                        None => continue,
                    },
                    None => path,
                };
                if !pattern.is_match(rel) {
                    continue;
                }

                let import_path = import_path_of(rel);
                let replace = match &best {
                    Some(kept) => import_path.len() < kept.import_path.len(),
                    None => true,
                };
                if replace {
                    best = Some(ModuleCandidate {
                        lookup_path: Some((*lookup).clone()),
                        display_name: import_path.clone(),
                        import_path,
                        is_destructured: false,
                    });
                }
            }
            if let Some(candidate) = best {
                candidates.push(candidate);
            }
        }

        candidates.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        candidates
    }
}

/// `"."` and `""` mean the project root itself; otherwise the lookup path
/// plus a slash is stripped from matching index entries.
fn lookup_prefix(lookup: &str) -> Option<String> {
    let trimmed = lookup.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        None
    } else {
        Some(format!("{trimmed}/"))
    }
}

/// Build the matching regex for an identifier: an optional `[-_]` boundary
/// between a lowercase/digit and a following uppercase, literal `-`/`_`
/// mapped to the same boundary, lowercased, anchored to the final path
/// segment with optional `/index` or `/package` and a required extension.
/// A leading `-`/`_` keeps its marker so `_privateHelper` still reaches
/// `_private_helper.js`; the optional marker right after the segment anchor
/// is harmless for unprefixed files.
fn word_pattern(identifier: &str) -> Option<Regex> {
    if identifier.is_empty() {
        return None;
    }

    let mut body = String::new();
    let mut prev_joins = false; // last source char was lowercase or digit
    let mut prev_marker = false;
    for ch in identifier.chars() {
        if ch == '-' || ch == '_' {
            if !prev_marker {
                body.push_str("[-_]?");
                prev_marker = true;
            }
            prev_joins = false;
            continue;
        }
        if ch.is_uppercase() && prev_joins && !prev_marker {
            body.push_str("[-_]?");
        }
        let lower = ch.to_lowercase().to_string();
        body.push_str(&regex::escape(&lower));
        prev_joins = ch.is_lowercase() || ch.is_ascii_digit();
        prev_marker = false;
    }
    if body.is_empty() {
        return None;
    }

    let full = format!(r"(?i)(?:^|/){body}(?:/index|/package)?\.[^/]+$");
    Regex::new(&full).ok()
}

/// Module specifier for a file path relative to its lookup path.
fn import_path_of(rel: &str) -> String {
    let without_ext = match rel.rfind('.') {
        Some(dot) if !rel[dot + 1..].contains('/') && dot > 0 => &rel[..dot],
        _ => rel,
    };
    for suffix in ["/index", "/package"] {
        if let Some(stripped) = without_ext.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped.to_string();
            }
        }
    }
    without_ext.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AliasSpec;
    use crate::index::FileIndex;

    fn snapshot(paths: &[&str]) -> FileSnapshot {
        let index = FileIndex::new();
        index.upsert(paths.iter().map(|p| (p.to_string(), 1)));
        index.snapshot()
    }

    fn config(lookup_paths: &[&str]) -> Config {
        Config {
            lookup_paths: lookup_paths.iter().map(|s| s.to_string()).collect(),
            ..Config::default()
        }
    }

    #[test]
    fn camel_case_identifier_matches_pascal_case_component() {
        let cfg = config(&["src"]);
        let resolver = Resolver::new(&cfg).expect("resolver");
        let snap = snapshot(&["src/components/FooBar.jsx", "src/components/Other.jsx"]);

        let found = resolver.resolve("fooBar", &snap);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].import_path, "components/FooBar");
        assert_eq!(found[0].lookup_path.as_deref(), Some("src"));
        assert!(!found[0].is_destructured);
    }

    #[test]
    fn dashes_underscores_and_joined_forms_all_match() {
        let cfg = config(&["."]);
        let resolver = Resolver::new(&cfg).expect("resolver");

        for file in ["lib/foo-bar.js", "lib/foo_bar.js", "lib/foobar.js", "lib/FooBar.js"] {
            let found = resolver.resolve("fooBar", &snapshot(&[file]));
            assert_eq!(found.len(), 1, "expected {file} to match");
        }
        let found = resolver.resolve("foo_bar", &snapshot(&["lib/foo-bar.js"]));
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn leading_underscore_identifier_matches_underscored_file() {
        let cfg = config(&["."]);
        let resolver = Resolver::new(&cfg).expect("resolver");

        let found = resolver.resolve("_privateHelper", &snapshot(&["src/utils/_privateHelper.js"]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].import_path, "src/utils/_privateHelper");

        // The leading marker stays optional: an unprefixed file matches too.
        let found = resolver.resolve("_privateHelper", &snapshot(&["src/utils/privateHelper.js"]));
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn directory_as_module_strips_index_and_package() {
        let cfg = config(&["lib"]);
        let resolver = Resolver::new(&cfg).expect("resolver");

        let found = resolver.resolve("widget", &snapshot(&["lib/widget/index.js"]));
        assert_eq!(found[0].import_path, "widget");

        let found = resolver.resolve("widget", &snapshot(&["lib/widget/package.json"]));
        assert_eq!(found[0].import_path, "widget");
    }

    #[test]
    fn alias_short_circuits_the_file_search() {
        let mut cfg = config(&["src"]);
        cfg.aliases
            .insert("_".into(), AliasSpec::Module("underscore".into()));
        let resolver = Resolver::new(&cfg).expect("resolver");

        // A matching file exists but must never be offered for an alias.
        let found = resolver.resolve("_", &snapshot(&["src/_.js"]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].import_path, "underscore");
        assert_eq!(found[0].lookup_path, None);
    }

    #[test]
    fn overlapping_lookup_paths_dedup_to_shortest_import_path() {
        let cfg = config(&["src", "."]);
        let resolver = Resolver::new(&cfg).expect("resolver");
        let snap = snapshot(&["src/util/Thing.js"]);

        let found = resolver.resolve("thing", &snap);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].import_path, "util/Thing");
        assert_eq!(found[0].lookup_path.as_deref(), Some("src"));
    }

    #[test]
    fn dedup_prefers_earlier_lookup_path_on_ties() {
        // "." and "" both denote the project root, so the same file yields
        // equal-length import paths under each; declaration order breaks
        // the tie toward the earlier lookup path.
        let cfg = config(&[".", ""]);
        let resolver = Resolver::new(&cfg).expect("resolver");
        let snap = snapshot(&["lib/mod.js"]);

        let found = resolver.resolve("mod", &snap);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].import_path, "lib/mod");
        assert_eq!(found[0].lookup_path.as_deref(), Some("."));
    }

    #[test]
    fn excluded_globs_drop_candidates() {
        let mut cfg = config(&["src"]);
        cfg.excludes = vec!["**/__mocks__/**".into()];
        let resolver = Resolver::new(&cfg).expect("resolver");
        let snap = snapshot(&["src/__mocks__/store.js", "src/data/store.js"]);

        let found = resolver.resolve("store", &snap);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].import_path, "data/store");
    }

    #[test]
    fn results_are_deterministic_and_sorted_by_display_name() {
        let cfg = config(&["src"]);
        let resolver = Resolver::new(&cfg).expect("resolver");
        let snap = snapshot(&["src/b/store.js", "src/a/store.js"]);

        let first = resolver.resolve("store", &snap);
        let second = resolver.resolve("store", &snap);
        assert_eq!(first, second);
        assert_eq!(
            first
                .iter()
                .map(|c| c.display_name.as_str())
                .collect::<Vec<_>>(),
            vec!["a/store", "b/store"]
        );
    }

    #[test]
    fn no_match_is_an_empty_result() {
        let cfg = config(&["src"]);
        let resolver = Resolver::new(&cfg).expect("resolver");
        assert!(resolver
            .resolve("missingThing", &snapshot(&["src/other.js"]))
            .is_empty());
    }

    #[test]
    fn identifier_must_match_a_whole_segment() {
        let cfg = config(&["src"]);
        let resolver = Resolver::new(&cfg).expect("resolver");
        // "bar" must not match inside "scrollbar".
        assert!(resolver
            .resolve("bar", &snapshot(&["src/scrollbar.js"]))
            .is_empty());
    }
}

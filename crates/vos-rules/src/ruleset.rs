//! # Rule Sets
//!
//! An immutable, compiled collection of rules kept in evaluation order:
//! priority descending, rule id ascending on ties. A rule set is built all
//! at once; if any definition fails, the whole set is rejected.
//!
//! Rule files are YAML documents with a top-level `rules` list. Paths passed
//! to [`RuleSet::load`] may be files or directories; directories contribute
//! every `*.yaml`/`*.yml` file they contain, in file-name order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use vos_core::ProductId;
use vos_facts::FactSchema;

use crate::error::RuleLoadError;
use crate::rule::{Rule, RuleDef};
use crate::standard::standard_rules;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<RuleDef>,
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile definitions into a rule set.
    pub fn compile(
        defs: impl IntoIterator<Item = RuleDef>,
        schema: &FactSchema,
    ) -> Result<Self, RuleLoadError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::new();
        for def in defs {
            if !seen.insert(def.id.clone()) {
                return Err(RuleLoadError::DuplicateRule { rule_id: def.id });
            }
            rules.push(Rule::compile(def, schema)?);
        }
        rules.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(Self { rules })
    }

    /// The built-in advertising and health rules.
    pub fn standard(schema: &FactSchema) -> Result<Self, RuleLoadError> {
        Self::compile(standard_rules(), schema)
    }

    pub fn from_yaml_str(yaml: &str, schema: &FactSchema) -> Result<Self, RuleLoadError> {
        let file = parse_rule_file(yaml, Path::new("<inline>"))?;
        Self::compile(file.rules, schema)
    }

    /// Load and compile rule files and directories.
    pub fn load(paths: &[PathBuf], schema: &FactSchema) -> Result<Self, RuleLoadError> {
        let mut defs = Vec::new();
        for path in expand_paths(paths)? {
            let content = std::fs::read_to_string(&path).map_err(|source| RuleLoadError::Io {
                path: path.clone(),
                source,
            })?;
            let file = parse_rule_file(&content, &path)?;
            tracing::debug!(path = %path.display(), rules = file.rules.len(), "rule file read");
            defs.extend(file.rules);
        }
        let set = Self::compile(defs, schema)?;
        tracing::info!(rules = set.len(), "rule set loaded");
        Ok(set)
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id().as_str() == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// Enabled rules applicable to a product and event type, in evaluation
    /// order.
    pub fn for_trigger<'a>(
        &'a self,
        product_id: &'a ProductId,
        event_type: &'a str,
    ) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules.iter().filter(move |r| {
            r.enabled() && r.applies_to(product_id) && r.listens_to(event_type)
        })
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

fn parse_rule_file(content: &str, path: &Path) -> Result<RuleFile, RuleLoadError> {
    serde_yaml::from_str(content).map_err(|source| RuleLoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>, RuleLoadError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|source| RuleLoadError::Io {
                path: path.clone(),
                source,
            })?;
            let mut found = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|source| RuleLoadError::Io {
                    path: path.clone(),
                    source,
                })?;
                let file = entry.path();
                let is_yaml = file
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "yaml" || e == "yml");
                if is_yaml && file.is_file() {
                    found.push(file);
                }
            }
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(RuleLoadError::FileNotFound { path: path.clone() });
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"
rules:
  - id: b.alert
    condition: frequency > 4.0
    priority: 10
    action:
      kind: alert
  - id: a.alert
    condition: ctr < 0.01
    priority: 10
    action:
      kind: alert
  - id: kill
    condition: spend > 3 * target_cpa AND conversions == 0
    priority: 100
    action:
      kind: pause
"#;

    fn schema() -> FactSchema {
        FactSchema::standard()
    }

    #[test]
    fn evaluation_order_is_priority_then_id() {
        let set = RuleSet::from_yaml_str(RULES, &schema()).unwrap();
        let ids: Vec<&str> = set.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, vec!["kill", "a.alert", "b.alert"]);
        assert!(set.get("kill").is_some());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let yaml = "rules:\n  - {id: x, condition: in_learning_phase, action: {kind: hold}}\n  - {id: x, condition: in_learning_phase, action: {kind: hold}}\n";
        assert!(matches!(
            RuleSet::from_yaml_str(yaml, &schema()),
            Err(RuleLoadError::DuplicateRule { rule_id }) if rule_id == "x"
        ));
    }

    #[test]
    fn one_bad_rule_rejects_the_set() {
        let yaml = format!("{RULES}  - id: broken\n    condition: spend > 3\n    action:\n      kind: alert\n");
        assert!(matches!(
            RuleSet::from_yaml_str(&yaml, &schema()),
            Err(RuleLoadError::Type { rule_id, .. }) if rule_id == "broken"
        ));
    }

    #[test]
    fn malformed_yaml_is_a_load_error() {
        assert!(matches!(
            RuleSet::from_yaml_str("rules: [", &schema()),
            Err(RuleLoadError::Yaml { .. })
        ));
        assert!(matches!(
            RuleSet::from_yaml_str("rules:\n  - id: x\n    condition: in_learning_phase\n    action: {kind: explode}\n", &schema()),
            Err(RuleLoadError::Yaml { .. })
        ));
    }

    #[test]
    fn load_from_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "rules:\n  - {id: second, condition: in_learning_phase, action: {kind: hold}}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "rules:\n  - {id: first, condition: in_learning_phase, action: {kind: hold}}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = RuleSet::load(&[dir.path().to_path_buf()], &schema()).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn missing_path_is_reported() {
        let err = RuleSet::load(&[PathBuf::from("/nonexistent/rules.yaml")], &schema()).unwrap_err();
        assert!(matches!(err, RuleLoadError::FileNotFound { .. }));
    }

    #[test]
    fn for_trigger_filters_scope_and_type() {
        let yaml = r#"
rules:
  - id: acme.only
    scope: product:acme
    condition: in_learning_phase
    action: {kind: hold}
  - id: ads.only
    triggers: ["schedule.ads_optimization"]
    condition: in_learning_phase
    action: {kind: hold}
  - id: off
    enabled: false
    condition: in_learning_phase
    action: {kind: hold}
"#;
        let set = RuleSet::from_yaml_str(yaml, &schema()).unwrap();
        let acme = ProductId::new("acme").unwrap();
        let other = ProductId::new("other").unwrap();

        let ids = |p: &ProductId, t: &str| -> Vec<String> {
            set.for_trigger(p, t).map(|r| r.id().to_string()).collect()
        };
        assert_eq!(ids(&acme, "schedule.ads_optimization"), vec!["acme.only", "ads.only"]);
        assert_eq!(ids(&other, "schedule.health_check"), Vec::<String>::new());
        assert_eq!(ids(&other, "schedule.ads_optimization"), vec!["ads.only"]);
    }

    #[test]
    fn standard_rules_compile() {
        let set = RuleSet::standard(&schema()).unwrap();
        assert_eq!(set.rules()[0].id().as_str(), "ads.learning_phase_protection");
    }
}

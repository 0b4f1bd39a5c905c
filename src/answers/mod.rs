//! Answer Store: authoritative parameter storage across the run.

mod format;
mod prompt;

pub(crate) use format::AnswerFormat;
pub(crate) use prompt::{Prompter, ScriptedPrompter, TerminalPrompter};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::constants::GENERAL_NAMESPACE;
use crate::error::AppError;
use crate::manifest::ParamDef;

/// A scalar answer value (string, number, or bool), plus the `null`
/// sentinel used by `skip_asking` mode.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub(crate) enum AnswerValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::String(s) => f.write_str(s),
            AnswerValue::Number(n) => write!(f, "{n}"),
            AnswerValue::Bool(b) => write!(f, "{b}"),
            AnswerValue::Null => f.write_str(""),
        }
    }
}

impl From<JsonValue> for AnswerValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::String(s) => AnswerValue::String(s),
            JsonValue::Number(n) => AnswerValue::Number(n.as_f64().unwrap_or_default()),
            JsonValue::Bool(b) => AnswerValue::Bool(b),
            _ => AnswerValue::Null,
        }
    }
}

/// Resolution mode for `resolve_for_component`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ResolveMode {
    /// Prompt only when unset and there is no default.
    Normal,
    /// Always prompt for every parameter (`--ask`).
    Ask,
    /// Never prompt; fall back to `default`, else `null` (used by `fetch`/`genanswers`).
    SkipAsking,
}

type Group = BTreeMap<String, AnswerValue>;

/// Two-level `group -> key -> value` map.
pub(crate) struct AnswerStore {
    groups: BTreeMap<String, Group>,
    prompter: Box<dyn Prompter>,
}

impl fmt::Debug for AnswerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerStore").field("groups", &self.groups).finish()
    }
}

impl AnswerStore {
    pub(crate) fn new(prompter: Box<dyn Prompter>) -> Self {
        Self {
            groups: BTreeMap::new(),
            prompter,
        }
    }

    /// Loads `{group: {key: value}}` from `path`, detecting or using `format`.
    /// A missing file at a caller-specified path is `AnswersNotFound`.
    pub(crate) fn load_from_file(
        &mut self,
        path: &Path,
        format: Option<AnswerFormat>,
    ) -> Result<(), AppError> {
        if !path.exists() {
            return Err(AppError::AnswersNotFound(path.to_owned()));
        }

        let raw = std::fs::read_to_string(path).map_err(|err| AppError::AnswersFormatError {
            path: path.to_owned(),
            format: "unknown",
            source: anyhow::anyhow!(err),
        })?;

        let fmt = format.unwrap_or_else(|| AnswerFormat::detect(path));
        let parsed = fmt.parse(&raw).map_err(|source| AppError::AnswersFormatError {
            path: path.to_owned(),
            format: fmt.name(),
            source,
        })?;

        for (group, kvs) in parsed {
            let entry = self.groups.entry(group).or_default();
            for (k, v) in kvs {
                entry.insert(k, v);
            }
        }

        Ok(())
    }

    /// Loads from `path` only if it exists; otherwise a no-op (used when the
    /// caller did not explicitly request a specific answer file).
    pub(crate) fn load_from_file_if_present(
        &mut self,
        path: &Path,
        format: Option<AnswerFormat>,
    ) -> Result<(), AppError> {
        if path.exists() {
            self.load_from_file(path, format)
        } else {
            Ok(())
        }
    }

    /// Sets each `(k, v)` under `general`, overwriting any existing value.
    pub(crate) fn merge_cli(&mut self, overrides: BTreeMap<String, AnswerValue>) {
        let general = self.groups.entry(GENERAL_NAMESPACE.to_owned()).or_default();
        for (k, v) in overrides {
            if let Some(previous) = general.get(&k) {
                if previous != &v {
                    warn!(key = %k, old = %previous, new = %v, "CLI override replaces existing answer value");
                }
            }
            general.insert(k, v);
        }
    }

    pub(crate) fn get(&self, namespace: &str, key: &str) -> Option<&AnswerValue> {
        self.groups
            .get(namespace)
            .and_then(|g| g.get(key))
            .or_else(|| self.groups.get(GENERAL_NAMESPACE).and_then(|g| g.get(key)))
    }

    pub(crate) fn set(&mut self, namespace: &str, key: &str, value: AnswerValue) {
        self.groups
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
    }

    /// Fills in `general.provider` with the fixed default if it was never
    /// set by any source.
    pub(crate) fn impute_default_provider(&mut self) {
        let general = self.groups.entry(GENERAL_NAMESPACE.to_owned()).or_default();
        if !general.contains_key("provider") {
            warn!(
                default = crate::constants::DEFAULT_PROVIDER,
                "no provider selected, imputing default"
            );
            general.insert(
                "provider".to_owned(),
                AnswerValue::String(crate::constants::DEFAULT_PROVIDER.to_owned()),
            );
        }
    }

    /// Resolves every parameter in `params` for component namespace `ns`,
    /// prompting or falling back to a default according to `mode`.
    pub(crate) fn resolve_for_component(
        &mut self,
        ns: &str,
        params: &[ParamDef],
        mode: ResolveMode,
    ) -> Result<(), AppError> {
        for param in params {
            if self.get(ns, &param.name).is_some() {
                continue;
            }

            let should_prompt = match mode {
                ResolveMode::Ask => true,
                ResolveMode::Normal => param.default.is_none(),
                ResolveMode::SkipAsking => false,
            };

            let resolved = if should_prompt {
                let prompt_text = param
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("value for {ns}.{}", param.name));

                let answer = if param.hidden {
                    self.prompter.ask_hidden(&prompt_text)
                } else {
                    self.prompter.ask(&prompt_text)
                };

                match answer {
                    Ok(text) if !text.is_empty() => AnswerValue::String(text),
                    _ => param
                        .default
                        .clone()
                        .map(AnswerValue::from)
                        .unwrap_or(AnswerValue::Null),
                }
            } else {
                param
                    .default
                    .clone()
                    .map(AnswerValue::from)
                    .unwrap_or(AnswerValue::Null)
            };

            self.set(ns, &param.name, resolved);
        }

        Ok(())
    }

    /// Parameters under `ns` that ended up `null` with no default — used by
    /// `run` to raise `MissingParam`.
    pub(crate) fn missing_params_for(&self, ns: &str, params: &[ParamDef]) -> Vec<String> {
        params
            .iter()
            .filter(|p| p.default.is_none() && matches!(self.get(ns, &p.name), Some(AnswerValue::Null) | None))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Deep copy sorted so `general` appears first.
    pub(crate) fn snapshot(&self) -> Vec<(String, Group)> {
        let mut groups: Vec<(String, Group)> = self
            .groups
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        groups.sort_by(|(a, _), (b, _)| match (a.as_str(), b.as_str()) {
            (GENERAL_NAMESPACE, GENERAL_NAMESPACE) => std::cmp::Ordering::Equal,
            (GENERAL_NAMESPACE, _) => std::cmp::Ordering::Less,
            (_, GENERAL_NAMESPACE) => std::cmp::Ordering::Greater,
            (a, b) => a.cmp(b),
        });

        groups
    }

    /// Writes the current snapshot to `path` in `format`, atomically
    /// (write-temp + rename).
    pub(crate) fn write_to_file(&self, path: &Path, format: AnswerFormat) -> Result<(), AppError> {
        let rendered = format
            .serialize(&self.snapshot())
            .map_err(|source| AppError::AnswersFormatError {
                path: path.to_owned(),
                format: format.name(),
                source,
            })?;

        write_atomic(path, &rendered).map_err(|source| AppError::AnswersFormatError {
            path: path.to_owned(),
            format: format.name(),
            source,
        })
    }
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path: PathBuf = {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "answers".to_owned());
        parent.join(format!(".{file_name}.tmp"))
    };

    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AnswerStore {
        AnswerStore::new(Box::new(ScriptedPrompter::new(vec![])))
    }

    #[test]
    fn cli_overrides_take_precedence_and_warn_on_conflict() {
        let mut s = store();
        s.set(GENERAL_NAMESPACE, "namespace", AnswerValue::String("file-ns".into()));

        let mut overrides = BTreeMap::new();
        overrides.insert("namespace".to_owned(), AnswerValue::String("cli-ns".into()));
        s.merge_cli(overrides);

        assert_eq!(
            s.get(GENERAL_NAMESPACE, "namespace"),
            Some(&AnswerValue::String("cli-ns".into()))
        );
    }

    #[test]
    fn resolve_falls_back_to_default_in_skip_asking_mode() {
        let mut s = store();
        let params = vec![ParamDef {
            name: "port".into(),
            default: Some(JsonValue::from(8080)),
            description: None,
            hidden: false,
        }];

        s.resolve_for_component("helloweb", &params, ResolveMode::SkipAsking)
            .expect("should resolve");

        assert_eq!(
            s.get("helloweb", "port"),
            Some(&AnswerValue::Number(8080.0))
        );
    }

    #[test]
    fn resolve_prompts_when_no_default_and_not_skip_asking() {
        let mut prompter = ScriptedPrompter::new(vec!["typed-value".to_owned()]);
        prompter.expect_hidden = false;
        let mut s = AnswerStore::new(Box::new(prompter));

        let params = vec![ParamDef {
            name: "secret".into(),
            default: None,
            description: None,
            hidden: false,
        }];

        s.resolve_for_component("app", &params, ResolveMode::Normal)
            .expect("should resolve");

        assert_eq!(
            s.get("app", "secret"),
            Some(&AnswerValue::String("typed-value".into()))
        );
    }

    #[test]
    fn missing_params_detects_null_without_default() {
        let mut s = store();
        let params = vec![ParamDef {
            name: "required".into(),
            default: None,
            description: None,
            hidden: false,
        }];
        s.resolve_for_component("app", &params, ResolveMode::SkipAsking)
            .unwrap();

        assert_eq!(s.missing_params_for("app", &params), vec!["required".to_owned()]);
    }

    #[test]
    fn snapshot_sorts_general_first() {
        let mut s = store();
        s.set("zeta", "k", AnswerValue::String("v".into()));
        s.set(GENERAL_NAMESPACE, "k", AnswerValue::String("v".into()));
        s.set("alpha", "k", AnswerValue::String("v".into()));

        let snap = s.snapshot();
        assert_eq!(snap[0].0, GENERAL_NAMESPACE);
        assert_eq!(snap[1].0, "alpha");
        assert_eq!(snap[2].0, "zeta");
    }
}

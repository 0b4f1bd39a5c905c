//! Parsing of a single Manifest file.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One parameter definition carried by a Manifest (`params` entry).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub(crate) struct ParamDef {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) default: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) hidden: bool,
}

/// Kind of a `requirements` entry. Only `persistentVolume` is
/// dispatched by the core today; other kinds still parse, so that a
/// Manifest using a future requirement kind fails late (`UnsupportedRequirement`
/// at dispatch time) rather than at parse time.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub(crate) struct Requirement {
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) params: BTreeMap<String, serde_json::Value>,
}

/// A Manifest artifact reference.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub(crate) enum ArtifactRef {
    Inherit {
        inherit: Vec<String>,
    },
    Resource {
        resource: String,
        #[serde(default)]
        params: Option<BTreeMap<String, Vec<String>>>,
    },
    Path(String),
}

/// One child descriptor in a Manifest's `graph` sequence.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub(crate) struct GraphEntry {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) source: Option<String>,
    #[serde(default)]
    pub(crate) params: Vec<ParamDef>,
    #[serde(default)]
    pub(crate) artifacts: BTreeMap<String, Vec<ArtifactRef>>,
    #[serde(default)]
    pub(crate) requirements: Vec<Requirement>,
}

/// The parsed contents of one Manifest file.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub(crate) struct Manifest {
    pub(crate) id: String,
    pub(crate) specversion: String,
    #[serde(default)]
    pub(crate) metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub(crate) params: Vec<ParamDef>,
    #[serde(default)]
    pub(crate) requirements: Vec<Requirement>,
    #[serde(default)]
    pub(crate) graph: Vec<GraphEntry>,
    #[serde(default)]
    pub(crate) artifacts: BTreeMap<String, Vec<ArtifactRef>>,
}

/// Dispatches JSON vs. YAML by sniffing the first non-whitespace byte, then
/// parses, attaching a three-line context window around the failure point
/// on error.
pub(crate) fn parse_manifest(path: &Path, source: &str) -> Result<Manifest, AppError> {
    let looks_like_json = source
        .trim_start()
        .starts_with(['{', '['])
        && !source.trim_start().starts_with("---");

    if looks_like_json {
        serde_json::from_str(source).map_err(|err| {
            let line = err.line();
            let column = err.column();
            AppError::ParseError {
                path: path.to_owned(),
                message: err.to_string(),
                line,
                column,
                context: context_window(source, line),
            }
        })
    } else {
        serde_yaml::from_str(source).map_err(|err| {
            let (line, column) = err
                .location()
                .map(|loc| (loc.line(), loc.column()))
                .unwrap_or((0, 0));
            AppError::ParseError {
                path: path.to_owned(),
                message: err.to_string(),
                line,
                column,
                context: context_window(source, line),
            }
        })
    }
}

/// Returns up to one line before and one line after `line` (1-indexed),
/// with `line` itself, each tagged with its own line number.
fn context_window(source: &str, line: usize) -> String {
    if line == 0 {
        return String::new();
    }

    let lines: Vec<&str> = source.lines().collect();
    let idx = line.saturating_sub(1);
    let start = idx.saturating_sub(1);
    let end = (idx + 1).min(lines.len().saturating_sub(1));

    let mut out = String::new();
    for (n, text) in lines.iter().enumerate().take(end + 1).skip(start) {
        let _ = writeln!(out, "{:>4} | {}", n + 1, text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_json_manifest() {
        let src = r#"{
            "id": "helloweb",
            "specversion": "1.0",
            "params": [{"name": "port", "default": 8080}],
            "artifacts": {"kubernetes": ["artifacts/kubernetes/pod.yaml"]}
        }"#;
        let m = parse_manifest(&PathBuf::from("Nuleculefile"), src).expect("should parse");
        assert_eq!(m.id, "helloweb");
        assert_eq!(m.params[0].name, "port");
    }

    #[test]
    fn parses_yaml_manifest_with_graph_and_requirements() {
        let src = r#"
id: app
specversion: "1.0"
requirements:
  - kind: persistentVolume
    params:
      size: 1Gi
graph:
  - name: db
    source: docker://registry/db:1
artifacts:
  kubernetes:
    - artifacts/kubernetes/pod.yaml
    - inherit: [kubernetes]
"#;
        let m = parse_manifest(&PathBuf::from("Nuleculefile"), src).expect("should parse");
        assert_eq!(m.graph[0].name, "db");
        assert_eq!(m.requirements[0].kind, "persistentVolume");
        assert!(matches!(m.artifacts["kubernetes"][1], ArtifactRef::Inherit { .. }));
    }

    #[test]
    fn parse_error_carries_context_window() {
        let src = "id: app\nspecversion: \"1.0\"\n  bad: [unterminated\n";
        let err = parse_manifest(&PathBuf::from("Nuleculefile"), src).unwrap_err();
        match err {
            AppError::ParseError { context, .. } => assert!(!context.is_empty()),
            _ => panic!("expected ParseError"),
        }
    }
}

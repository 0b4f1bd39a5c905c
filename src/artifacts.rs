//! Artifact Renderer: template substitution plus JSON-pointer
//! parameter injection, writing rendered siblings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::answers::AnswerValue;
use crate::component::{sanitize_relative, Component};
use crate::error::AppError;
use crate::manifest::ArtifactRef;

/// Renders every artifact declared for `provider` on `component`, returning
/// the rendered paths relative to `component.basepath`.
pub(crate) fn render_provider_artifacts(
    component: &Component,
    provider: &str,
    context: &BTreeMap<String, AnswerValue>,
) -> Result<Vec<PathBuf>, AppError> {
    let refs = expand_inherited(component, provider)?;
    let mut rendered = Vec::new();

    for artifact_ref in refs {
        match artifact_ref {
            ArtifactRef::Path(rel) => {
                rendered.extend(render_one(component, &rel, None, context)?);
            }
            ArtifactRef::Resource { resource, params } => {
                rendered.extend(render_one(component, &resource, params.as_ref(), context)?);
            }
            ArtifactRef::Inherit { .. } => unreachable!("inherit already expanded"),
        }
    }

    Ok(rendered)
}

/// Expands `{inherit: [p1, p2, ...]}` references into the concrete artifact
/// list of the referenced providers, preserving order and removing
/// duplicates.
fn expand_inherited(component: &Component, provider: &str) -> Result<Vec<ArtifactRef>, AppError> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    expand_inherited_into(component, provider, &mut seen, &mut out, 0)?;
    Ok(out)
}

fn dedup_key(artifact_ref: &ArtifactRef) -> String {
    match artifact_ref {
        ArtifactRef::Path(p) => p.clone(),
        ArtifactRef::Resource { resource, .. } => resource.clone(),
        ArtifactRef::Inherit { inherit } => format!("inherit:{}", inherit.join(",")),
    }
}

fn expand_inherited_into(
    component: &Component,
    provider: &str,
    seen: &mut std::collections::HashSet<String>,
    out: &mut Vec<ArtifactRef>,
    depth: usize,
) -> Result<(), AppError> {
    if depth > 16 {
        return Err(AppError::RenderError {
            path: component.basepath.clone(),
            message: format!("inherit chain for provider '{provider}' is too deep (possible cycle)"),
        });
    }

    let Some(refs) = component.artifacts.get(provider) else {
        return Ok(());
    };

    for artifact_ref in refs {
        if let ArtifactRef::Inherit { inherit } = artifact_ref {
            for parent_provider in inherit {
                expand_inherited_into(component, parent_provider, seen, out, depth + 1)?;
            }
        } else {
            let key = dedup_key(artifact_ref);
            if seen.insert(key) {
                out.push(artifact_ref.clone());
            }
        }
    }

    Ok(())
}

fn render_one(
    component: &Component,
    relative: &str,
    pointer_params: Option<&BTreeMap<String, Vec<String>>>,
    context: &BTreeMap<String, AnswerValue>,
) -> Result<Vec<PathBuf>, AppError> {
    let abs_path = component
        .sanitized_artifact_path(relative)
        .ok_or_else(|| AppError::RenderError {
            path: PathBuf::from(relative),
            message: "artifact path escapes component basepath".to_owned(),
        })?;

    if abs_path.is_dir() {
        return render_directory(component, &abs_path, context);
    }

    let rendered_path = render_file(component, &abs_path, pointer_params, context)?;
    Ok(vec![rendered_path])
}

fn render_directory(
    component: &Component,
    dir: &Path,
    context: &BTreeMap<String, AnswerValue>,
) -> Result<Vec<PathBuf>, AppError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|err| AppError::RenderError {
            path: dir.to_owned(),
            message: format!("could not list directory: {err}"),
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            !p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(false)
        })
        .collect();

    entries.sort();

    if entries.is_empty() {
        return Err(AppError::RenderError {
            path: dir.to_owned(),
            message: "artifact directory is empty".to_owned(),
        });
    }

    let mut rendered = Vec::new();
    for file in entries {
        rendered.push(render_file(component, &file, None, context)?);
    }
    Ok(rendered)
}

fn render_file(
    component: &Component,
    abs_path: &Path,
    pointer_params: Option<&BTreeMap<String, Vec<String>>>,
    context: &BTreeMap<String, AnswerValue>,
) -> Result<PathBuf, AppError> {
    let original = std::fs::read_to_string(abs_path).map_err(|err| AppError::RenderError {
        path: abs_path.to_owned(),
        message: format!("could not read artifact: {err}"),
    })?;

    let after_pointers = if let Some(pointer_map) = pointer_params {
        inject_pointers(abs_path, &original, pointer_map)?
    } else {
        original
    };

    let substituted = substitute_vars(&after_pointers, context);

    let dest = sibling_rendered_path(abs_path);
    std::fs::write(&dest, substituted).map_err(|err| AppError::RenderError {
        path: dest.clone(),
        message: format!("could not write rendered artifact: {err}"),
    })?;

    debug!(?abs_path, ?dest, "rendered artifact");

    dest.strip_prefix(&component.basepath)
        .map(PathBuf::from)
        .map_err(|_| AppError::RenderError {
            path: dest.clone(),
            message: "rendered path is not inside component basepath".to_owned(),
        })
}

/// Step 1 of the pipeline: parse `text` as JSON or YAML and set each pointer
/// target to the literal parameter name, to be substituted in step 2.
/// If `text` is not structured data, this step is a no-op.
fn inject_pointers(
    path: &Path,
    text: &str,
    pointer_params: &BTreeMap<String, Vec<String>>,
) -> Result<String, AppError> {
    let is_json_like = text.trim_start().starts_with(['{', '[']);

    let mut value: serde_json::Value = if is_json_like {
        match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => {
                debug!(?path, "artifact is not structured data, skipping pointer injection");
                return Ok(text.to_owned());
            }
        }
    } else {
        match serde_yaml::from_str(text) {
            Ok(v) => v,
            Err(_) => {
                debug!(?path, "artifact is not structured data, skipping pointer injection");
                return Ok(text.to_owned());
            }
        }
    };

    for (param_name, pointers) in pointer_params {
        for pointer in pointers {
            let target = value.pointer_mut(pointer).ok_or_else(|| AppError::RenderError {
                path: path.to_owned(),
                message: format!("JSON pointer '{pointer}' not found for parameter '{param_name}'"),
            })?;
            *target = serde_json::Value::String(format!("${param_name}"));
        }
    }

    if text.trim_start().starts_with(['{', '[']) {
        serde_json::to_string_pretty(&value).map_err(|err| AppError::RenderError {
            path: path.to_owned(),
            message: format!("could not re-serialize after pointer injection: {err}"),
        })
    } else {
        serde_yaml::to_string(&value).map_err(|err| AppError::RenderError {
            path: path.to_owned(),
            message: format!("could not re-serialize after pointer injection: {err}"),
        })
    }
}

/// Step 2: `$VAR`/`${VAR}` substitution from `context`. Unknown variables
/// are left intact.
fn substitute_vars(text: &str, context: &BTreeMap<String, AnswerValue>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        if text[i + 1..].starts_with('{') {
            if let Some(end) = text[i + 2..].find('}') {
                let name = &text[i + 2..i + 2 + end];
                if let Some(value) = context.get(name) {
                    out.push_str(&value.to_string());
                } else {
                    out.push_str(&text[i..i + 2 + end + 1]);
                }
                while let Some(&(pos, _)) = chars.peek() {
                    if pos < i + 2 + end + 1 {
                        chars.next();
                    } else {
                        break;
                    }
                }
                continue;
            }
        }

        let rest = &text[i + 1..];
        let name_len = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .map(|c| c.len_utf8())
            .sum::<usize>();

        if name_len > 0 {
            let name = &rest[..name_len];
            if let Some(value) = context.get(name) {
                out.push_str(&value.to_string());
            } else {
                out.push('$');
                out.push_str(name);
            }
            while let Some(&(pos, _)) = chars.peek() {
                if pos < i + 1 + name_len {
                    chars.next();
                } else {
                    break;
                }
            }
            continue;
        }

        out.push('$');
    }

    out
}

fn sibling_rendered_path(abs_path: &Path) -> PathBuf {
    let parent = abs_path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = abs_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent.join(format!(".{file_name}"))
}

/// Re-joins an untrusted relative path against `base`; used by callers that
/// need the sanitization rule without a `Component` at hand (kept close to
/// `Component::sanitized_artifact_path` so the two never drift apart).
#[allow(dead_code)]
pub(crate) fn sanitize(base: &Path, relative: &str) -> Option<PathBuf> {
    sanitize_relative(base, relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentState;
    use std::collections::BTreeMap as Map;

    fn make_component(basepath: &Path, artifacts: BTreeMap<String, Vec<ArtifactRef>>) -> Component {
        Component {
            id: "app".into(),
            basepath: basepath.to_owned(),
            namespace: "app".into(),
            specversion: "1.0".into(),
            params: vec![],
            artifacts,
            requirements: vec![],
            source: None,
            rendered_artifacts: Map::new(),
            state: ComponentState::Created,
        }
    }

    #[test]
    fn substitutes_simple_variable() {
        let mut ctx = Map::new();
        ctx.insert("port".to_owned(), AnswerValue::Number(8080.0));
        assert_eq!(substitute_vars("listen $port end", &ctx), "listen 8080 end");
        assert_eq!(substitute_vars("listen ${port} end", &ctx), "listen 8080 end");
    }

    #[test]
    fn leaves_unknown_variable_intact() {
        let ctx = Map::new();
        assert_eq!(substitute_vars("value: $missing", &ctx), "value: $missing");
    }

    #[test]
    fn renders_file_artifact_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("artifacts/kubernetes")).unwrap();
        std::fs::write(
            dir.path().join("artifacts/kubernetes/pod.yaml"),
            "port: $port\n",
        )
        .unwrap();

        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            "kubernetes".to_owned(),
            vec![ArtifactRef::Path("artifacts/kubernetes/pod.yaml".to_owned())],
        );
        let component = make_component(dir.path(), artifacts);

        let mut ctx = Map::new();
        ctx.insert("port".to_owned(), AnswerValue::Number(8080.0));

        let rendered1 = render_provider_artifacts(&component, "kubernetes", &ctx).unwrap();
        let bytes1 = std::fs::read(dir.path().join(&rendered1[0])).unwrap();

        let rendered2 = render_provider_artifacts(&component, "kubernetes", &ctx).unwrap();
        let bytes2 = std::fs::read(dir.path().join(&rendered2[0])).unwrap();

        assert_eq!(bytes1, bytes2);
        assert_eq!(rendered1[0], PathBuf::from("artifacts/kubernetes/.pod.yaml"));
        assert!(String::from_utf8(bytes1).unwrap().contains("8080"));
    }

    #[test]
    fn empty_directory_is_render_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("artifacts/kubernetes")).unwrap();

        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            "kubernetes".to_owned(),
            vec![ArtifactRef::Path("artifacts/kubernetes".to_owned())],
        );
        let component = make_component(dir.path(), artifacts);

        let err = render_provider_artifacts(&component, "kubernetes", &Map::new()).unwrap_err();
        assert!(matches!(err, AppError::RenderError { .. }));
    }

    #[test]
    fn inherit_expands_and_dedupes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("artifacts/kubernetes")).unwrap();
        std::fs::write(dir.path().join("artifacts/kubernetes/a.yaml"), "a").unwrap();
        std::fs::write(dir.path().join("artifacts/kubernetes/b.yaml"), "b").unwrap();

        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            "kubernetes".to_owned(),
            vec![
                ArtifactRef::Path("artifacts/kubernetes/a.yaml".to_owned()),
                ArtifactRef::Path("artifacts/kubernetes/b.yaml".to_owned()),
            ],
        );
        artifacts.insert(
            "openshift".to_owned(),
            vec![
                ArtifactRef::Inherit { inherit: vec!["kubernetes".to_owned()] },
                ArtifactRef::Path("artifacts/kubernetes/a.yaml".to_owned()),
            ],
        );
        let component = make_component(dir.path(), artifacts);

        let refs = expand_inherited(&component, "openshift").unwrap();
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn artifact_path_cannot_escape_basepath() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut artifacts = BTreeMap::new();
        artifacts.insert("kubernetes".to_owned(), vec![ArtifactRef::Path("../escape.yaml".to_owned())]);
        let component = make_component(dir.path(), artifacts);

        let err = render_provider_artifacts(&component, "kubernetes", &Map::new()).unwrap_err();
        assert!(matches!(err, AppError::RenderError { .. }));
    }
}

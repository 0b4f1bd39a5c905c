//! Dependency Graph: an arena of integer-indexed nodes rather than
//! parent/child pointers. Components live in a single `Vec`; edges are index
//! pairs recorded separately, so parent and child never hold references to
//! each other.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::component::{Component, ComponentState};
use crate::constants::MANIFEST_NAME;
use crate::container_source::{application_entity_path, ContainerSource};
use crate::error::AppError;
use crate::manifest::{parse_manifest, GraphEntry, Manifest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct NodeIndex(pub(crate) usize);

/// The component graph: an arena of nodes plus a forward adjacency list.
pub(crate) struct Graph {
    nodes: Vec<Component>,
    children: Vec<Vec<NodeIndex>>,
}

impl Graph {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            children: Vec::new(),
        }
    }

    fn insert(&mut self, component: Component) -> NodeIndex {
        let idx = NodeIndex(self.nodes.len());
        self.nodes.push(component);
        self.children.push(Vec::new());
        idx
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> &Component {
        &self.nodes[idx.0]
    }

    pub(crate) fn node_mut(&mut self, idx: NodeIndex) -> &mut Component {
        &mut self.nodes[idx.0]
    }

    pub(crate) fn children_of(&self, idx: NodeIndex) -> &[NodeIndex] {
        &self.children[idx.0]
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn root(&self) -> NodeIndex {
        NodeIndex(0)
    }

    /// Topological order, leaves first (reverse order is children-before-parents).
    pub(crate) fn topological_order(&self) -> Result<Vec<NodeIndex>, AppError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        fn visit(
            graph: &Graph,
            idx: NodeIndex,
            marks: &mut [Mark],
            order: &mut Vec<NodeIndex>,
            stack: &mut Vec<String>,
        ) -> Result<(), AppError> {
            match marks[idx.0] {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    stack.push(graph.node(idx).id.clone());
                    return Err(AppError::GraphCycle(stack.join(" -> ")));
                }
                Mark::Unvisited => {}
            }

            marks[idx.0] = Mark::InProgress;
            stack.push(graph.node(idx).id.clone());

            for &child in graph.children_of(idx) {
                visit(graph, child, marks, order, stack)?;
            }

            stack.pop();
            marks[idx.0] = Mark::Done;
            order.push(idx);
            Ok(())
        }

        let mut stack = Vec::new();
        visit(self, self.root(), &mut marks, &mut order, &mut stack)?;

        // `order` is post-order (children before parents); that is exactly
        // "reverse topological". Forward topological is its reverse.
        Ok(order)
    }

    /// Forward order: parents before children (used for artifact dispatch).
    pub(crate) fn forward_order(&self) -> Result<Vec<NodeIndex>, AppError> {
        let mut rev = self.topological_order()?;
        rev.reverse();
        Ok(rev)
    }
}

/// Builds the root Component from a local path already materialized on disk,
/// then recursively loads/unpacks its children.
///
/// `image_stack` tracks the chain of image references currently being
/// unpacked, to detect a component image transitively containing itself
/// via `source`.
pub(crate) fn build_graph(
    root_path: &Path,
    unpack: bool,
    update: bool,
    container_source: &ContainerSource,
) -> Result<Graph, AppError> {
    let mut graph = Graph::new();
    let mut image_stack: Vec<String> = Vec::new();
    load_component(
        &mut graph,
        root_path,
        crate::constants::GENERAL_NAMESPACE.to_owned(),
        None,
        unpack,
        update,
        container_source,
        &mut image_stack,
    )?;
    Ok(graph)
}

#[allow(clippy::too_many_arguments)]
fn load_component(
    graph: &mut Graph,
    basepath: &Path,
    namespace: String,
    source: Option<String>,
    unpack: bool,
    update: bool,
    container_source: &ContainerSource,
    image_stack: &mut Vec<String>,
) -> Result<NodeIndex, AppError> {
    let manifest = read_manifest(basepath)?;

    let idx = graph.insert(Component {
        id: manifest.id.clone(),
        basepath: basepath.to_owned(),
        namespace,
        specversion: manifest.specversion.clone(),
        params: manifest.params.clone(),
        artifacts: manifest.artifacts.clone(),
        requirements: manifest.requirements.clone(),
        source,
        rendered_artifacts: BTreeMap::new(),
        state: ComponentState::Created,
    });

    if unpack {
        for entry in &manifest.graph {
            let child_idx = load_child(
                graph,
                graph.node(idx).basepath.clone(),
                entry,
                update,
                container_source,
                image_stack,
            )?;
            graph.children[idx.0].push(child_idx);
        }
    }

    Ok(idx)
}

fn load_child(
    graph: &mut Graph,
    parent_basepath: PathBuf,
    entry: &GraphEntry,
    update: bool,
    container_source: &ContainerSource,
    image_stack: &mut Vec<String>,
) -> Result<NodeIndex, AppError> {
    if let Some(image) = &entry.source {
        if image_stack.contains(image) {
            let mut chain = image_stack.clone();
            chain.push(image.clone());
            return Err(AppError::GraphCycle(chain.join(" -> ")));
        }

        let child_basepath = parent_basepath
            .join(crate::constants::EXTERNAL_DIR)
            .join(&entry.name);

        let needs_fetch = update || !child_basepath.join(MANIFEST_NAME).exists();
        if needs_fetch {
            debug!(%image, ?child_basepath, "unpacking external child");
            container_source.pull(image)?;
            container_source.extract(
                image,
                application_entity_path(),
                &child_basepath,
                update,
            )?;
        }

        image_stack.push(image.clone());
        let result = load_component(
            graph,
            &child_basepath,
            entry.name.clone(),
            Some(image.clone()),
            true,
            update,
            container_source,
            image_stack,
        );
        image_stack.pop();

        let idx = result?;

        // an external child's Manifest `id` must be recoverable; the manifest
        // was just parsed by `load_component`, so this simply confirms the
        // `id` field is non-empty.
        if graph.node(idx).id.is_empty() {
            return Err(AppError::ParseError {
                path: child_basepath.join(MANIFEST_NAME),
                message: "manifest is missing 'id'".to_owned(),
                line: 0,
                column: 0,
                context: String::new(),
            });
        }

        Ok(idx)
    } else {
        // Internal child: same basepath as parent, own namespace, params and
        // artifacts come from the descriptor rather than a nested Manifest.
        let idx = graph.insert(Component {
            id: entry.name.clone(),
            basepath: parent_basepath,
            namespace: entry.name.clone(),
            specversion: String::new(),
            params: entry.params.clone(),
            artifacts: entry.artifacts.clone(),
            requirements: entry.requirements.clone(),
            source: None,
            rendered_artifacts: BTreeMap::new(),
            state: ComponentState::Created,
        });
        Ok(idx)
    }
}

fn read_manifest(basepath: &Path) -> Result<Manifest, AppError> {
    let path = basepath.join(MANIFEST_NAME);
    let source = fs::read_to_string(&path).map_err(|err| AppError::ParseError {
        path: path.clone(),
        message: format!("could not read manifest: {err}"),
        line: 0,
        column: 0,
        context: String::new(),
    })?;
    parse_manifest(&path, &source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, contents: &str) {
        fs::write(dir.join(MANIFEST_NAME), contents).expect("write manifest");
    }

    #[test]
    fn builds_single_node_graph_without_unpack() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), "id: app\nspecversion: \"1.0\"\n");

        let source = ContainerSource::new("podman", true);
        let graph = build_graph(dir.path(), false, false, &source).expect("should build");
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node(graph.root()).id, "app");
    }

    #[test]
    fn builds_graph_with_internal_child() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"
id: app
specversion: "1.0"
graph:
  - name: sidecar
    params:
      - name: port
        default: 9000
"#,
        );

        let source = ContainerSource::new("podman", true);
        let graph = build_graph(dir.path(), true, false, &source).expect("should build");
        assert_eq!(graph.len(), 2);
        let child = graph.children_of(graph.root())[0];
        assert_eq!(graph.node(child).id, "sidecar");
        assert_eq!(graph.node(child).namespace, "sidecar");
        assert_eq!(graph.node(child).basepath, graph.node(graph.root()).basepath);
    }

    #[test]
    fn topological_order_is_leaves_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"
id: app
specversion: "1.0"
graph:
  - name: a
  - name: b
"#,
        );

        let source = ContainerSource::new("podman", true);
        let graph = build_graph(dir.path(), true, false, &source).expect("should build");
        let order = graph.topological_order().expect("should sort");
        // Root must come last in reverse-topological (leaves-first) order.
        assert_eq!(*order.last().unwrap(), graph.root());
        assert_eq!(order.len(), 3);

        let forward = graph.forward_order().expect("should sort");
        assert_eq!(forward[0], graph.root());
    }
}

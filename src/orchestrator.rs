//! Orchestrator: ties the dependency graph, answer store,
//! artifact renderer and provider registry together into the `fetch`,
//! `run`, `stop` and `genanswers` lifecycles.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{info, warn};

use crate::answers::{AnswerFormat, AnswerStore, AnswerValue, ResolveMode};
use crate::component::ComponentState;
use crate::constants::{ANSWERS_NAME, ANSWERS_RUNTIME, ANSWERS_SAMPLE, GENERAL_NAMESPACE};
use crate::container_source::{application_entity_path, ContainerSource};
use crate::error::AppError;
use crate::graph::{build_graph, Graph, NodeIndex};
use crate::providers;
use crate::status::{StatusHandle, StatusSnapshot};

/// Where to materialize an image-backed application.
#[derive(Clone, Debug)]
pub(crate) enum Destination {
    Path(PathBuf),
    Ephemeral,
}

pub(crate) struct Orchestrator {
    container_source: ContainerSource,
    dry_run: bool,
}

impl Orchestrator {
    pub(crate) fn new(container_source: ContainerSource, dry_run: bool) -> Self {
        Self { container_source, dry_run }
    }

    /// `fetch`: materializes the full dependency tree on disk, resolves
    /// every parameter in `skip_asking` mode and writes a sample answer
    /// file at `app_path/<ANSWERS_SAMPLE>`.
    pub(crate) fn fetch(
        &self,
        app_spec: Option<&str>,
        destination: Option<Destination>,
        no_deps: bool,
        update: bool,
    ) -> Result<FetchOutcome, AppError> {
        let (root, _guard) = self.materialize_app(app_spec, destination, update)?;
        let graph = build_graph(&root, !no_deps, update, &self.container_source)?;

        let store = self.resolve_skip_asking(&graph)?;
        let out_path = root.join(ANSWERS_SAMPLE);
        store.write_to_file(&out_path, AnswerFormat::Ini)?;

        info!(components = graph.len(), ?root, path = ?out_path, "fetch complete");
        Ok(FetchOutcome { root, component_count: graph.len(), _guard })
    }

    /// `genanswers`: same as `fetch`, but writes to `./<ANSWERS_NAME>` in
    /// the current working directory; it is an error if that file already
    /// exists.
    pub(crate) fn genanswers(
        &self,
        app_spec: Option<&str>,
        answers_format: Option<AnswerFormat>,
    ) -> Result<PathBuf, AppError> {
        let (root, _guard) = self.materialize_app(app_spec, None, false)?;
        let graph = build_graph(&root, true, false, &self.container_source)?;

        let out_path = std::env::current_dir()
            .map_err(|err| AppError::Other(anyhow::anyhow!(err)))?
            .join(ANSWERS_NAME);
        if out_path.exists() {
            return Err(AppError::Other(anyhow::anyhow!(
                "answer file {} already exists",
                out_path.display()
            )));
        }

        let store = self.resolve_skip_asking(&graph)?;
        store.write_to_file(&out_path, answers_format.unwrap_or(AnswerFormat::Ini))?;
        info!(path = ?out_path, "wrote sample answer file");
        Ok(out_path)
    }

    /// Resolves every component's parameters in `skip_asking` mode,
    /// children before parents, so a child's own default never sees a
    /// parent's `general` default that has not been filled in yet.
    fn resolve_skip_asking(&self, graph: &Graph) -> Result<AnswerStore, AppError> {
        let mut store = AnswerStore::new(Box::new(crate::answers::TerminalPrompter));
        for idx in graph.topological_order()? {
            let component = graph.node(idx);
            store
                .resolve_for_component(&component.namespace, &component.params, ResolveMode::SkipAsking)
                .map_err(|err| annotate_component(err, &component.id))?;
        }
        store.impute_default_provider();
        Ok(store)
    }

    /// `run`: resolves every component's config in reverse topological
    /// order (children before parents, so a child's own value is settled
    /// before a shared name like `namespace` gets filled in from `general`
    /// by the root), then renders and deploys in forward order (parents
    /// before children).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run(
        &self,
        app_spec: Option<&str>,
        destination: Option<Destination>,
        answers_path: Option<&Path>,
        write_answers_path: Option<&Path>,
        provider_override: Option<&str>,
        cli_overrides: BTreeMap<String, AnswerValue>,
        ask: bool,
        answers_format: Option<AnswerFormat>,
        status: Option<&StatusHandle>,
    ) -> Result<RunOutcome, AppError> {
        let (root, _guard) = self.materialize_app(app_spec, destination, false)?;
        let mut graph = build_graph(&root, true, false, &self.container_source)?;

        let mut store = AnswerStore::new(Box::new(crate::answers::TerminalPrompter));
        self.seed_answers(&mut store, &root, answers_path, answers_format, cli_overrides, provider_override)?;

        let mode = if ask { ResolveMode::Ask } else { ResolveMode::Normal };
        for idx in graph.topological_order()? {
            self.resolve_component(&mut graph, idx, &mut store, mode)?;
        }

        let order = graph.forward_order()?;
        for idx in &order {
            self.dispatch_component(&mut graph, *idx, &mut store)?;
            publish_status(status, "run", &store);
        }

        let runtime_path = write_answers_path
            .map(Path::to_owned)
            .unwrap_or_else(|| root.join(ANSWERS_RUNTIME));
        store.write_to_file(&runtime_path, answers_format.unwrap_or(AnswerFormat::Ini))?;

        info!(components = order.len(), ?root, "run complete");
        Ok(RunOutcome { root, runtime_answers_path: runtime_path, _guard })
    }

    /// `stop`: re-renders artifacts from the persisted runtime
    /// answers and undeploys each component, parents before children (the
    /// same order `run` deploys in; cascade delete within one component's
    /// own artifact list is handled per-provider by kind precedence).
    pub(crate) fn stop(&self, app_spec: &str, provider_override: Option<&str>) -> Result<(), AppError> {
        let root = PathBuf::from(app_spec);
        let mut graph = build_graph(&root, true, false, &self.container_source)?;

        let mut store = AnswerStore::new(Box::new(crate::answers::TerminalPrompter));
        let runtime_path = root.join(ANSWERS_RUNTIME);
        store.load_from_file(&runtime_path, Some(AnswerFormat::Ini))?;
        if let Some(name) = provider_override {
            store.set(GENERAL_NAMESPACE, "provider", AnswerValue::String(name.to_owned()));
        }

        let order = graph.forward_order()?;
        for idx in &order {
            self.teardown_component(&mut graph, *idx, &store)?;
        }

        info!(components = order.len(), ?root, "stop complete");
        Ok(())
    }

    /// Resolves one component's parameters against the answer store and
    /// checks for missing required values, marking the component `Failed`
    /// on any error before propagating it.
    fn resolve_component(
        &self,
        graph: &mut Graph,
        idx: NodeIndex,
        store: &mut AnswerStore,
        mode: ResolveMode,
    ) -> Result<(), AppError> {
        match self.try_resolve_component(graph, idx, store, mode) {
            Ok(()) => Ok(()),
            Err(err) => {
                graph.node_mut(idx).transition(ComponentState::Failed);
                Err(err)
            }
        }
    }

    fn try_resolve_component(
        &self,
        graph: &mut Graph,
        idx: NodeIndex,
        store: &mut AnswerStore,
        mode: ResolveMode,
    ) -> Result<(), AppError> {
        let namespace = graph.node(idx).namespace.clone();
        let params = graph.node(idx).params.clone();

        store
            .resolve_for_component(&namespace, &params, mode)
            .map_err(|err| annotate_component(err, &graph.node(idx).id))?;

        let missing = store.missing_params_for(&namespace, &params);
        if let Some(name) = missing.into_iter().next() {
            return Err(AppError::MissingParam { namespace, name });
        }

        graph.node_mut(idx).transition(ComponentState::ConfigResolved);
        Ok(())
    }

    /// Renders artifacts, provisions persistent storage requirements and
    /// hands the component to its provider, marking it `Failed` on any
    /// error before propagating it.
    fn dispatch_component(&self, graph: &mut Graph, idx: NodeIndex, store: &mut AnswerStore) -> Result<(), AppError> {
        match self.try_dispatch_component(graph, idx, store) {
            Ok(()) => Ok(()),
            Err(err) => {
                graph.node_mut(idx).transition(ComponentState::Failed);
                Err(err)
            }
        }
    }

    fn try_dispatch_component(&self, graph: &mut Graph, idx: NodeIndex, store: &mut AnswerStore) -> Result<(), AppError> {
        let namespace = graph.node(idx).namespace.clone();

        let provider_name = store
            .get(&namespace, "provider")
            .map(|v| v.to_string())
            .unwrap_or_else(|| crate::constants::DEFAULT_PROVIDER.to_owned());

        let context = merged_context(store, &namespace);
        let basepath = graph.node(idx).basepath.clone();
        let mut provider = providers::resolve(&provider_name)?;
        provider.init(&context, &basepath, self.dry_run)?;

        let rendered = render_for(graph.node(idx), &provider_name, &context)?;
        let requirements = graph.node(idx).requirements.clone();
        let component_id = graph.node(idx).id.clone();
        for requirement in &requirements {
            provider.persistent_storage(&requirement.kind, &component_id, self.dry_run)?;
        }

        provider.run(&rendered)?;

        let component = graph.node_mut(idx);
        component.rendered_artifacts.insert(provider_name, rendered);
        component.transition(ComponentState::Deployed);

        Ok(())
    }

    fn teardown_component(&self, graph: &mut Graph, idx: NodeIndex, store: &AnswerStore) -> Result<(), AppError> {
        let namespace = graph.node(idx).namespace.clone();

        let provider_name = store
            .get(&namespace, "provider")
            .map(|v| v.to_string())
            .unwrap_or_else(|| crate::constants::DEFAULT_PROVIDER.to_owned());

        let context = merged_context(store, &namespace);
        let mut provider = providers::resolve(&provider_name)?;
        provider.init(&context, &graph.node(idx).basepath, self.dry_run)?;

        let component = graph.node(idx);
        let rendered = render_for(component, &provider_name, &context)?;
        provider.stop(&rendered)?;

        graph.node_mut(idx).transition(ComponentState::Created);
        Ok(())
    }

    fn seed_answers(
        &self,
        store: &mut AnswerStore,
        root: &Path,
        answers_path: Option<&Path>,
        answers_format: Option<AnswerFormat>,
        cli_overrides: BTreeMap<String, AnswerValue>,
        provider_override: Option<&str>,
    ) -> Result<(), AppError> {
        match answers_path {
            Some(path) => store.load_from_file(path, answers_format)?,
            None => store.load_from_file_if_present(&root.join(ANSWERS_NAME), answers_format)?,
        }

        store.merge_cli(cli_overrides);

        if let Some(name) = provider_override {
            store.set(GENERAL_NAMESPACE, "provider", AnswerValue::String(name.to_owned()));
        }

        store.impute_default_provider();
        Ok(())
    }

    /// Resolves the on-disk root for `app_spec`: a local path is used as-is,
    /// an image reference (`docker://...`) is pulled and its
    /// application-entity extracted to `destination`.
    fn materialize_app(
        &self,
        app_spec: Option<&str>,
        destination: Option<Destination>,
        update: bool,
    ) -> Result<(PathBuf, Option<TempDir>), AppError> {
        let spec = app_spec
            .map(str::to_owned)
            .or_else(|| std::env::var(crate::constants::ENV_IMAGE).ok());

        let Some(spec) = spec else {
            let cwd = std::env::current_dir().map_err(|err| AppError::Other(anyhow::anyhow!(err)))?;
            return Ok((cwd, None));
        };

        if !spec.contains("://") {
            return Ok((PathBuf::from(spec), None));
        }

        let (dest_path, guard) = match destination {
            Some(Destination::Path(p)) => (p, None),
            Some(Destination::Ephemeral) | None => {
                let dir = tempfile::tempdir().map_err(|err| AppError::Other(anyhow::anyhow!(err)))?;
                let path = dir.path().to_owned();
                (path, Some(dir))
            }
        };

        self.container_source.pull(&spec)?;
        self.container_source
            .extract(&spec, application_entity_path(), &dest_path, update)?;

        Ok((dest_path, guard))
    }
}

pub(crate) struct FetchOutcome {
    pub(crate) root: PathBuf,
    pub(crate) component_count: usize,
    _guard: Option<TempDir>,
}

pub(crate) struct RunOutcome {
    pub(crate) root: PathBuf,
    pub(crate) runtime_answers_path: PathBuf,
    _guard: Option<TempDir>,
}

fn render_for(
    component: &crate::component::Component,
    provider_name: &str,
    context: &BTreeMap<String, AnswerValue>,
) -> Result<Vec<PathBuf>, AppError> {
    crate::artifacts::render_provider_artifacts(component, provider_name, context)
}

/// Merges `general` under `namespace` (namespace values win), for use as
/// provider init context and template-substitution context.
fn merged_context(store: &AnswerStore, namespace: &str) -> BTreeMap<String, AnswerValue> {
    let mut merged = BTreeMap::new();
    for (group, kvs) in store.snapshot() {
        if group == GENERAL_NAMESPACE {
            merged.extend(kvs);
        }
    }
    for (group, kvs) in store.snapshot() {
        if group == namespace {
            merged.extend(kvs);
        }
    }
    merged
}

fn publish_status(status: Option<&StatusHandle>, command: &str, store: &AnswerStore) {
    if let Some(handle) = status {
        handle.update(StatusSnapshot {
            command: command.to_owned(),
            groups: store.snapshot(),
        });
    }
}

fn annotate_component(err: AppError, component_id: &str) -> AppError {
    if let AppError::MissingParam { namespace, name } = &err {
        warn!(component = %component_id, %namespace, %name, "missing required parameter");
    }
    err
}

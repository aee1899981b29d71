//! Imports the dependency graph that `conan graph info --format=json` prints.
//!
//! Only the fields needed to locate license files are read: the node name,
//! version, reference, context and package folder. Everything else in the
//! document is ignored.

use crate::error::ConfigError;
use crate::parser::Dependency;
use crate::utils::log::{log, LogLevel};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Id Conan gives the consuming recipe itself
static ROOT_NODE: &str = "0";

#[derive(Deserialize, Debug)]
struct GraphFile {
    graph: Graph,
}

#[derive(Deserialize, Debug)]
struct Graph {
    nodes: BTreeMap<String, Node>,
}

#[derive(Deserialize, Debug)]
struct Node {
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    package_folder: Option<String>,
    #[serde(default)]
    context: Option<String>,
}

impl Node {
    fn is_build_context(&self) -> bool {
        self.context.as_deref() == Some("build")
    }

    /// Name and version, taken from the node fields or parsed from its reference
    fn identity(&self) -> Option<(String, String)> {
        let from_ref = self.reference.as_deref().and_then(parse_reference);
        let name = self
            .name
            .clone()
            .or_else(|| from_ref.as_ref().map(|(name, _)| name.clone()))?;
        let version = self
            .version
            .clone()
            .or_else(|| from_ref.map(|(_, version)| version))?;
        Some((name, version))
    }
}

/// Splits `name/version[@user/channel][#revision]` into name and version
pub fn parse_reference(reference: &str) -> Option<(String, String)> {
    let reference = reference.split('#').next().unwrap_or(reference);
    let reference = reference.split('@').next().unwrap_or(reference);
    let (name, version) = reference.split_once('/')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}

/// Loads the installed dependencies listed in a Conan graph JSON file.
/// # Arguments
/// * `path` - The path to the graph file
/// * `include_build` - Whether nodes from the build context (tool requires) count
pub fn load_graph(path: &Path, include_build: bool) -> Result<Vec<Dependency>, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let deps = parse_graph_str(&contents, include_build).map_err(|err| match err {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })?;
    log(
        LogLevel::Info,
        &format!("Imported {} packages from {}", deps.len(), path.display()),
    );
    Ok(deps)
}

/// Parses graph JSON text. Host nodes take precedence over build nodes that
/// share a name.
pub fn parse_graph_str(
    contents: &str,
    include_build: bool,
) -> Result<Vec<Dependency>, ConfigError> {
    let file: GraphFile = serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
        path: Path::new("graph").to_path_buf(),
        message: e.to_string(),
    })?;

    let (host, build): (Vec<_>, Vec<_>) = file
        .graph
        .nodes
        .iter()
        .filter(|(id, _)| id.as_str() != ROOT_NODE)
        .partition(|(_, node)| !node.is_build_context());

    let mut seen = HashSet::new();
    let mut deps = Vec::new();
    let candidates = host
        .into_iter()
        .chain(build.into_iter().filter(|_| include_build));
    for (id, node) in candidates {
        let Some(package_folder) = node.package_folder.as_deref() else {
            log(
                LogLevel::Debug,
                &format!("Skipping graph node {}: no package folder", id),
            );
            continue;
        };
        let (name, version) = node.identity().ok_or_else(|| {
            ConfigError::Invalid(format!("graph node {} has no name/version", id))
        })?;
        if !seen.insert(name.clone()) {
            log(
                LogLevel::Debug,
                &format!("Skipping graph node {}: {} already listed", id, name),
            );
            continue;
        }
        deps.push(Dependency::new(name, version, package_folder));
    }
    Ok(deps)
}

/// Combines manifest and graph dependencies. A manifest entry replaces a graph
/// entry of the same name.
pub fn merge_dependencies(manifest: Vec<Dependency>, graph: Vec<Dependency>) -> Vec<Dependency> {
    let listed: HashSet<String> = manifest.iter().map(|dep| dep.name.clone()).collect();
    let mut merged = manifest;
    for dep in graph {
        if listed.contains(&dep.name) {
            log(
                LogLevel::Debug,
                &format!("{} from the manifest overrides the graph entry", dep.name),
            );
            continue;
        }
        merged.push(dep);
    }
    merged
}

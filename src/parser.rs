//! Parsing Module
//!
//! Reads `licbundle.toml`, the manifest that names the project being
//! distributed, where the bundle goes and which installed packages to scan.

use crate::error::ConfigError;
use crate::utils::log::{log, LogLevel};
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// Manifest file name looked up when none is given
pub static DEFAULT_MANIFEST: &str = "licbundle.toml";
/// Bundle location used when the manifest has no `output` key
pub static DEFAULT_OUTPUT: &str = "dist/LICENSE.txt";
/// Directory below a package folder that holds its license files
pub static LICENSE_DIR: &str = "licenses";

/// Struct describing the project whose distribution the bundle belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    pub name: String,
    pub version: String,
    pub license: PathBuf,
}

impl ProjectIdentity {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        license: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            license: license.into(),
        }
    }

    /// `name/version`, as printed in section headers
    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Struct describing one resolved and installed dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    pub package_dir: PathBuf,
}

impl Dependency {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        package_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            package_dir: package_dir.into(),
        }
    }

    /// Directory the package ships its license files in. It may not exist.
    pub fn license_dir(&self) -> PathBuf {
        self.package_dir.join(LICENSE_DIR)
    }

    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Struct describing a parsed `licbundle.toml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub project: ProjectIdentity,
    pub output: PathBuf,
    pub dependencies: Vec<Dependency>,
    pub graph: Option<PathBuf>,
}

/// This function is used to parse the manifest of the local project.
/// Relative paths inside the manifest are resolved against its directory.
/// # Arguments
/// * `path` - The path to the manifest file
pub fn parse_manifest(path: &Path) -> Result<Manifest, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let manifest = parse_manifest_str(&contents, base).map_err(|err| match err {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })?;
    log(
        LogLevel::Debug,
        &format!(
            "Parsed manifest {}: {} with {} dependencies",
            path.display(),
            manifest.project.reference(),
            manifest.dependencies.len()
        ),
    );
    Ok(manifest)
}

/// Parses manifest text, resolving relative paths against `base`
pub fn parse_manifest_str(contents: &str, base: &Path) -> Result<Manifest, ConfigError> {
    let config = contents.parse::<Table>().map_err(|e| ConfigError::Parse {
        path: PathBuf::from(DEFAULT_MANIFEST),
        message: e.to_string(),
    })?;

    let project_tb = config
        .get("project")
        .ok_or_else(|| ConfigError::MissingField("project".to_string()))?
        .as_table()
        .ok_or_else(|| invalid("project", "a table"))?;

    let project = parse_project(project_tb, base)?;
    let output = match opt_cfg_string(project_tb, "output")? {
        Some(output) => resolve(base, &output),
        None => resolve(base, DEFAULT_OUTPUT),
    };
    let graph = opt_cfg_string(project_tb, "graph")?.map(|graph| resolve(base, &graph));
    let dependencies = parse_dependencies(&config, base)?;

    Ok(Manifest {
        project,
        output,
        dependencies,
        graph,
    })
}

/// Parses the `[project]` table
fn parse_project(project_tb: &Table, base: &Path) -> Result<ProjectIdentity, ConfigError> {
    let name = parse_cfg_string(project_tb, "project.name", "name")?;
    let version = match (
        opt_cfg_string(project_tb, "version")?,
        opt_cfg_string(project_tb, "version_file")?,
    ) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::Invalid(
                "project.version and project.version_file are mutually exclusive".to_string(),
            ))
        }
        (Some(version), None) => version,
        (None, Some(file)) => read_version_file(&resolve(base, &file))?,
        (None, None) => return Err(ConfigError::MissingField("project.version".to_string())),
    };
    if version.trim().is_empty() {
        return Err(invalid("project.version", "a non-empty string"));
    }
    let license = resolve(base, &parse_cfg_string(project_tb, "project.license", "license")?);

    Ok(ProjectIdentity {
        name,
        version,
        license,
    })
}

/// Parses the `[[dependencies]]` array. An absent array means no dependencies.
fn parse_dependencies(config: &Table, base: &Path) -> Result<Vec<Dependency>, ConfigError> {
    let entries = match config.get("dependencies") {
        Some(value) => value
            .as_array()
            .ok_or_else(|| invalid("dependencies", "an array of tables"))?,
        None => return Ok(Vec::new()),
    };

    let mut deps = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let dep_tb = entry
            .as_table()
            .ok_or_else(|| invalid(&format!("dependencies[{}]", index), "a table"))?;
        let field = |key: &str| format!("dependencies[{}].{}", index, key);
        deps.push(Dependency {
            name: parse_cfg_string(dep_tb, &field("name"), "name")?,
            version: parse_cfg_string(dep_tb, &field("version"), "version")?,
            package_dir: resolve(
                base,
                &parse_cfg_string(dep_tb, &field("package_dir"), "package_dir")?,
            ),
        });
    }

    if let Some(name) = deps.iter().map(|dep| dep.name.as_str()).duplicates().next() {
        return Err(ConfigError::Invalid(format!(
            "dependency '{}' is listed more than once",
            name
        )));
    }
    Ok(deps)
}

/// Reads the project version from a descriptor file: its first non-empty line
fn read_version_file(path: &Path) -> Result<String, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ConfigError::Invalid(format!("version file {} is empty", path.display()))
        })
}

/// Parses a required, non-empty string field
fn parse_cfg_string(config: &Table, field: &str, key: &str) -> Result<String, ConfigError> {
    let value = config
        .get(key)
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?
        .as_str()
        .ok_or_else(|| invalid(field, "a string"))?;
    if value.trim().is_empty() {
        return Err(invalid(field, "a non-empty string"));
    }
    Ok(value.to_string())
}

/// Parses an optional string field
fn opt_cfg_string(config: &Table, key: &str) -> Result<Option<String>, ConfigError> {
    match config.get(key) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(&format!("project.{}", key), "a string")),
        None => Ok(None),
    }
}

fn invalid(field: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.to_string(),
        expected,
    }
}

/// Joins relative paths onto `base`, leaving absolute ones untouched
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

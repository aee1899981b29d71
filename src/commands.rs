use crate::aggregator::{self, license_files, sort_dependencies};
use crate::error::CommandError;
use crate::graph::{load_graph, merge_dependencies};
use crate::hasher::Hasher;
use crate::parser::{parse_manifest, Dependency, Manifest};
use crate::utils::log::{log, LogLevel};
use colored::Colorize;
use dialoguer::Confirm;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

static SAMPLE_MANIFEST: &str = r#"[project]
name = "cequip"
version = "1.0.0"
license = "LICENSE"
output = "dist/LICENSE.txt"
# graph = "build/graph.json"

# [[dependencies]]
# name = "boost"
# version = "1.90.0"
# package_dir = "/path/to/boost/package"
"#;

/// Everything a command needs: the manifest plus the final dependency list
#[derive(Debug)]
pub struct Inputs {
    pub manifest: Manifest,
    pub dependencies: Vec<Dependency>,
    pub output: PathBuf,
}

/// Loads the manifest and any graph file, applying command-line overrides
/// # Arguments
/// * `manifest_path` - The manifest to read
/// * `output` - Replaces the manifest's output path
/// * `graph` - Replaces the manifest's graph path
/// * `build_context` - Also take build-context packages from the graph
pub fn load_inputs(
    manifest_path: &Path,
    output: Option<&Path>,
    graph: Option<&Path>,
    build_context: bool,
) -> Result<Inputs, CommandError> {
    let manifest = parse_manifest(manifest_path)?;
    let graph_path = graph.map(Path::to_path_buf).or_else(|| manifest.graph.clone());
    let graph_deps = match graph_path {
        Some(path) => load_graph(&path, build_context)?,
        None => Vec::new(),
    };
    let dependencies = merge_dependencies(manifest.dependencies.clone(), graph_deps);
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest.output.clone());
    Ok(Inputs {
        manifest,
        dependencies,
        output,
    })
}

/// Writes the license bundle
pub fn bundle(inputs: &Inputs) -> Result<(), CommandError> {
    aggregator::aggregate(&inputs.manifest.project, &inputs.dependencies, &inputs.output)?;
    Ok(())
}

/// Compares the bundle on disk with a fresh render.
/// Returns true when it is up to date.
pub fn check(inputs: &Inputs) -> Result<bool, CommandError> {
    let mut rendered = Vec::new();
    aggregator::render(&inputs.manifest.project, &inputs.dependencies, &mut rendered)?;
    match Hasher::is_file_changed(&inputs.output, &rendered)? {
        None => {
            log(
                LogLevel::Warn,
                &format!("License bundle does not exist: {}", inputs.output.display()),
            );
            Ok(false)
        }
        Some(true) => {
            log(
                LogLevel::Warn,
                &format!("License bundle is stale: {}", inputs.output.display()),
            );
            Ok(false)
        }
        Some(false) => {
            log(
                LogLevel::Log,
                &format!("License bundle is up to date: {}", inputs.output.display()),
            );
            Ok(true)
        }
    }
}

/// Prints the dependencies in bundle order with their license file counts
pub fn list<W: Write>(inputs: &Inputs, out: &mut W) -> Result<(), CommandError> {
    writeln!(out, "{:-<1$}", "", 87)?;
    writeln!(
        out,
        "{:<20} {:<16} {:<9} {:<40}",
        "NAME".bold(),
        "VERSION".bold(),
        "LICENSES".bold(),
        "PACKAGE".bold()
    )?;
    writeln!(out, "{:-<1$}", "", 87)?;
    for dep in sort_dependencies(&inputs.dependencies) {
        let count = license_files(dep).len();
        let count = if count == 0 {
            "none".yellow()
        } else {
            count.to_string().as_str().normal()
        };
        writeln!(
            out,
            "{:<20} {:<16} {:<9} {:<40}",
            dep.name,
            dep.version,
            count,
            dep.package_dir.display()
        )?;
    }
    writeln!(out, "{:-<1$}", "", 87)?;
    Ok(())
}

/// Writes a sample manifest to `path`. An existing file is only replaced
/// when `force` is set or the user confirms.
pub fn init_manifest(path: &Path, force: bool) -> Result<(), CommandError> {
    if path.exists() && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", path.display()))
            .default(false)
            .interact()
            .map_err(|e| CommandError::Other(e.to_string()))?;
        if !overwrite {
            log(LogLevel::Log, "Leaving existing manifest untouched");
            return Ok(());
        }
    }
    fs::write(path, SAMPLE_MANIFEST)?;
    log(LogLevel::Log, &format!("Manifest {} initialised", path.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_project(root: &Path) -> PathBuf {
        fs::write(root.join("LICENSE"), "MIT License\n").unwrap();
        let boost = root.join("pkgs/boost/licenses");
        fs::create_dir_all(&boost).unwrap();
        fs::write(boost.join("LICENSE_1_0.txt"), "Boost Software License\n").unwrap();
        let manifest = root.join("licbundle.toml");
        fs::write(
            &manifest,
            r#"
[project]
name = "cequip"
version = "1.0.0"
license = "LICENSE"

[[dependencies]]
name = "spdlog"
version = "1.17.0"
package_dir = "pkgs/spdlog"

[[dependencies]]
name = "boost"
version = "1.90.0"
package_dir = "pkgs/boost"
"#,
        )
        .unwrap();
        manifest
    }

    #[test]
    fn output_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_project(dir.path());
        let out = dir.path().join("other/NOTICE.txt");
        let inputs = load_inputs(&manifest, Some(&out), None, false).unwrap();
        assert_eq!(inputs.output, out);
        assert_eq!(inputs.dependencies.len(), 2);
    }

    #[test]
    fn check_follows_bundle_state() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_project(dir.path());
        let inputs = load_inputs(&manifest, None, None, false).unwrap();

        assert!(!check(&inputs).unwrap());
        bundle(&inputs).unwrap();
        assert!(check(&inputs).unwrap());

        fs::write(
            dir.path().join("pkgs/boost/licenses/LICENSE_1_0.txt"),
            "changed\n",
        )
        .unwrap();
        assert!(!check(&inputs).unwrap());
    }

    #[test]
    fn list_shows_every_dependency_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_project(dir.path());
        let inputs = load_inputs(&manifest, None, None, false).unwrap();
        let mut out = Vec::new();
        list(&inputs, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let boost = text.find("boost").unwrap();
        let spdlog = text.find("spdlog").unwrap();
        assert!(boost < spdlog);
        assert!(text.contains("1.17.0"));
    }

    /// Drops ANSI color sequences so columns can be measured
    fn strip_ansi(line: &str) -> String {
        let mut plain = String::new();
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            if c == '\u{1b}' {
                chars.by_ref().find(|&c| c == 'm');
            } else {
                plain.push(c);
            }
        }
        plain
    }

    #[test]
    fn list_columns_stay_aligned_with_colors() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_project(dir.path());
        let inputs = load_inputs(&manifest, None, None, false).unwrap();

        colored::control::set_override(true);
        let mut out = Vec::new();
        let listed = list(&inputs, &mut out);
        colored::control::unset_override();
        listed.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\u{1b}["));
        for name in ["boost", "spdlog"] {
            let row = text.lines().find(|l| l.starts_with(name)).unwrap();
            let plain = strip_ansi(row);
            let package = dir.path().join("pkgs").join(name);
            assert_eq!(
                plain[20 + 1 + 16 + 1 + 9 + 1..].trim_end(),
                package.display().to_string()
            );
        }
    }

    #[test]
    fn init_with_force_writes_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("licbundle.toml");
        fs::write(&path, "old").unwrap();
        init_manifest(&path, true).unwrap();
        let manifest = crate::parser::parse_manifest(&path).unwrap();
        assert_eq!(manifest.project.reference(), "cequip/1.0.0");
    }
}

//! This module concatenates the license texts of a project and its resolved
//! dependencies into a single distribution file.

use crate::error::AggregateError;
use crate::parser::{Dependency, ProjectIdentity};
use crate::utils::log::{log, LogLevel};
use itertools::Itertools;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use walkdir::WalkDir;

static RULE: &str = "==========";

lazy_static! {
    // One lock per output directory; generation clears the directory first.
    static ref OUTPUT_LOCKS: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> = Mutex::new(HashMap::new());
}

/// A single license file shipped by a dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseFile {
    pub name: String,
    pub path: PathBuf,
}

/// The license files of one dependency, sorted by file name
#[derive(Debug)]
pub struct LicenseEntry<'a> {
    pub dependency: &'a Dependency,
    pub files: Vec<LicenseFile>,
}

/// Writes the license bundle for `project` and `dependencies` to `output`.
///
/// The directory containing `output` is removed and recreated before anything
/// is written, so nothing from an earlier run survives. The bundle is first
/// written next to `output` as a hidden `.partial` file and only renamed into
/// place once complete; on failure no file named `output` exists.
/// # Arguments
/// * `project` - The project being distributed
/// * `dependencies` - Resolved dependencies, in any order
/// * `output` - Path of the bundle file
pub fn aggregate(
    project: &ProjectIdentity,
    dependencies: &[Dependency],
    output: &Path,
) -> Result<(), AggregateError> {
    let file_name = output.file_name().ok_or_else(|| AggregateError::InvalidOutput {
        path: output.to_path_buf(),
        reason: "it has no file name",
    })?;
    check_unique(dependencies)?;
    let (out_dir, lock_key) = output_dir(project, dependencies, output)?;

    let lock = output_lock(lock_key);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    log(
        LogLevel::Info,
        &format!("Bundling licenses for {}", project.reference()),
    );
    recreate_dir(out_dir)?;

    let partial = out_dir.join(format!(".{}.partial", file_name.to_string_lossy()));
    let written = write_bundle(project, dependencies, &partial).and_then(|()| {
        fs::rename(&partial, output).map_err(|source| AggregateError::Write {
            path: output.to_path_buf(),
            source,
        })
    });
    if let Err(err) = written {
        if partial.exists() {
            if let Err(why) = fs::remove_file(&partial) {
                log(
                    LogLevel::Warn,
                    &format!("Could not remove {}: {}", partial.display(), why),
                );
            }
        }
        return Err(err);
    }

    log(
        LogLevel::Log,
        &format!("License bundle written to {}", output.display()),
    );
    Ok(())
}

/// Renders the bundle to `out`. Nothing on disk is modified.
///
/// Fails if the root license cannot be read or a dependency name repeats.
/// Unreadable or non-UTF-8 dependency license files never fail the render.
pub fn render<W: Write>(
    project: &ProjectIdentity,
    dependencies: &[Dependency],
    out: &mut W,
) -> Result<(), AggregateError> {
    check_unique(dependencies)?;
    let root = fs::read(&project.license).map_err(|source| AggregateError::RootLicense {
        path: project.license.clone(),
        source,
    })?;
    let root_text = decode_license(&root);
    if let Cow::Owned(_) = root_text {
        log(
            LogLevel::Warn,
            &format!(
                "{} is not valid UTF-8, invalid bytes were replaced",
                project.license.display()
            ),
        );
    }

    write_header(out, &project.reference())?;
    write_text(out, &root_text)?;
    out.write_all(b"\n")?;

    for entry in collect_entries(dependencies) {
        log(
            LogLevel::Log,
            &format!(
                "Adding {} ({} license file{})",
                entry.dependency.reference(),
                entry.files.len(),
                if entry.files.len() == 1 { "" } else { "s" }
            ),
        );
        write_header(out, &entry.dependency.reference())?;
        for file in &entry.files {
            writeln!(out, "-- {} --", file.name)?;
            write_text(out, &read_dependency_license(file))?;
            out.write_all(b"\n")?;
        }
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Sorts the dependencies by name and pairs each with its license files.
/// Dependencies without any license file are left out.
pub fn collect_entries(dependencies: &[Dependency]) -> Vec<LicenseEntry<'_>> {
    sort_dependencies(dependencies)
        .into_iter()
        .filter_map(|dependency| {
            let files = license_files(dependency);
            if files.is_empty() {
                log(
                    LogLevel::Debug,
                    &format!("Skipping {}: no license files", dependency.reference()),
                );
                return None;
            }
            Some(LicenseEntry { dependency, files })
        })
        .collect()
}

/// Orders dependencies by name, comparing bytes
pub fn sort_dependencies(dependencies: &[Dependency]) -> Vec<&Dependency> {
    dependencies
        .iter()
        .sorted_by(|a, b| a.name.cmp(&b.name))
        .collect()
}

/// Lists the regular files directly inside the dependency's license
/// directory, sorted by file name. A missing directory yields no files.
pub fn license_files(dependency: &Dependency) -> Vec<LicenseFile> {
    let dir = dependency.license_dir();
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(why) => {
                log(
                    LogLevel::Warn,
                    &format!("Could not list {}: {}", dir.display(), why),
                );
                None
            }
        })
        .filter(|entry| entry.path().is_file())
        .map(|entry| LicenseFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.into_path(),
        })
        .collect()
}

/// Decodes license bytes as UTF-8, replacing each invalid sequence with U+FFFD
pub fn decode_license(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Reads a dependency license file. Read failures yield an empty text.
fn read_dependency_license(file: &LicenseFile) -> String {
    match fs::read(&file.path) {
        Ok(bytes) => {
            let text = decode_license(&bytes);
            if let Cow::Owned(_) = text {
                log(
                    LogLevel::Warn,
                    &format!(
                        "{} is not valid UTF-8, invalid bytes were replaced",
                        file.path.display()
                    ),
                );
            }
            text.into_owned()
        }
        Err(why) => {
            log(
                LogLevel::Warn,
                &format!("Could not read {}: {}", file.path.display(), why),
            );
            String::new()
        }
    }
}

fn write_header<W: Write>(out: &mut W, reference: &str) -> std::io::Result<()> {
    write!(out, "{} {} {}\n\n", RULE, reference, RULE)
}

/// Writes `text` followed by exactly one line ending. Trailing blank lines are
/// dropped; a text whose last line ended in CRLF keeps a single CRLF.
fn write_text<W: Write>(out: &mut W, text: &str) -> std::io::Result<()> {
    let body = text.trim_end_matches(['\r', '\n']);
    out.write_all(body.as_bytes())?;
    if text[body.len()..].starts_with("\r\n") {
        out.write_all(b"\r\n")
    } else {
        out.write_all(b"\n")
    }
}

fn write_bundle(
    project: &ProjectIdentity,
    dependencies: &[Dependency],
    path: &Path,
) -> Result<(), AggregateError> {
    let file = File::create(path).map_err(|source| AggregateError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut out = BufWriter::new(file);
    render(project, dependencies, &mut out).map_err(|err| match err {
        AggregateError::Stream(source) => AggregateError::Write {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    out.into_inner()
        .map_err(|err| AggregateError::Write {
            path: path.to_path_buf(),
            source: err.into_error(),
        })?
        .sync_all()
        .map_err(|source| AggregateError::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn check_unique(dependencies: &[Dependency]) -> Result<(), AggregateError> {
    match dependencies.iter().map(|dep| dep.name.as_str()).duplicates().next() {
        Some(name) => Err(AggregateError::DuplicateDependency(name.to_string())),
        None => Ok(()),
    }
}

/// Returns the directory that will be cleared and its resolved form, rejecting
/// directories that would take the inputs with them
fn output_dir<'a>(
    project: &ProjectIdentity,
    dependencies: &[Dependency],
    output: &'a Path,
) -> Result<(&'a Path, PathBuf), AggregateError> {
    let invalid = |reason| AggregateError::InvalidOutput {
        path: output.to_path_buf(),
        reason,
    };
    let resolve = |path: &Path| {
        canonical_path(path).map_err(|source| AggregateError::OutputDir {
            path: path.to_path_buf(),
            source,
        })
    };
    let dir = output.parent().unwrap_or_else(|| Path::new(""));
    // "", ".", "..", "/" and the like are never cleared
    if !dir.components().any(|c| matches!(c, Component::Normal(_))) {
        return Err(invalid("it must be inside a dedicated directory"));
    }
    let resolved = resolve(dir)?;
    if resolve(&project.license)?.starts_with(&resolved) {
        return Err(invalid("its directory contains the root license file"));
    }
    for dependency in dependencies {
        if resolve(&dependency.package_dir)?.starts_with(&resolved) {
            log(
                LogLevel::Error,
                &format!(
                    "{} is installed below {}",
                    dependency.reference(),
                    dir.display()
                ),
            );
            return Err(invalid("its directory contains a dependency package"));
        }
    }
    Ok((dir, resolved))
}

/// Resolves symlinks, `.` and `..` so that every spelling of a location
/// compares equal. Trailing components that do not exist yet are applied
/// lexically on top of the deepest existing ancestor.
fn canonical_path(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        let base = if existing.as_os_str().is_empty() {
            std::env::current_dir()
        } else {
            existing.canonicalize()
        };
        match base {
            Ok(mut resolved) => {
                for component in missing.iter().rev() {
                    match component {
                        Component::ParentDir => {
                            resolved.pop();
                        }
                        Component::Normal(name) => resolved.push(name),
                        _ => {}
                    }
                }
                return Ok(resolved);
            }
            Err(err) => match (existing.parent(), existing.components().next_back()) {
                (Some(parent), Some(last)) => {
                    missing.push(last);
                    existing = parent;
                }
                _ => return Err(err),
            },
        }
    }
}

fn output_lock(dir: PathBuf) -> Arc<Mutex<()>> {
    let mut locks = OUTPUT_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    locks
        .entry(dir)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

fn recreate_dir(dir: &Path) -> Result<(), AggregateError> {
    let to_err = |source| AggregateError::OutputDir {
        path: dir.to_path_buf(),
        source,
    };
    if dir.exists() {
        log(LogLevel::Debug, &format!("Cleaning: {}", dir.display()));
        fs::remove_dir_all(dir).map_err(to_err)?;
    }
    fs::create_dir_all(dir).map_err(to_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep_with_licenses(root: &Path, name: &str, files: &[(&str, &[u8])]) -> Dependency {
        let package_dir = root.join(name);
        let license_dir = package_dir.join("licenses");
        fs::create_dir_all(&license_dir).unwrap();
        for (file, content) in files {
            fs::write(license_dir.join(file), content).unwrap();
        }
        Dependency::new(name, "1.0", package_dir)
    }

    #[test]
    fn write_text_ends_with_exactly_one_newline() {
        for (input, expected) in [
            ("MIT", "MIT\n"),
            ("MIT\n", "MIT\n"),
            ("MIT\n\n\n", "MIT\n"),
            ("MIT\r\n", "MIT\r\n"),
            ("MIT\r\n\r\n", "MIT\r\n"),
            ("MIT\n\r\n", "MIT\n"),
            ("", "\n"),
        ] {
            let mut out = Vec::new();
            write_text(&mut out, input).unwrap();
            assert_eq!(String::from_utf8(out).unwrap(), expected, "input {:?}", input);
        }
    }

    #[test]
    fn decode_replaces_invalid_bytes() {
        let text = decode_license(b"caf\xe9 ok");
        assert_eq!(text, "caf\u{FFFD} ok");
        assert!(matches!(decode_license(b"plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn license_files_are_sorted_and_skip_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dep = dep_with_licenses(
            dir.path(),
            "boost",
            &[("b.txt", b"b"), ("LICENSE", b"l"), ("a.txt", b"a")],
        );
        fs::create_dir(dep.license_dir().join("nested")).unwrap();
        let names: Vec<_> = license_files(&dep).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["LICENSE", "a.txt", "b.txt"]);
    }

    #[test]
    fn missing_license_dir_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dep = Dependency::new("spdlog", "1.17.0", dir.path().join("spdlog"));
        assert!(license_files(&dep).is_empty());
    }

    #[test]
    fn entries_skip_dependencies_without_licenses() {
        let dir = tempfile::tempdir().unwrap();
        let zlib = dep_with_licenses(dir.path(), "zlib", &[("LICENSE", b"zlib")]);
        let empty = dep_with_licenses(dir.path(), "cli11", &[]);
        let boost = dep_with_licenses(dir.path(), "boost", &[("LICENSE_1_0.txt", b"bsl")]);
        let deps = vec![zlib, empty, boost];
        let names: Vec<_> = collect_entries(&deps)
            .iter()
            .map(|e| e.dependency.name.as_str())
            .collect();
        assert_eq!(names, vec!["boost", "zlib"]);
    }

    #[test]
    fn sort_is_case_sensitive_ordinal() {
        let deps = vec![
            Dependency::new("zlib", "1", "z"),
            Dependency::new("Boost", "1", "b"),
            Dependency::new("abseil", "1", "a"),
        ];
        let names: Vec<_> = sort_dependencies(&deps).iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Boost", "abseil", "zlib"]);
    }

    #[test]
    fn render_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let license = dir.path().join("LICENSE");
        fs::write(&license, "MIT").unwrap();
        let project = ProjectIdentity::new("cequip", "1.0.0", &license);
        let deps = vec![Dependency::new("zlib", "1", "a"), Dependency::new("zlib", "2", "b")];
        let err = render(&project, &deps, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, AggregateError::DuplicateDependency(ref n) if n == "zlib"));
    }

    #[test]
    fn unreadable_license_file_renders_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = LicenseFile {
            name: "gone".to_string(),
            path: dir.path().join("gone"),
        };
        assert_eq!(read_dependency_license(&file), "");
    }

    #[test]
    fn output_must_live_in_its_own_directory() {
        let project = ProjectIdentity::new("cequip", "1.0.0", "/src/LICENSE");
        let dir_of = |output: &'static str| {
            output_dir(&project, &[], Path::new(output))
                .ok()
                .map(|(dir, _)| dir.to_path_buf())
        };
        assert_eq!(dir_of("LICENSE.txt"), None);
        assert_eq!(dir_of("/LICENSE.txt"), None);
        assert_eq!(dir_of("../LICENSE.txt"), None);
        assert_eq!(dir_of("/src/LICENSE.txt"), None);
        assert_eq!(dir_of("/src/dist/LICENSE.txt"), Some(PathBuf::from("/src/dist")));
    }

    #[test]
    fn root_license_spelled_differently_is_still_protected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        fs::create_dir_all(dir.path().join("build")).unwrap();
        let license = dir.path().join("build/../dist/LICENSE");
        fs::write(&license, "MIT").unwrap();
        let project = ProjectIdentity::new("cequip", "1.0.0", &license);

        let output = dir.path().join("dist/LICENSE.txt");
        let err = crate::aggregate(&project, &[], &output).unwrap_err();

        assert!(matches!(err, AggregateError::InvalidOutput { .. }));
        assert!(license.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn root_license_behind_a_symlink_is_still_protected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("dist"), dir.path().join("alias")).unwrap();
        fs::write(dir.path().join("dist/LICENSE"), "MIT").unwrap();
        let project = ProjectIdentity::new("cequip", "1.0.0", dir.path().join("alias/LICENSE"));

        let output = dir.path().join("dist/LICENSE.txt");
        let err = crate::aggregate(&project, &[], &output).unwrap_err();

        assert!(matches!(err, AggregateError::InvalidOutput { .. }));
        assert!(dir.path().join("dist/LICENSE").is_file());
    }

    #[test]
    fn dependency_inside_output_dir_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("LICENSE"), "MIT").unwrap();
        let project = ProjectIdentity::new("cequip", "1.0.0", dir.path().join("LICENSE"));
        let boost = dep_with_licenses(&dir.path().join("dist"), "boost", &[("LICENSE", b"bsl")]);

        let err = crate::aggregate(&project, &[boost], &dir.path().join("dist/LICENSE.txt"))
            .unwrap_err();

        assert!(matches!(err, AggregateError::InvalidOutput { .. }));
        assert!(dir.path().join("dist/boost/licenses/LICENSE").is_file());
    }

    #[test]
    fn canonical_path_resolves_missing_tails() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(
            canonical_path(&dir.path().join("a/b/../c")).unwrap(),
            root.join("a/c")
        );
        assert_eq!(canonical_path(&dir.path().join("./x")).unwrap(), root.join("x"));
    }
}

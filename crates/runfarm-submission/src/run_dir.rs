//! Run directory allocation and population.
//!
//! Run ids are allocated by scanning `run_dir_root` for the highest numeric
//! prefix and adding one. Two submissions racing on the same root can pick the
//! same id; the loser fails in `create_run_dir_local` with
//! [`SubmitError::RunDirExists`] instead of sharing the directory.

use crate::config::SubmitConfig;
use crate::error::{SubmitError, SubmitResult};
use crate::layout::RunDirLayout;
use glob::Pattern;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

static RUN_ID_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+").expect("valid run id regex"));

/// Result of [`create_run_dir_local`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedRunDir {
    pub run_id: u32,
    pub run_name: String,
    /// Absolute path of the freshly created directory.
    pub run_dir: PathBuf,
}

/// What [`populate_run_dir`] staged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingReport {
    pub source_files: usize,
    pub extra_files: usize,
}

/// Next free run id under `run_dir_root`: max existing numeric prefix + 1, or 0.
pub fn next_run_id(run_dir_root: &Path) -> SubmitResult<u32> {
    let entries = match std::fs::read_dir(run_dir_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(SubmitError::io(run_dir_root, e)),
    };

    let mut run_id = 0;
    for entry in entries {
        let entry = entry.map_err(|e| SubmitError::io(run_dir_root, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(prefix) = RUN_ID_PREFIX.find(&name) else {
            continue;
        };
        if let Ok(id) = prefix.as_str().parse::<u32>() {
            run_id = run_id.max(id.saturating_add(1));
        }
    }
    Ok(run_id)
}

/// Replace characters that are unsafe in a directory name with `_`.
pub fn sanitize_run_desc(run_desc: &str) -> String {
    run_desc
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '_' })
        .collect()
}

#[must_use]
pub fn format_run_name(run_id: u32, run_desc: &str) -> String {
    format!("{run_id:05}-{}", sanitize_run_desc(run_desc))
}

/// Allocate and create a fresh run directory under `config.run_dir_root`.
///
/// `run_dir_root` must already be template-expanded and absolute.
pub fn create_run_dir_local(config: &SubmitConfig) -> SubmitResult<AllocatedRunDir> {
    let run_dir_root = Path::new(&config.run_dir_root);
    if !run_dir_root.is_absolute() {
        return Err(SubmitError::InvalidConfig(format!(
            "run_dir_root must be expanded to an absolute path before allocation: {}",
            config.run_dir_root
        )));
    }

    std::fs::create_dir_all(run_dir_root).map_err(|e| SubmitError::io(run_dir_root, e))?;

    let run_id = next_run_id(run_dir_root)?;
    let run_name = format_run_name(run_id, &config.run_desc);
    let run_dir = run_dir_root.join(&run_name);

    match std::fs::create_dir(&run_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(SubmitError::RunDirExists(run_dir));
        }
        Err(e) => return Err(SubmitError::io(&run_dir, e)),
    }

    tracing::debug!(run_id, run_dir = %run_dir.display(), "allocated run dir");
    Ok(AllocatedRunDir { run_id, run_name, run_dir })
}

fn compile_ignores(patterns: &[String]) -> SubmitResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| SubmitError::InvalidConfig(format!("invalid run_dir_ignore pattern {p:?}: {e}")))
        })
        .collect()
}

fn is_ignored(name: &str, ignores: &[Pattern]) -> bool {
    ignores.iter().any(|p| p.matches(name))
}

fn copy_file(src: &Path, dst: &Path) -> SubmitResult<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SubmitError::io(parent, e))?;
    }
    std::fs::copy(src, dst).map_err(|e| SubmitError::io(src, e))?;
    Ok(())
}

/// Copy `source_root` into `dest`, pruning any entry whose name matches an
/// ignore glob and never descending into `exclude`.
fn copy_source_tree(source_root: &Path, dest: &Path, ignores: &[Pattern], exclude: &Path) -> SubmitResult<usize> {
    let exclude = exclude.canonicalize().unwrap_or_else(|_| exclude.to_path_buf());
    let walker = WalkDir::new(source_root).follow_links(false).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        if is_ignored(&entry.file_name().to_string_lossy(), ignores) {
            return false;
        }
        if entry.file_type().is_dir() {
            let path = entry.path().canonicalize().unwrap_or_else(|_| entry.path().to_path_buf());
            return path != exclude;
        }
        true
    });

    let mut copied = 0;
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| source_root.to_path_buf(), Path::to_path_buf);
            SubmitError::io(path, e.into())
        })?;
        // Symlinked files are staged as copies of their targets; symlinked
        // directories are not descended into.
        let file_type = entry.file_type();
        if !file_type.is_file() && !(file_type.is_symlink() && entry.path().is_file()) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source_root)
            .map_err(|_| SubmitError::InvalidConfig(format!("{} escapes the source root", entry.path().display())))?;
        copy_file(entry.path(), &dest.join(rel))?;
        copied += 1;
    }
    Ok(copied)
}

fn check_relative_dest(dest: &Path) -> SubmitResult<()> {
    let escapes = dest.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if dest.as_os_str().is_empty() || escapes {
        return Err(SubmitError::InvalidConfig(format!(
            "extra file destination must be a relative path inside the run dir: {}",
            dest.display()
        )));
    }
    Ok(())
}

/// Write the config snapshot, stage source files and extra files into `host_run_dir`.
///
/// The snapshot is written first and is left in place when staging fails.
pub fn populate_run_dir(config: &SubmitConfig, host_run_dir: &Path, source_root: &Path) -> SubmitResult<StagingReport> {
    let layout = RunDirLayout::new(host_run_dir);
    write_snapshot(config, &layout)?;

    let src_dir = layout.source_dir();
    std::fs::create_dir_all(&src_dir).map_err(|e| SubmitError::io(&src_dir, e))?;

    let mut report = StagingReport::default();
    let skip_sources = config.local.as_ref().is_some_and(|l| l.do_not_copy_source_files);
    if skip_sources {
        tracing::debug!("skipping source copy (do_not_copy_source_files)");
    } else {
        let ignores = compile_ignores(&config.run_dir_ignore)?;
        report.source_files = copy_source_tree(source_root, &src_dir, &ignores, Path::new(&config.run_dir_root))?;
    }

    for extra in &config.run_dir_extra_files {
        check_relative_dest(&extra.dest)?;
        if !extra.source.is_file() {
            return Err(SubmitError::MissingExtraFile(extra.source.clone()));
        }
        copy_file(&extra.source, &src_dir.join(&extra.dest))?;
        report.extra_files += 1;
    }

    tracing::debug!(
        source_files = report.source_files,
        extra_files = report.extra_files,
        run_dir = %host_run_dir.display(),
        "populated run dir"
    );
    Ok(report)
}

fn write_snapshot(config: &SubmitConfig, layout: &RunDirLayout) -> SubmitResult<()> {
    let json_path = layout.config_json_path();
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&json_path, json).map_err(|e| SubmitError::io(&json_path, e))?;

    let txt_path = layout.config_txt_path();
    std::fs::write(&txt_path, format!("{config:#?}\n")).map_err(|e| SubmitError::io(&txt_path, e))?;
    Ok(())
}

/// Read back the config snapshot of a populated run dir.
pub fn read_snapshot(run_dir: &Path) -> SubmitResult<SubmitConfig> {
    let path = RunDirLayout::new(run_dir).config_json_path();
    let bytes = std::fs::read(&path).map_err(|e| SubmitError::io(&path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

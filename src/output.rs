// src/output.rs
//
// Per-file actions once a file has matched: tag listings (--ls),
// shell commands (--exec) and the symlink mirror directory (--symlink).

use crate::keymap::ResolvedKeyMap;
use crate::tag_store::{TagSnapshot, TagStore};
use crate::template::{TagTemplate, truncate};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info, trace, warn};

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Show underscore and dotted names too
    pub verbose: bool,
    /// Show dotted (fully qualified) names
    pub long: bool,
    /// Replace names with the metadata labels
    pub human: bool,
    /// In human mode, keep entries without a label under their own name
    pub unknown: bool,
    /// Value length limit, 0 for none
    pub max_str: usize,
}

/// Print `key: value` lines sorted by key, values aligned in one column.
/// With `select`, only those keys are printed.
pub fn print_key_values(
    out: &mut dyn Write,
    tags: &BTreeMap<String, String>,
    select: Option<&BTreeSet<String>>,
    opts: &ListOptions,
) -> io::Result<()> {
    let selected = |key: &str| select.is_none_or(|s| s.is_empty() || s.contains(key));
    let max_tag = tags.keys().filter(|k| selected(k)).map(|k| k.chars().count()).max().unwrap_or(0);

    for (key, value) in tags {
        if !opts.verbose && key.starts_with('_') {
            continue;
        }
        if !opts.long && !opts.verbose && key.contains('.') {
            continue;
        }
        if !selected(key) {
            continue;
        }
        let value = truncate(value, Some(opts.max_str));
        writeln!(out, "{:<width$} {}", format!("{}:", key), value, width = max_tag + 1)?;
    }
    Ok(())
}

/// `--ls`: a header line, then the file's tags.
pub fn list(
    out: &mut dyn Write,
    path: &Path,
    tags: &TagSnapshot,
    store: &TagStore,
    keymap: &ResolvedKeyMap,
    selected: Option<&BTreeSet<String>>,
    opts: &ListOptions,
) -> io::Result<()> {
    writeln!(out, "==== {} ====", path.display())?;
    if selected.is_some_and(BTreeSet::is_empty) {
        return Ok(()); // nothing selected in this file
    }
    if !opts.human {
        return print_key_values(out, tags, selected, opts);
    }

    let mut human = BTreeMap::new();
    for (key, value) in tags {
        if selected.is_some_and(|s| !s.contains(key)) {
            continue;
        }
        let label = if key.starts_with('_') {
            None
        } else {
            keymap.resolve(key).and_then(|canonical| store.label(canonical))
        };
        let name = match label {
            Some(label) => label.to_string(),
            None if opts.unknown => key.clone(),
            None => continue,
        };
        trace!("tag to human: {} -> {}", key, name);
        human.insert(name, value.clone());
    }
    print_key_values(out, &human, None, opts)
}

// ============================================================================
// Exec
// ============================================================================

fn shell_command(cmd: &str) -> Command {
    #[cfg(windows)]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(cmd);
        command
    }
    #[cfg(not(windows))]
    {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd);
        command
    }
}

/// Render and run every --exec template through the shell, one at a time.
/// Values are substituted in full. With `noexec` the commands are only shown.
pub fn run_exec(
    out: &mut dyn Write,
    templates: &[TagTemplate],
    vars: &TagSnapshot,
    noexec: bool,
    verbose: bool,
) -> io::Result<()> {
    for template in templates {
        let cmd = template.render(vars, None);
        trace!("exec {:?} -> {:?}", template.as_str(), cmd);
        if verbose || noexec {
            writeln!(out, "Executing: {}", cmd)?;
        }
        if noexec {
            continue;
        }
        // keep our output ahead of the child's
        out.flush()?;
        match shell_command(&cmd).status() {
            Ok(status) if !status.success() => debug!("Command {:?} exited with {}", cmd, status),
            Ok(_) => {}
            Err(e) => error!("Unable to run {:?}: {}", cmd, e),
        }
    }
    Ok(())
}

// ============================================================================
// Symlinks
// ============================================================================

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

/// Directory that gets a symlink to every matched file, named after the
/// file's base name.
#[derive(Debug, Clone)]
pub struct LinkDir {
    dir: PathBuf,
}

impl LinkDir {
    pub fn open(dir: &Path) -> io::Result<Self> {
        if !fs::metadata(dir)?.is_dir() {
            return Err(io::Error::new(io::ErrorKind::NotADirectory, "not a directory"));
        }
        Ok(Self { dir: std::path::absolute(dir)? })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Remove every symlink in the directory. Other entries are left alone.
    pub fn clear(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !is_symlink(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => debug!("Unable to remove {}: {}", path.display(), e),
            }
        }
        debug!("Cleared {} symlinks from {}", removed, self.dir.display());
        Ok(removed)
    }

    /// Link `file` into the directory, replacing an older symlink of the same
    /// name. Returns the link path, or None when the link would point to itself.
    pub fn link(&self, file: &Path) -> io::Result<Option<PathBuf>> {
        let target = std::path::absolute(file)?;
        let Some(name) = file.file_name() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"));
        };
        let dest = self.dir.join(name);
        if target == dest {
            warn!("symlink would point to itself: {}", target.display());
            return Ok(None);
        }
        if is_symlink(&dest)
            && let Err(e) = fs::remove_file(&dest)
        {
            debug!("Unable to remove {}: {}", dest.display(), e);
        }
        make_symlink(&target, &dest)?;
        info!("ln -s {} {}", target.display(), self.dir.display());
        Ok(Some(dest))
    }
}

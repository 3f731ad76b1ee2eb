// src/engine.rs
//
// The file driver: walks the named paths, runs every file through the
// filter pipeline and the actions, and keeps the file/match counters that
// the scripts and templates see.

use crate::config::{Options, VERSION};
use crate::keymap::ResolvedKeyMap;
use crate::metadata::read_metadata;
use crate::output;
use crate::script::{EachOutcome, FileLocals, ScriptEnv, TagChange};
use crate::tag_store::{
    KEY_ARG, KEY_DISTANCE, KEY_FILE_COUNT, KEY_FILE_NAME, KEY_FILE_PATH, KEY_MATCH_COUNT, KEY_NEAR, KEY_VERSION,
};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, trace, warn};
use walkdir::{DirEntry, WalkDir};

pub struct TagBoy<W: Write> {
    opts: Options,
    env: ScriptEnv,
    out: W,
    interrupted: Arc<AtomicBool>,
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name().to_string_lossy().starts_with('.')
}

impl<W: Write> TagBoy<W> {
    pub fn new(opts: Options, out: W) -> Self {
        let env = ScriptEnv::new(VERSION, &opts.arg);
        Self { opts, env, out, interrupted: Arc::new(AtomicBool::new(false)) }
    }

    /// Set from a signal handler to stop after the current file.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn file_count(&self) -> usize {
        self.env.file_count
    }

    pub fn match_count(&self) -> usize {
        self.env.match_count
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.out
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    /// Process every path, then the end phase. True when anything matched.
    /// An output error stops the traversal, but the end phase still runs
    /// before the error is returned.
    pub fn run(&mut self) -> io::Result<bool> {
        let paths = self.opts.paths.clone();
        let mut failure = None;
        for path in &paths {
            if self.is_interrupted() {
                warn!("Interrupted");
                break;
            }
            if let Err(e) = self.each_path(path) {
                error!("Output failed, stopping: {}", e);
                failure = Some(e);
                break;
            }
        }
        let matched = self.do_end();
        match failure {
            Some(e) => Err(e),
            None => matched,
        }
    }

    pub fn each_path(&mut self, path: &Path) -> io::Result<()> {
        if path.is_dir() {
            self.each_dir(path)
        } else if path.is_file() {
            self.each_file(path)
        } else {
            error!("Can't find a file/directory named: {}", path.display());
            Ok(())
        }
    }

    /// Walk a directory tree, files of a directory before its subdirectories.
    pub fn each_dir(&mut self, root: &Path) -> io::Result<()> {
        let mut walker = WalkDir::new(root).follow_links(self.opts.follow).sort_by(|a, b| {
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| natord::compare(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy()))
        });
        if let Some(depth) = self.opts.max_depth {
            walker = walker.max_depth(depth + 1);
        }

        for entry in walker.into_iter().filter_entry(|e| !is_hidden_dir(e)) {
            if self.is_interrupted() {
                break;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Unable to read directory entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !self.opts.names.check_match(&name) {
                trace!("Name mismatch: {}", entry.path().display());
                continue;
            }
            self.each_file(entry.path())?;
        }
        Ok(())
    }

    /// Run one file through the whole pipeline.
    pub fn each_file(&mut self, path: &Path) -> io::Result<()> {
        let store = match read_metadata(path) {
            Ok(store) => store,
            Err(e) => {
                error!("Error reading: {}", e);
                return Ok(());
            }
        };

        if self.env.file_count == 0 {
            self.do_start();
        }
        self.env.file_count += 1;
        let keymap = ResolvedKeyMap::build(&store, self.opts.long);
        if keymap.is_empty() {
            debug!("No tags in {}", path.display());
        } else {
            trace!("{}: {} tags", path.display(), keymap.len());
        }

        if !self.opts.grep.is_empty() && !self.opts.grep.matches(path, &store, &keymap, &mut self.out)? {
            return Ok(());
        }

        let selected = (!self.opts.select.is_empty()).then(|| self.opts.select.expand(&keymap));

        let mut tags = if self.opts.hooks.each.is_empty() {
            keymap.snapshot(&store)
        } else {
            let snapshot = keymap.snapshot(&store);
            let mut locals = FileLocals::new(path, &snapshot, &store, &keymap, selected.as_ref());
            if self.opts.hooks.run_each(&mut self.env, &mut locals, &mut self.out) == EachOutcome::Skipped {
                debug!("Skipped by script: {}", path.display());
                return Ok(());
            }
            report_changes(path, &locals.tag_changes());
            locals.tags()
        };

        tags.insert(KEY_ARG.to_string(), self.opts.arg.clone());
        tags.insert(KEY_FILE_COUNT.to_string(), self.env.file_count.to_string());
        tags.insert(KEY_FILE_NAME.to_string(), file_name(path));
        tags.insert(KEY_FILE_PATH.to_string(), path.display().to_string());
        tags.insert(KEY_VERSION.to_string(), VERSION.to_string());

        if !self.opts.near.is_empty() {
            tags.insert(KEY_NEAR.to_string(), String::new());
            tags.insert(KEY_DISTANCE.to_string(), String::new());
            if !self.opts.near.check(path, &mut tags) {
                return Ok(());
            }
        }

        self.env.match_count += 1;
        tags.insert(KEY_MATCH_COUNT.to_string(), self.env.match_count.to_string());

        if self.opts.print_path {
            writeln!(self.out, "{}", path.display())?;
        }
        for template in &self.opts.echo {
            writeln!(self.out, "{}", template.render(&tags, Some(self.opts.list.max_str)))?;
        }
        if self.opts.ls {
            output::list(&mut self.out, path, &tags, &store, &keymap, selected.as_ref(), &self.opts.list)?;
        }
        if !self.opts.exec.is_empty() {
            output::run_exec(&mut self.out, &self.opts.exec, &tags, self.opts.noexec, self.opts.verbose)?;
        }
        if let Some(link_dir) = &self.opts.link_dir
            && let Err(e) = link_dir.link(path)
        {
            error!("Unable to link {} into {}: {}", path.display(), link_dir.path().display(), e);
        }
        Ok(())
    }

    /// Begin phase, then clear the link directory if asked to.
    fn do_start(&mut self) {
        if !self.opts.hooks.begin.is_empty() {
            self.opts.hooks.run_begin(&mut self.env, &mut self.out);
        }
        if self.opts.sym_clear
            && let Some(link_dir) = &self.opts.link_dir
        {
            match link_dir.clear() {
                Ok(count) => info!("Removed {} symlinks from {}", count, link_dir.path().display()),
                Err(e) => error!("Unable to clear {}: {}", link_dir.path().display(), e),
            }
        }
    }

    /// End phase. Only runs if at least one file was read.
    pub fn do_end(&mut self) -> io::Result<bool> {
        if self.env.file_count > 0 && !self.opts.hooks.end.is_empty() {
            self.opts.hooks.run_end(&mut self.env, &mut self.out);
        }
        self.out.flush()?;
        info!("{} files read, {} matched", self.env.file_count, self.env.match_count);
        Ok(self.env.match_count > 0)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn report_changes(path: &Path, changes: &[TagChange]) {
    for change in changes {
        match change {
            TagChange::New { key, value } => {
                warn!("{}: new tag {} = {:?} is not written", path.display(), key, value)
            }
            TagChange::Changed { key, old, new } => {
                warn!("{}: tag {} changed {:?} -> {:?}, not written", path.display(), key, old, new)
            }
        }
    }
}

// src/config.rs
//
// Command line, optional TOML config file, and the validated run options
// built from both. Every problem that should stop the run before any file
// is read surfaces here as a ConfigError.

use crate::geodesy::{lat_lon, parse_lat_lon};
use crate::glob::NameGlob;
use crate::output::{LinkDir, ListOptions};
use crate::predicate::{Grep, GrepPair, NameFilter, Near, Select};
use crate::script::{self, CompiledBlock, Hooks, ScriptError};
use crate::template::TagTemplate;
use clap::{ArgAction, Parser};
use regex::RegexBuilder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("APP_GIT_HASH"), ")");

const CONFIG_DIR_NAME: &str = "tagboy";
const CONFIG_FILE_NAME: &str = "tagboy.toml";

const DEFAULT_MAX_STR: usize = 50;
const DEFAULT_DISTANCE_KM: f64 = 5.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config {}: {source}", .path.display())]
    ConfigRead { path: PathBuf, source: io::Error },
    #[error("Unable to parse config {}: {source}", .path.display())]
    ConfigParse { path: PathBuf, source: toml::de::Error },
    #[error("linkdir must be an existing directory: {}: {source}", .path.display())]
    LinkDir { path: PathBuf, source: io::Error },
    #[error("Bad glob {pattern:?}: {source}")]
    Glob { pattern: String, source: glob::PatternError },
    #[error("Bad grep pattern {pattern:?}: {source}")]
    Regex { pattern: String, source: regex::Error },
    #[error("--distance must be a non-negative number of kilometers, got {0}")]
    Distance(f64),
    #[error("Compile failed <{source}>: {snippet}")]
    Compile { snippet: String, source: ScriptError },
    #[error(transparent)]
    Script(ScriptError),
}

// ============================================================================
// Command line
// ============================================================================

/// As cowboys wrangle cows, tagboy wrangles EXIF/IPTC/XMP tags in images.
///
/// Find files (--iname, --name, or name them), select on tags (--grep,
/// --near, --eval), then show or do something (--print, --ls, --echo,
/// --exec, --symlink, --eval).
#[derive(Parser, Debug)]
#[command(author, version = LONG_VERSION)]
pub struct Cli {
    /// Files and directories to scan
    pub paths: Vec<PathBuf>,

    /// Match file name using IGLOB, case ignored (repeatable)
    #[arg(long, value_name = "IGLOB")]
    pub iname: Vec<String>,

    /// Match file name using GLOB (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub name: Vec<String>,

    /// Maximum number of directories to descend, 0 means none, negative means no limit
    #[arg(long, allow_negative_numbers = true, value_name = "N")]
    pub maxdepth: Option<i64>,

    /// Search for PATTERN in TAGS_GLOB[;GLOB] (repeatable, -v shows matches)
    #[arg(short = 'g', long, num_args = 2, value_names = ["PATTERN", "TAGS_GLOB"], action = ArgAction::Append)]
    pub grep: Vec<String>,

    /// Grep patterns ignore case
    #[arg(short = 'i', long)]
    pub ignore_case: bool,

    /// Print the path of each matching file
    #[arg(long)]
    pub print: bool,

    /// Print STRING with $tag substitution (repeatable)
    #[arg(long, value_name = "STRING")]
    pub echo: Vec<String>,

    /// Run STRING through the shell with $tag substitution (repeatable)
    #[arg(long, value_name = "STRING")]
    pub exec: Vec<String>,

    /// Show --exec commands instead of running them
    #[arg(short = 'n', long)]
    pub noexec: bool,

    /// List the tags of each matching file
    #[arg(long)]
    pub ls: bool,

    /// Only list tags matching TAGS_GLOB[;GLOB] (repeatable)
    #[arg(short = 's', long, value_name = "TAGS_GLOB")]
    pub select: Vec<String>,

    /// Match files with a GPS position near 'LAT, LON' or a configured place (repeatable)
    #[arg(long, value_name = "LAT, LON", allow_hyphen_values = true)]
    pub near: Vec<String>,

    /// Radius for --near in kilometers [default: 5]
    #[arg(long, value_name = "KM", allow_negative_numbers = true)]
    pub distance: Option<f64>,

    /// Longest value to print, 0 for unlimited [default: 50]
    #[arg(long, value_name = "N")]
    pub maxstr: Option<usize>,

    /// Symlink matching files into LINKDIR
    #[arg(long, value_name = "LINKDIR")]
    pub symlink: Option<PathBuf>,

    /// Remove all symlinks in LINKDIR before creating new ones
    #[arg(long)]
    pub symclear: bool,

    /// Statements to run before the first file (repeatable)
    #[arg(long, value_name = "CODE")]
    pub begin: Vec<String>,

    /// Statements to run for each file (repeatable)
    #[arg(long, value_name = "CODE")]
    pub eval: Vec<String>,

    /// Statements to run after the last file (repeatable)
    #[arg(long, value_name = "CODE")]
    pub end: Vec<String>,

    /// Script file to run before the first file, - for stdin (repeatable)
    #[arg(long, value_name = "FILE")]
    pub beginfile: Vec<String>,

    /// Script file to run for each file, - for stdin (repeatable)
    #[arg(long, value_name = "FILE")]
    pub evalfile: Vec<String>,

    /// Script file to run after the last file, - for stdin (repeatable)
    #[arg(long, value_name = "FILE")]
    pub endfile: Vec<String>,

    /// Value of `arg` and $_arg
    #[arg(long, default_value = "")]
    pub arg: String,

    /// Follow symbolic links to directories
    #[arg(short = 'L', long)]
    pub follow: bool,

    /// Use only long form tag names
    #[arg(short = 'l', long)]
    pub long: bool,

    /// Prefix grep -v matches with the file name
    #[arg(short = 'H', long)]
    pub with_filename: bool,

    /// List tags under their human friendly labels
    #[arg(long)]
    pub human: bool,

    /// With --human, also list tags that have no label
    #[arg(short = 'u', long)]
    pub unknown: bool,

    /// Show more detail
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Show internal details (repeat for more)
    #[arg(short = 'D', long, action = ArgAction::Count)]
    pub debug: u8,

    /// Config file [default: <config dir>/tagboy/tagboy.toml]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Default tracing filter for -v / -D
    pub fn log_level(&self) -> &'static str {
        match (self.verbose, self.debug) {
            (_, d) if d >= 2 => "trace",
            (_, 1) => "debug",
            (true, _) => "info",
            _ => "warn",
        }
    }
}

// ============================================================================
// Config file
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub maxstr: Option<usize>,
    pub distance: Option<f64>,
    /// Named --near centers, name = [lat, lon]
    pub places: BTreeMap<String, [f64; 2]>,
}

impl FileConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load `explicit`, or the default file when it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ConfigRead { path: path.clone(), source })?;
        Self::parse(&content, &path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::ConfigParse { path: path.to_path_buf(), source })
    }
}

// ============================================================================
// Validated options
// ============================================================================

#[derive(Debug)]
pub struct Options {
    pub paths: Vec<PathBuf>,
    pub names: NameFilter,
    /// None for no limit
    pub max_depth: Option<usize>,
    pub follow: bool,
    pub long: bool,
    pub verbose: bool,
    pub grep: Grep,
    pub select: Select,
    pub near: Near,
    pub print_path: bool,
    pub echo: Vec<TagTemplate>,
    pub exec: Vec<TagTemplate>,
    pub noexec: bool,
    pub ls: bool,
    pub list: ListOptions,
    pub link_dir: Option<LinkDir>,
    pub sym_clear: bool,
    pub hooks: Hooks,
    pub arg: String,
}

fn split_globs(args: &[String]) -> Result<Vec<NameGlob>, ConfigError> {
    args.iter()
        .flat_map(|arg| arg.split(';'))
        .map(|pattern| {
            NameGlob::new(pattern).map_err(|source| ConfigError::Glob { pattern: pattern.to_string(), source })
        })
        .collect()
}

fn compile_blocks(files: &[String], inline: &[String], phase: &str) -> Result<Vec<CompiledBlock>, ConfigError> {
    let mut blocks = Vec::new();
    for path in files {
        blocks.push(script::compile_file(path).map_err(|err| compile_error(err, path))?);
    }
    let source_name = format!("<{}>", phase);
    for text in inline {
        blocks.push(script::compile(text, &source_name).map_err(|err| compile_error(err, text))?);
    }
    Ok(blocks)
}

fn compile_error(err: ScriptError, text: &str) -> ConfigError {
    match err {
        ScriptError::Read { .. } => ConfigError::Script(err),
        _ => ConfigError::Compile { snippet: script::snippet(text), source: err },
    }
}

impl Options {
    pub fn from_cli(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let link_dir = match &cli.symlink {
            Some(dir) => {
                Some(LinkDir::open(dir).map_err(|source| ConfigError::LinkDir { path: dir.clone(), source })?)
            }
            None => None,
        };
        if cli.symclear && link_dir.is_none() {
            warn!("--symclear is ignored if --symlink is not specified");
        }

        let mut centers = Vec::new();
        for arg in &cli.near {
            if let Some([lat, lon]) = file.places.get(arg.trim()) {
                centers.push(lat_lon(*lat, *lon));
            } else if let Some(point) = parse_lat_lon(arg) {
                centers.push(point);
            } else {
                warn!("Unable to parse {:?} as (lat, lon).  IGNORED", arg);
            }
        }
        let distance = cli.distance.or(file.distance).unwrap_or(DEFAULT_DISTANCE_KM);
        if !distance.is_finite() || distance < 0.0 {
            return Err(ConfigError::Distance(distance));
        }

        let hooks = Hooks {
            begin: compile_blocks(&cli.beginfile, &cli.begin, "begin")?,
            each: compile_blocks(&cli.evalfile, &cli.eval, "eval")?,
            end: compile_blocks(&cli.endfile, &cli.end, "end")?,
        };

        let mut pairs = Vec::new();
        for chunk in cli.grep.chunks_exact(2) {
            let (pattern, tags) = (&chunk[0], &chunk[1]);
            let re = RegexBuilder::new(pattern)
                .case_insensitive(cli.ignore_case)
                .build()
                .map_err(|source| ConfigError::Regex { pattern: pattern.clone(), source })?;
            for glob in split_globs(std::slice::from_ref(tags))? {
                pairs.push(GrepPair { pattern: re.clone(), tags: glob });
            }
        }

        let names = NameFilter::new(&cli.iname, &cli.name).map_err(|source| ConfigError::Glob {
            pattern: cli.iname.iter().chain(&cli.name).cloned().collect::<Vec<_>>().join(" "),
            source,
        })?;

        Ok(Self {
            names,
            max_depth: cli.maxdepth.and_then(|d| usize::try_from(d).ok()),
            follow: cli.follow,
            long: cli.long,
            verbose: cli.verbose,
            grep: Grep::new(pairs, cli.verbose, cli.with_filename),
            select: Select::new(split_globs(&cli.select)?),
            near: Near::new(centers, distance),
            print_path: cli.print,
            echo: cli.echo.iter().map(TagTemplate::new).collect(),
            exec: cli.exec.iter().map(TagTemplate::new).collect(),
            noexec: cli.noexec,
            ls: cli.ls,
            list: ListOptions {
                verbose: cli.verbose,
                long: cli.long,
                human: cli.human,
                unknown: cli.unknown,
                max_str: cli.maxstr.or(file.maxstr).unwrap_or(DEFAULT_MAX_STR),
            },
            link_dir,
            sym_clear: cli.symclear,
            hooks,
            arg: cli.arg,
            paths: cli.paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tagboy").chain(args.iter().copied())).unwrap()
    }

    fn options(args: &[&str]) -> Result<Options, ConfigError> {
        Options::from_cli(cli(args), FileConfig::default())
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let opts = options(&["photos"]).unwrap();
        assert_eq!(opts.paths, [PathBuf::from("photos")]);
        assert_eq!(opts.list.max_str, 50);
        assert_eq!(opts.near.radius_km, 5.0);
        assert!(opts.near.is_empty());
        assert!(opts.grep.is_empty());
        assert!(opts.names.is_empty());
        assert_eq!(opts.max_depth, None);
        assert!(opts.link_dir.is_none());
    }

    #[test]
    fn test_grep_pairs_and_tag_lists() {
        let opts = options(&["-g", "NIKON", "Make;Model", "--grep", "x", "*", "-s", "GPS*;Make", "-s", "Model"]).unwrap();
        let parsed = cli(&["-g", "NIKON", "Make;Model", "--grep", "x", "*"]);
        assert_eq!(parsed.grep, ["NIKON", "Make;Model", "x", "*"]);
        assert!(!opts.grep.is_empty());
        assert!(!opts.select.is_empty());
    }

    #[test]
    fn test_bad_patterns_are_fatal() {
        assert!(matches!(options(&["-g", "(", "Make"]), Err(ConfigError::Regex { .. })));
        assert!(matches!(options(&["--name", "[abc"]), Err(ConfigError::Glob { .. })));
        assert!(matches!(options(&["-s", "ok;[x"]), Err(ConfigError::Glob { .. })));
    }

    #[test]
    fn test_script_errors() {
        assert!(matches!(options(&["--eval", "x = ("]), Err(ConfigError::Compile { .. })));
        assert!(matches!(options(&["--beginfile", "/nonexistent/hook.tb"]), Err(ConfigError::Script(_))));
        let opts = options(&["--begin", "n = 0", "--eval", "n += 1", "--eval", "print n", "--end", "print n"]).unwrap();
        assert_eq!((opts.hooks.begin.len(), opts.hooks.each.len(), opts.hooks.end.len()), (1, 2, 1));
    }

    #[test]
    fn test_near_parsing() {
        let mut file = FileConfig::default();
        file.places.insert("home".to_string(), [60.17, 24.94]);
        let opts = Options::from_cli(
            cli(&["--near", "(37.273852, -107.884577)", "--near", "home", "--near", "nowhere", "--distance", "999"]),
            file,
        )
        .unwrap();
        assert!(!opts.near.is_empty());
        assert_eq!(opts.near.radius_km, 999.0);

        assert!(matches!(options(&["--distance", "-1"]), Err(ConfigError::Distance(_))));
        let file = FileConfig { distance: Some(-2.5), ..Default::default() };
        assert!(matches!(Options::from_cli(cli(&[]), file), Err(ConfigError::Distance(_))));
    }

    #[test]
    fn test_maxdepth() {
        assert_eq!(options(&["--maxdepth", "0"]).unwrap().max_depth, Some(0));
        assert_eq!(options(&["--maxdepth", "-1"]).unwrap().max_depth, None);
    }

    #[test]
    fn test_symlink_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            options(&["--symlink", missing.to_str().unwrap()]),
            Err(ConfigError::LinkDir { .. })
        ));
        let opts = options(&["--symlink", dir.path().to_str().unwrap(), "--symclear"]).unwrap();
        assert!(opts.link_dir.is_some());
        assert!(opts.sym_clear);
    }

    #[test]
    fn test_file_config() {
        let file = FileConfig::parse("maxstr = 10\n\n[places]\nhome = [60.17, 24.94]\n", Path::new("t.toml")).unwrap();
        assert_eq!(file.maxstr, Some(10));
        assert_eq!(file.distance, None);
        assert_eq!(file.places["home"], [60.17, 24.94]);

        assert!(matches!(
            FileConfig::parse("maxstr = 'x'", Path::new("t.toml")),
            Err(ConfigError::ConfigParse { .. })
        ));

        let opts = Options::from_cli(cli(&[]), FileConfig { maxstr: Some(10), distance: Some(2.5), ..Default::default() }).unwrap();
        assert_eq!(opts.list.max_str, 10);
        assert_eq!(opts.near.radius_km, 2.5);
        let opts = Options::from_cli(cli(&["--maxstr", "0"]), FileConfig { maxstr: Some(10), ..Default::default() }).unwrap();
        assert_eq!(opts.list.max_str, 0);
    }

    #[test]
    fn test_explicit_config_must_load() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.toml");
        assert!(matches!(FileConfig::load(Some(&missing)), Err(ConfigError::ConfigRead { .. })));

        let path = dir.path().join("tagboy.toml");
        fs::write(&path, "distance = 12.5\n").unwrap();
        assert_eq!(FileConfig::load(Some(&path)).unwrap().distance, Some(12.5));
    }

    #[test]
    fn test_log_level() {
        assert_eq!(cli(&[]).log_level(), "warn");
        assert_eq!(cli(&["-v"]).log_level(), "info");
        assert_eq!(cli(&["-D"]).log_level(), "debug");
        assert_eq!(cli(&["-v", "-DD"]).log_level(), "trace");
    }
}

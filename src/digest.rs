use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Bump as soon as the digest format or semantics change; a version
/// mismatch simply forces one full execution.
pub const DIGEST_VERSION: u32 = 1;

/// Dependency and output trees that never feed the digest.
const IGNORED_DIRS: &[&str] = &["node_modules", "build", "dist", "target"];

/// Extensions whose files feed the digest: sources, styles, templates,
/// config, and the static assets bundlers fingerprint.
const DIGEST_EXTENSIONS: &[&str] = &[
    // JS
    "js", "jsx", "cjs", "mjs", "ts", "tsx", // CSS
    "css", "scss", "sass", "less", "styl", "stylus", // templates
    "ejs", "hbs", "handlebars", "pug", "soy", "html", "vm", "vmd", "vtl", "ftl", // config
    "json", "xml", "yaml", "yml", "csv", "lock", // images
    "apng", "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "tiff", "tif", "avif",
    "eps", // fonts
    "ttf", "otf", "woff", "woff2", "eot", "sfnt", // audio and video
    "mp3", "mp4", "webm", "wav", "flac", "aac", "ogg", "oga", "opus", "m4a", "m4v", "mov", "avi",
    "wmv", "flv", "mkv",
];

/// Dot-files without a matching extension that still affect builds.
const DIGEST_FILES: &[&str] = &[
    ".parcelrc",
    ".babelrc",
    ".eslintrc",
    ".eslintignore",
    ".prettierrc",
    ".prettierignore",
    ".stylelintrc",
    ".stylelintignore",
    ".browserslistrc",
    ".npmrc",
];

/// Environment variables whose values feed the digest even when the
/// caller doesn't override them; most frontend tooling branches on these.
const DIGEST_ENV_VARS: &[&str] = &[
    "NODE_ENV",
    "BABEL_ENV",
    "OS",
    "OS_VERSION",
    "OS_ARCH",
    "OS_NAME",
    "OS_FAMILY",
];

/// Decides whether an expensive external invocation can be skipped
/// because nothing observable has changed since the last successful run.
///
/// A freshly computed digest is only ever compared against the last
/// *accepted* digest. The candidate written by [`should_execute`] is
/// promoted by an explicit [`accept`] call after the guarded task
/// succeeded; a failed or interrupted run leaves the baseline untouched.
///
/// [`should_execute`]: IncrementalBuildGate::should_execute
/// [`accept`]: IncrementalBuildGate::accept
pub struct IncrementalBuildGate {
    tool_name: String,
    target_directory: PathBuf,
    working_directory: PathBuf,
}

impl IncrementalBuildGate {
    pub fn new(
        tool_name: &str,
        target_directory: &Path,
        working_directory: &Path,
    ) -> IncrementalBuildGate {
        IncrementalBuildGate {
            tool_name: tool_name.to_string(),
            target_directory: target_directory.to_path_buf(),
            working_directory: working_directory.to_path_buf(),
        }
    }

    pub fn digest_file(&self) -> PathBuf {
        self.target_directory
            .join(format!("{}-incremental-build-digest.txt", self.tool_name))
    }

    pub fn candidate_file(&self) -> PathBuf {
        self.target_directory.join(format!(
            "{}-incremental-build-digest.candidate.txt",
            self.tool_name
        ))
    }

    /// Computes the current digest and compares it to the accepted
    /// baseline. `true` means run the task. The digest is a best-effort
    /// optimization: any failure while computing or persisting it logs
    /// and answers "execute".
    pub fn should_execute(
        &self,
        arguments: &str,
        tool_versions: &BTreeMap<String, String>,
        env_overrides: &BTreeMap<String, String>,
    ) -> bool {
        match self.try_should_execute(arguments, tool_versions, env_overrides) {
            Ok(execute) => execute,
            Err(cause) => {
                warn!("failure while determining if an incremental build is needed");
                debug!("digest computation failed: {cause:#}");
                true
            }
        }
    }

    fn try_should_execute(
        &self,
        arguments: &str,
        tool_versions: &BTreeMap<String, String>,
        env_overrides: &BTreeMap<String, String>,
    ) -> anyhow::Result<bool> {
        let current = compute_digest(
            &self.working_directory,
            arguments,
            tool_versions,
            env_overrides,
        )?;

        let accepted = self.digest_file();
        if accepted.exists() {
            let previous = fs::read_to_string(&accepted)?;
            if previous == current {
                info!("no changes detected, skipping execution");
                return Ok(false);
            }
            log_file_diff(&previous, &current);
        }

        fs::create_dir_all(&self.target_directory)?;
        fs::write(self.candidate_file(), &current)?;
        Ok(true)
    }

    /// Promotes the candidate digest to the accepted baseline. Call this
    /// only after the guarded task completed successfully.
    pub fn accept(&self) {
        let candidate = self.candidate_file();
        if !candidate.exists() {
            return;
        }
        debug!("accepting the incremental build digest");
        if let Err(cause) = fs::rename(&candidate, self.digest_file()) {
            warn!("failed to save the incremental build digest: {cause}");
        }
    }
}

/// Serialized as ordered text so two digests can be diffed line by line:
/// `#`-prefixed metadata first, then one sorted `<path>:<length>:<hash>`
/// line per watched file.
pub fn compute_digest(
    working_directory: &Path,
    arguments: &str,
    tool_versions: &BTreeMap<String, String>,
    env_overrides: &BTreeMap<String, String>,
) -> anyhow::Result<String> {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("# digest-version: {DIGEST_VERSION}"));
    lines.push(format!("# arguments: {arguments}"));
    for (tool, version) in tool_versions {
        lines.push(format!("# runtime: {tool}={version}"));
    }
    for (key, value) in effective_env(env_overrides) {
        lines.push(format!("# env: {key}={value}"));
    }

    let mut file_lines: Vec<String> = Vec::new();
    for file in watched_files(working_directory) {
        let bytes = fs::read(&file)?;
        let hash = blake3::hash(&bytes).to_hex();
        let relative = file
            .strip_prefix(working_directory)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        file_lines.push(format!("{relative}:{}:{hash}", bytes.len()));
    }
    file_lines.sort();
    lines.extend(file_lines);

    let mut digest = lines.join("\n");
    digest.push('\n');
    Ok(digest)
}

fn effective_env(overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = BTreeMap::new();
    for key in DIGEST_ENV_VARS {
        // unset and empty are the same to most tools
        env.insert(
            key.to_string(),
            std::env::var(key).unwrap_or_default(),
        );
    }
    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }
    env
}

fn watched_files(working_directory: &Path) -> Vec<PathBuf> {
    WalkDir::new(working_directory)
        .into_iter()
        .filter_entry(|entry| {
            // the walk root may itself be named like an ignored directory
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && IGNORED_DIRS
                        .contains(&entry.file_name().to_string_lossy().as_ref()))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            if DIGEST_FILES.contains(&name.as_ref()) {
                return true;
            }
            file_extension(&name)
                .map(|ext| DIGEST_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Dot-files like `.babelrc` have no extension in this view.
fn file_extension(file_name: &str) -> Option<&str> {
    let dot = file_name.rfind('.')?;
    if dot == 0 || dot == file_name.len() - 1 {
        return None;
    }
    Some(&file_name[dot + 1..])
}

fn log_file_diff(previous: &str, current: &str) {
    let old_files = parse_file_lines(previous);
    let new_files = parse_file_lines(current);

    for (path, hash) in &new_files {
        match old_files.get(path) {
            None => info!("added: {path}"),
            Some(old_hash) if old_hash != hash => info!("changed: {path}"),
            Some(_) => {}
        }
    }
    for path in old_files.keys() {
        if !new_files.contains_key(path) {
            info!("removed: {path}");
        }
    }

    for line in current.lines().filter(|l| l.starts_with('#')) {
        if !previous.contains(line) {
            info!("changed metadata: {}", line.trim_start_matches(['#', ' ']));
        }
    }
}

fn parse_file_lines(digest: &str) -> BTreeMap<String, String> {
    digest
        .lines()
        .filter(|line| !line.starts_with('#') && !line.is_empty())
        .filter_map(|line| {
            let (path, rest) = line.split_once(':')?;
            Some((path.to_string(), rest.to_string()))
        })
        .collect()
}

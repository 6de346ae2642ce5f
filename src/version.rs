use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::error::VersionError;

const TOOL_VERSIONS_FILENAME: &str = ".tool-versions";
const NODE_RELEASE_INDEX_URL: &str = "https://nodejs.org/dist/index.json";

static VALID_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v?\d+\.\d+\.\d+$").unwrap());
static MAJOR_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

/// Release-line codenames nodejs.org serves `latest-<codename>` links for.
/// Kept as a fixed list so validation works offline.
const RELEASE_CODENAMES: &[&str] = &[
    "argon", "boron", "carbon", "dubnium", "erbium", "fermium", "gallium", "hydrogen", "iron",
    "jod", "krypton", "lithium", "magnesium", "neon", "oxygen", "platinum",
];

/// Major lines nodejs.org serves `latest-v<major>.x` links for, with some
/// headroom for future releases. Same offline rationale as the codenames.
const LATEST_MAJOR_LINES: &[&str] = &[
    "0.10", "0.12", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16",
    "17", "18", "19", "20", "21", "22", "23", "24", "25", "26", "27", "28",
];

/// `latest`, `latest-v20.x`, `latest-hydrogen` and friends; these resolve
/// server-side and don't look like ordinary versions.
pub fn is_known_alias(version: &str) -> bool {
    if version == "latest" || version == "node-latest" {
        return true;
    }
    if let Some(suffix) = version.strip_prefix("latest-") {
        if RELEASE_CODENAMES.contains(&suffix) {
            return true;
        }
        if let Some(major) = suffix.strip_prefix('v').and_then(|s| s.strip_suffix(".x")) {
            return LATEST_MAJOR_LINES.contains(&major);
        }
    }
    false
}

pub fn validate_version(version: &str) -> bool {
    if is_known_alias(version) {
        return true;
    }
    let stripped = version.strip_prefix('v').unwrap_or(version);
    if MAJOR_ONLY.is_match(stripped) {
        // a bare major is only meaningful when a latest-vN.x line exists
        return LATEST_MAJOR_LINES.contains(&stripped);
    }
    VALID_VERSION.is_match(version)
}

/// Turns whatever the user pinned into something downloadable: known
/// aliases pass through, full versions gain their `v` prefix, and a bare
/// major (`"18"`) is resolved against the release index to the newest
/// matching release. Idempotent: normalizing twice changes nothing.
pub fn normalize_version(version: &str) -> String {
    let version = version.to_lowercase();
    if is_known_alias(&version) {
        return version;
    }
    let stripped = version.strip_prefix('v').unwrap_or(&version);
    find_matching_released_version(stripped).unwrap_or_else(|| format!("v{stripped}"))
}

#[derive(Debug, Deserialize)]
struct NodeRelease {
    version: String,
}

/// Fetched at most once per process; a multi-module build shouldn't hit
/// the network once per module. `None` means not fetched yet, an empty
/// vec means the fetch failed and aliases are used literally.
static RELEASED_VERSIONS: Lazy<Mutex<Option<Vec<String>>>> = Lazy::new(|| Mutex::new(None));

fn released_versions() -> Vec<String> {
    let mut cache = RELEASED_VERSIONS.lock().unwrap();
    if let Some(versions) = cache.as_ref() {
        return versions.clone();
    }
    let versions = match fetch_release_index() {
        Ok(versions) => versions,
        Err(cause) => {
            error!(
                "failed to fetch the list of released node versions to turn \
                 loosely-defined versions into something specific & downloadable"
            );
            debug!("release index fetch failed: {cause:#}");
            Vec::new()
        }
    };
    *cache = Some(versions.clone());
    versions
}

fn fetch_release_index() -> anyhow::Result<Vec<String>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let releases: Vec<NodeRelease> = client
        .get(NODE_RELEASE_INDEX_URL)
        .send()?
        .error_for_status()?
        .json()?;
    Ok(releases.into_iter().map(|r| r.version).collect())
}

fn find_matching_released_version(requested_without_v: &str) -> Option<String> {
    let wanted = format!("v{requested_without_v}");
    let mut matching: Vec<String> = released_versions()
        .into_iter()
        .filter(|candidate| {
            candidate == &wanted || candidate.starts_with(&format!("{wanted}."))
        })
        .collect();
    matching.sort_by(|a, b| compare_versions(b, a));
    matching.into_iter().next()
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |v: &str| {
        semver::Version::parse(v.strip_prefix('v').unwrap_or(v))
            .unwrap_or_else(|_| semver::Version::new(0, 0, 0))
    };
    parse(a).cmp(&parse(b))
}

/// Resolves the desired tool version. Precedence: the explicitly
/// configured version wins, then an explicitly configured version file,
/// then an upward search from the working directory for the usual
/// version-pinning files.
pub fn resolve_version(
    working_dir: &Path,
    provided_version: Option<&str>,
    version_file: Option<&Path>,
) -> Result<String, VersionError> {
    if let Some(version) = provided_version {
        if !version.trim().is_empty() {
            debug!("looks like a version was configured, using that: {version}");
            return Ok(version.trim().to_string());
        }
    }

    if let Some(file) = version_file {
        if !file.exists() {
            return Err(VersionError::FileMissing(file.to_path_buf()));
        }
        let name = file.to_string_lossy();
        let version = if name.ends_with(".toml") && name.contains("mise") {
            read_mise_toml_file(file)?
        } else if name.ends_with(TOOL_VERSIONS_FILENAME) {
            read_tool_versions_file(file)?
        } else {
            read_nvmrc_file(file)?
        };
        return version.ok_or_else(|| VersionError::NotFound(file.to_path_buf()));
    }

    recursively_find_version(working_dir)
}

fn recursively_find_version(start: &Path) -> Result<String, VersionError> {
    let mut directory = start.to_path_buf();
    loop {
        // An unreadable directory ends the search rather than silently
        // skipping a level that might hold the pin.
        std::fs::read_dir(&directory).map_err(|e| VersionError::Io(directory.clone(), e))?;

        for file_name in [".node-version", ".nvmrc"] {
            let candidate = directory.join(file_name);
            if candidate.exists() {
                if let Some(version) = read_nvmrc_logged(&candidate)? {
                    return Ok(version);
                }
            }
        }

        let tool_versions = directory.join(TOOL_VERSIONS_FILENAME);
        if tool_versions.exists() {
            if let Some(version) = read_tool_versions_file(&tool_versions)? {
                info!("found the node version in {}", tool_versions.display());
                return Ok(version);
            }
        }

        for relative in mise_config_filenames() {
            let candidate = if relative.is_absolute() {
                relative
            } else {
                directory.join(relative)
            };
            if candidate.exists() {
                if let Some(version) = read_mise_toml_file(&candidate)? {
                    info!("found the node version in {}", candidate.display());
                    return Ok(version);
                }
            }
        }

        match directory.parent() {
            Some(parent) if parent != directory => directory = parent.to_path_buf(),
            _ => return Err(VersionError::NotFound(start.to_path_buf())),
        }
    }
}

fn read_nvmrc_logged(file: &Path) -> Result<Option<String>, VersionError> {
    let version = read_nvmrc_file(file)?;
    if version.is_some() {
        info!("found the node version in {}", file.display());
    }
    Ok(version)
}

/// Mise accepts configuration from a pile of locations; the ordering here
/// mirrors mise's own.
fn mise_config_filenames() -> Vec<PathBuf> {
    let mise_config_dir = std::env::var("MISE_CONFIG_DIR").ok();
    let mise_env = std::env::var("MISE_ENV").ok();

    let mut names: Vec<PathBuf> = Vec::new();

    if let (Some(dir), Some(env)) = (&mise_config_dir, &mise_env) {
        names.push(PathBuf::from(format!("{dir}/config.{env}.toml")));
        names.push(PathBuf::from(format!("{dir}/mise.{env}.toml")));
    }

    for fixed in [
        ".config/mise/config.toml",
        "mise/config.toml",
        "mise.toml",
        ".mise/config.toml",
        ".mise.toml",
        ".config/mise/config.local.toml",
        "mise/config.local.toml",
        "mise.local.toml",
        ".mise/config.local.toml",
        ".mise.local.toml",
    ] {
        names.push(PathBuf::from(fixed));
    }

    if let Some(env) = &mise_env {
        for pattern in [
            format!(".config/mise/config.{env}.toml"),
            format!("mise/config.{env}.toml"),
            format!("mise.{env}.toml"),
            format!(".mise/config.{env}.toml"),
            format!(".mise.{env}.toml"),
            format!(".config/mise/config.{env}.local.toml"),
            format!("mise/config.{env}.local.toml"),
            format!(".mise/config.{env}.local.toml"),
            format!(".mise.{env}.local.toml"),
        ] {
            names.push(PathBuf::from(pattern));
        }
    }

    names
}

fn read_lines(file: &Path) -> Result<Vec<String>, VersionError> {
    let contents =
        std::fs::read_to_string(file).map_err(|e| VersionError::Io(file.to_path_buf(), e))?;
    Ok(contents.lines().map(str::to_string).collect())
}

fn read_nvmrc_file(file: &Path) -> Result<Option<String>, VersionError> {
    Ok(parse_nvmrc_lines(&read_lines(file)?))
}

/// FNM, NVS and NVM accept different comment styles, so this is the most
/// forgiving of the lot: `#`, `/` and `!` all open a comment.
fn parse_nvmrc_lines(lines: &[String]) -> Option<String> {
    static TRAILING_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[#!/].*$").unwrap());

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') || trimmed.starts_with('/') || trimmed.starts_with('!') {
            continue;
        }
        let version = TRAILING_COMMENT.replace(trimmed, "").to_string();
        return Some(version);
    }
    None
}

fn read_tool_versions_file(file: &Path) -> Result<Option<String>, VersionError> {
    static NODE_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^node(js)?\s*").unwrap());

    for line in read_lines(file)? {
        let trimmed = line.trim();
        if trimmed.is_empty() || !trimmed.starts_with("node") {
            continue;
        }
        return Ok(Some(NODE_KEY.replace(trimmed, "").trim().to_string()));
    }
    Ok(None)
}

fn read_mise_toml_file(file: &Path) -> Result<Option<String>, VersionError> {
    static NODE_ASSIGNMENT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^node(js)?\s*=\s*").unwrap());
    static TRAILING_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"#.*$").unwrap());

    for line in read_lines(file)? {
        let trimmed = line.trim();
        if trimmed.is_empty() || !trimmed.starts_with("node") {
            // also skips over comments and section headers
            continue;
        }
        if trimmed.contains('[') {
            return Err(VersionError::UnsupportedConfig(
                file.to_path_buf(),
                "mise file support is limited to a single version".to_string(),
            ));
        }
        let version = NODE_ASSIGNMENT.replace(trimmed, "");
        let version = TRAILING_COMMENT.replace(&version, "");
        return Ok(Some(version.replace('"', "").trim().to_string()));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn strings(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn validates_plain_and_prefixed_versions() {
        assert!(validate_version("v10.0.0"));
        assert!(validate_version("10.0.0"));
        assert!(validate_version("18"));
        assert!(validate_version("latest"));
        assert!(validate_version("latest-v20.x"));
        assert!(validate_version("latest-hydrogen"));
        assert!(!validate_version("10.0"));
        assert!(!validate_version("not-a-version"));
        // bare majors are only valid while a latest-vN.x line exists
        assert!(!validate_version("999"));
        assert!(!validate_version("latest-v999.x"));
    }

    #[test]
    fn normalization_is_idempotent_offline() {
        // the test environment has no release index; aliases pass through
        // and numeric versions gain the `v` prefix
        for input in ["v22.9.0", "22.9.0", "latest", "latest-v20.x"] {
            let once = normalize_version(input);
            assert_eq!(normalize_version(&once), once);
        }
        assert_eq!(normalize_version("22.9.0"), "v22.9.0");
        assert_eq!(normalize_version("LATEST"), "latest");
    }

    #[test]
    fn matching_prefers_the_newest_release() {
        let versions: Vec<String> = strings(&["v18.1.0", "v18.20.4", "v18.9.1", "v20.1.0"]);
        *RELEASED_VERSIONS.lock().unwrap() = Some(versions);

        assert_eq!(find_matching_released_version("18"), Some("v18.20.4".into()));
        assert_eq!(find_matching_released_version("21"), None);

        *RELEASED_VERSIONS.lock().unwrap() = Some(Vec::new());
    }

    #[test]
    fn nvmrc_parsing_skips_comments_and_blanks() {
        let lines = strings(&["", "# which version to use", "v10.0.0 # pinned", "v12.0.0"]);
        assert_eq!(parse_nvmrc_lines(&lines), Some("v10.0.0".to_string()));

        let lines = strings(&["/* nothing here */"]);
        assert_eq!(parse_nvmrc_lines(&lines), None);

        let lines = strings(&["! legacy comment", "18.20.4"]);
        assert_eq!(parse_nvmrc_lines(&lines), Some("18.20.4".to_string()));

        // a slash opens a trailing comment, same as # and !
        let lines = strings(&["lts/hydrogen"]);
        assert_eq!(parse_nvmrc_lines(&lines), Some("lts".to_string()));
    }

    #[test]
    fn provided_version_wins_over_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".nvmrc"), "v10.0.0\n").unwrap();

        let version = resolve_version(dir.path(), Some("v22.9.0"), None).unwrap();
        assert_eq!(version, "v22.9.0");
    }

    #[test]
    fn nvmrc_is_found_by_the_upward_search() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".nvmrc"), "v10.0.0 # pinned\n").unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let version = resolve_version(&nested, None, None).unwrap();
        assert_eq!(version, "v10.0.0");
    }

    #[test]
    fn node_version_file_wins_over_nvmrc_in_the_same_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".node-version"), "v20.11.0\n").unwrap();
        fs::write(dir.path().join(".nvmrc"), "v10.0.0\n").unwrap();

        let version = resolve_version(dir.path(), None, None).unwrap();
        assert_eq!(version, "v20.11.0");
    }

    #[test]
    fn explicit_tool_versions_file_is_parsed_by_name() {
        let dir = tempdir().unwrap();
        let file = dir.path().join(".tool-versions");
        fs::write(&file, "ruby 3.2.2\nnodejs 20.10.0\n").unwrap();

        let version = resolve_version(dir.path(), None, Some(&file)).unwrap();
        assert_eq!(version, "20.10.0");
    }

    #[test]
    fn mise_toml_single_value_is_parsed() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("mise.toml");
        fs::write(&file, "[tools]\nnode = \"22.9.0\" # pinned\n").unwrap();

        let version = resolve_version(dir.path(), None, Some(&file)).unwrap();
        assert_eq!(version, "22.9.0");
    }

    #[test]
    fn mise_toml_arrays_are_unsupported() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("mise.toml");
        fs::write(&file, "[tools]\nnode = [\"20\", \"22\"]\n").unwrap();

        let err = resolve_version(dir.path(), None, Some(&file)).unwrap_err();
        assert!(matches!(err, VersionError::UnsupportedConfig(..)));
    }

    #[test]
    fn nothing_found_is_not_found() {
        let dir = tempdir().unwrap();
        let err = resolve_version(dir.path(), None, None).unwrap_err();
        assert!(matches!(err, VersionError::NotFound(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join(".nvmrc");
        let err = resolve_version(dir.path(), None, Some(&missing)).unwrap_err();
        assert!(matches!(err, VersionError::FileMissing(_)));
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::archive;
use crate::cache::{CacheDescriptor, CacheResolver};
use crate::checksum;
use crate::download::{DownloadAuth, FileDownloader, ProxyConfig};
use crate::error::{ArchiveError, InstallError, ProcessError};
use crate::platform::Platform;
use crate::process::ProcessExecutor;

/// Sentinel version meaning "use the copy bundled with the host Node".
pub const PROVIDED_VERSION: &str = "provided";

pub const DEFAULT_NODE_DOWNLOAD_ROOT: &str = "https://nodejs.org/dist/";
pub const DEFAULT_NPM_DOWNLOAD_ROOT: &str = "https://registry.npmjs.org/npm/-/";
pub const DEFAULT_PNPM_DOWNLOAD_ROOT: &str = "https://registry.npmjs.org/pnpm/-/";
pub const DEFAULT_COREPACK_DOWNLOAD_ROOT: &str = "https://registry.npmjs.org/corepack/-/";
pub const DEFAULT_YARN_DOWNLOAD_ROOT: &str =
    "https://github.com/yarnpkg/yarn/releases/download/";
pub const DEFAULT_BUN_DOWNLOAD_ROOT: &str = "https://github.com/oven-sh/bun/releases/download/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Node,
    Npm,
    Yarn,
    Pnpm,
    Bun,
    Corepack,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Node => "node",
            Tool::Npm => "npm",
            Tool::Yarn => "yarn",
            Tool::Pnpm => "pnpm",
            Tool::Bun => "bun",
            Tool::Corepack => "corepack",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        match name {
            "node" => Some(Tool::Node),
            "npm" => Some(Tool::Npm),
            "yarn" => Some(Tool::Yarn),
            "pnpm" => Some(Tool::Pnpm),
            "bun" => Some(Tool::Bun),
            "corepack" => Some(Tool::Corepack),
            _ => None,
        }
    }

    pub fn default_download_root(&self) -> &'static str {
        match self {
            Tool::Node => DEFAULT_NODE_DOWNLOAD_ROOT,
            Tool::Npm => DEFAULT_NPM_DOWNLOAD_ROOT,
            Tool::Yarn => DEFAULT_YARN_DOWNLOAD_ROOT,
            Tool::Pnpm => DEFAULT_PNPM_DOWNLOAD_ROOT,
            Tool::Bun => DEFAULT_BUN_DOWNLOAD_ROOT,
            Tool::Corepack => DEFAULT_COREPACK_DOWNLOAD_ROOT,
        }
    }

    /// Entry point script inside `node_modules/<name>`, for the tools
    /// that are installed as node modules and launched through node.
    fn module_entrypoint(&self) -> Option<&'static str> {
        match self {
            Tool::Npm => Some("bin/npm-cli.js"),
            Tool::Pnpm => Some("bin/pnpm.cjs"),
            Tool::Corepack => Some("dist/corepack.js"),
            _ => None,
        }
    }
}

/// Where things live on disk plus the platform to install for. Read-only;
/// shared by installers, the task runner and the CLI.
pub struct InstallConfig {
    pub install_directory: PathBuf,
    pub working_directory: PathBuf,
    pub platform: Platform,
    pub cache: Box<dyn CacheResolver>,
}

impl InstallConfig {
    pub fn new(
        install_directory: &Path,
        working_directory: &Path,
        platform: Platform,
        cache: Box<dyn CacheResolver>,
    ) -> InstallConfig {
        InstallConfig {
            install_directory: install_directory.to_path_buf(),
            working_directory: working_directory.to_path_buf(),
            platform,
            cache,
        }
    }

    /// `<install>/node`, home of the node binary, the launchers and the
    /// `node_modules` tree for npm/pnpm/corepack.
    pub fn node_install_directory(&self) -> PathBuf {
        self.install_directory.join("node")
    }

    pub fn node_path(&self) -> PathBuf {
        let file = if self.platform.is_windows() {
            "node.exe"
        } else {
            "node"
        };
        self.node_install_directory().join(file)
    }

    pub fn node_modules_directory(&self) -> PathBuf {
        self.node_install_directory().join("node_modules")
    }

    pub fn yarn_script_path(&self) -> PathBuf {
        let file = if self.platform.is_windows() {
            "yarn.js"
        } else {
            "yarn"
        };
        self.node_install_directory()
            .join("yarn")
            .join("dist")
            .join("bin")
            .join(file)
    }

    pub fn bun_path(&self) -> PathBuf {
        let file = if self.platform.is_windows() {
            "bun.exe"
        } else {
            "bun"
        };
        self.install_directory.join("bun").join(file)
    }

    /// Directories that go on the `PATH` of every spawned tool process.
    pub fn tool_directories(&self) -> Vec<PathBuf> {
        vec![
            self.node_install_directory(),
            self.node_install_directory()
                .join("yarn")
                .join("dist")
                .join("bin"),
            self.install_directory.join("bun"),
        ]
    }
}

// One guard per (tool, install directory): installs of different tools
// or into different directories proceed in parallel, double installs of
// the same tool into the same directory serialize.
static INSTALL_LOCKS: Lazy<Mutex<HashMap<(Tool, PathBuf), Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn installation_lock(tool: Tool, install_directory: &Path) -> Arc<Mutex<()>> {
    let mut locks = INSTALL_LOCKS.lock().unwrap_or_else(|p| p.into_inner());
    locks
        .entry((tool, install_directory.to_path_buf()))
        .or_default()
        .clone()
}

/// Makes one tool at one version present under the install directory,
/// downloading through the shared cache only when the probe says the
/// right version isn't there yet.
pub struct ToolInstaller<'a> {
    tool: Tool,
    version: String,
    config: &'a InstallConfig,
    download_root: String,
    auth: DownloadAuth,
    downloader: FileDownloader,
}

impl<'a> ToolInstaller<'a> {
    pub fn new(tool: Tool, version: &str, config: &'a InstallConfig) -> ToolInstaller<'a> {
        ToolInstaller {
            tool,
            version: version.to_string(),
            config,
            download_root: tool.default_download_root().to_string(),
            auth: DownloadAuth::none(),
            downloader: FileDownloader::new(ProxyConfig::default()),
        }
    }

    /// Mirror root override; must end with `/`.
    pub fn with_download_root(mut self, root: &str) -> ToolInstaller<'a> {
        self.download_root = root.to_string();
        self
    }

    pub fn with_auth(mut self, auth: DownloadAuth) -> ToolInstaller<'a> {
        self.auth = auth;
        self
    }

    pub fn with_downloader(mut self, downloader: FileDownloader) -> ToolInstaller<'a> {
        self.downloader = downloader;
        self
    }

    pub fn install(&self) -> Result<(), InstallError> {
        let lock = installation_lock(self.tool, &self.config.install_directory);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        if self.version == PROVIDED_VERSION {
            return self.check_provided();
        }
        if self.is_already_installed() {
            return Ok(());
        }

        info!("installing {} version {}", self.tool.name(), self.version);
        match self.tool {
            Tool::Node => self.install_node(),
            Tool::Yarn => self.install_yarn(),
            Tool::Bun => self.install_bun(),
            Tool::Npm | Tool::Pnpm | Tool::Corepack => self.install_node_module(),
        }
    }

    /// `provided` leans on the copy shipped inside the Node archive, so
    /// all there is to do is confirm that the host can actually provide it.
    fn check_provided(&self) -> Result<(), InstallError> {
        match self.tool {
            Tool::Npm => {
                let node_version = self.capture_version(&self.config.node_path()).map_err(|_| {
                    InstallError::Message(
                        "npm version is 'provided' but no local node installation was found"
                            .to_string(),
                    )
                })?;
                let major: u64 = node_version
                    .trim_start_matches('v')
                    .split('.')
                    .next()
                    .and_then(|m| m.parse().ok())
                    .unwrap_or(0);
                if major < 4 {
                    return Err(InstallError::Message(format!(
                        "npm version is 'provided' but Node didn't include npm prior to v4.0.0 \
                         (found node {node_version})"
                    )));
                }
                debug!("using the npm bundled with node {node_version}");
                Ok(())
            }
            Tool::Corepack => {
                let package_json = self
                    .config
                    .node_modules_directory()
                    .join("corepack")
                    .join("package.json");
                if !package_json.exists() {
                    return Err(InstallError::Message(
                        "corepack version is 'provided' but no corepack is bundled with the \
                         local node installation"
                            .to_string(),
                    ));
                }
                debug!("using the corepack bundled with the local node installation");
                Ok(())
            }
            _ => Err(InstallError::Message(format!(
                "version 'provided' is not supported for {}",
                self.tool.name()
            ))),
        }
    }

    fn is_already_installed(&self) -> bool {
        match self.tool {
            Tool::Node => self.binary_version_matches(&self.config.node_path()),
            Tool::Yarn => self.binary_version_matches(&self.config.yarn_script_path()),
            Tool::Bun => self.binary_version_matches(&self.config.bun_path()),
            Tool::Npm | Tool::Pnpm | Tool::Corepack => self.package_json_version_matches(),
        }
    }

    fn binary_version_matches(&self, binary: &Path) -> bool {
        if !binary.exists() {
            return false;
        }
        match self.capture_version(binary) {
            Ok(found) => {
                if self.version_matches(&found) {
                    info!("{} {} is already installed", self.tool.name(), found);
                    true
                } else {
                    info!(
                        "{} {} was installed, but version {} is needed",
                        self.tool.name(),
                        found,
                        self.version
                    );
                    false
                }
            }
            Err(cause) => {
                warn!(
                    "unable to determine the current {} version: {cause}",
                    self.tool.name()
                );
                false
            }
        }
    }

    fn package_json_version_matches(&self) -> bool {
        let package_json = self
            .config
            .node_modules_directory()
            .join(self.tool.name())
            .join("package.json");
        let Ok(contents) = fs::read_to_string(&package_json) else {
            return false;
        };
        let found = serde_json::from_str::<Value>(&contents)
            .ok()
            .and_then(|data| data.get("version").and_then(Value::as_str).map(str::to_string));
        match found {
            Some(found) if self.version_matches(&found) => {
                info!("{} {} is already installed", self.tool.name(), found);
                true
            }
            Some(found) => {
                info!(
                    "{} {} was installed, but version {} is needed",
                    self.tool.name(),
                    found,
                    self.version
                );
                false
            }
            None => {
                debug!(
                    "could not read the {} version from {}",
                    self.tool.name(),
                    package_json.display()
                );
                false
            }
        }
    }

    /// `node --version` answers `v22.9.0` while yarn and friends answer
    /// `1.22.22`, so both spellings of the wanted version are accepted.
    fn version_matches(&self, found: &str) -> bool {
        found == self.version || found == self.version.trim_start_matches('v')
    }

    fn capture_version(&self, binary: &Path) -> Result<String, ProcessError> {
        ProcessExecutor::new(
            &self.config.working_directory,
            vec![binary.display().to_string(), "--version".to_string()],
            self.config.platform,
            HashMap::new(),
        )
        .with_paths(self.config.tool_directories())
        .capture()
    }

    fn install_node(&self) -> Result<(), InstallError> {
        let platform = &self.config.platform;
        if !self.version.starts_with('v') {
            warn!("node version {} does not follow the 'v' naming convention", self.version);
        }

        let download_url = format!(
            "{}{}",
            self.download_root,
            platform.node_download_path(&self.version)
        );
        let descriptor = CacheDescriptor::with_classifier(
            "node",
            &self.version,
            &platform.node_classifier(),
            platform.archive_extension(),
        );
        let archive_path = self.config.cache.resolve(&descriptor);
        self.download_if_missing(&download_url, &archive_path)?;
        self.verify_node_archive(&archive_path)?;

        let scratch = self.scratch_directory()?;
        self.extract_archive(&archive_path, scratch.path())?;

        let long_name = platform.long_node_filename(&self.version);
        let binary = if platform.is_windows() {
            scratch.path().join(&long_name).join("node.exe")
        } else {
            scratch.path().join(&long_name).join("bin").join("node")
        };
        if !binary.exists() {
            return Err(InstallError::BinaryNotFound {
                tool: "node",
                path: binary,
            });
        }

        let node_directory = self.config.node_install_directory();
        fs::create_dir_all(&node_directory).map_err(|e| self.io_error(e))?;

        let destination = self.config.node_path();
        info!(
            "copying the node binary from {} to {}",
            binary.display(),
            destination.display()
        );
        if destination.exists() {
            fs::remove_file(&destination).map_err(|e| self.io_error(e))?;
        }
        fs::rename(&binary, &destination).map_err(|e| self.io_error(e))?;
        make_executable(&destination).map_err(|e| self.io_error(e))?;

        // The archive ships npm (and corepack on recent lines) under
        // lib/node_modules; keeping it makes the 'provided' versions work.
        let bundled_modules = if platform.is_windows() {
            scratch.path().join(&long_name).join("node_modules")
        } else {
            scratch
                .path()
                .join(&long_name)
                .join("lib")
                .join("node_modules")
        };
        if bundled_modules.exists() {
            debug!("keeping the node_modules bundled with node");
            copy_directory(&bundled_modules, &self.config.node_modules_directory())
                .map_err(|e| self.io_error(e))?;
            for script in ["npm", "npm.cmd", "npx", "npx.cmd"] {
                let script_path = self
                    .config
                    .node_modules_directory()
                    .join("npm")
                    .join("bin")
                    .join(script);
                if script_path.exists() {
                    let _ = make_executable(&script_path);
                }
            }
        }

        info!("installed node locally");
        Ok(())
    }

    /// npm, pnpm and corepack all arrive as registry tarballs with a
    /// `package/` root that gets renamed into `node_modules/<name>`.
    fn install_node_module(&self) -> Result<(), InstallError> {
        let name = self.tool.name();
        let clean_version = self.version.trim_start_matches('v');
        let download_url = format!("{}{name}-{clean_version}.tgz", self.download_root);

        let descriptor = CacheDescriptor::new(name, clean_version, "tar.gz");
        let archive_path = self.config.cache.resolve(&descriptor);
        self.download_if_missing(&download_url, &archive_path)?;

        let node_modules = self.config.node_modules_directory();
        fs::create_dir_all(&node_modules).map_err(|e| self.io_error(e))?;

        // Clear out any previous version so stale files can't survive the
        // upgrade and the package directory rename below can't collide.
        let module_directory = node_modules.join(name);
        if module_directory.is_dir() {
            if let Err(cause) = fs::remove_dir_all(&module_directory) {
                warn!("failed to delete the existing {name} installation: {cause}");
            }
        }

        let package_directory = node_modules.join("package");
        if let Err(error) = self.extract_archive(&archive_path, &node_modules) {
            if package_directory.exists() {
                let _ = fs::remove_dir_all(&package_directory);
            }
            return Err(error);
        }

        if package_directory.exists() && !module_directory.exists() {
            fs::rename(&package_directory, &module_directory).map_err(|e| self.io_error(e))?;
        }

        let entrypoint = module_directory.join(
            self.tool
                .module_entrypoint()
                .expect("node modules have an entry point"),
        );
        if !entrypoint.exists() {
            return Err(InstallError::BinaryNotFound {
                tool: name,
                path: entrypoint,
            });
        }
        self.link_launcher(name, &entrypoint)?;

        info!("installed {name} locally");
        Ok(())
    }

    fn install_yarn(&self) -> Result<(), InstallError> {
        let download_url = format!(
            "{root}{v}/yarn-{v}.tar.gz",
            root = self.download_root,
            v = self.version
        );
        let descriptor = CacheDescriptor::new("yarn", &self.version, "tar.gz");
        let archive_path = self.config.cache.resolve(&descriptor);
        self.download_if_missing(&download_url, &archive_path)?;

        let yarn_directory = self.config.node_install_directory().join("yarn");
        if yarn_directory.is_dir() {
            if let Err(cause) = fs::remove_dir_all(&yarn_directory) {
                warn!("failed to delete the existing yarn installation: {cause}");
            }
        }
        fs::create_dir_all(&yarn_directory).map_err(|e| self.io_error(e))?;

        if let Err(error) = self.extract_archive(&archive_path, &yarn_directory) {
            let _ = fs::remove_dir_all(&yarn_directory);
            return Err(error);
        }

        // Yarn 1.x archives have a yarn-vX.Y.Z root instead of dist/.
        let dist = yarn_directory.join("dist");
        if !dist.exists() {
            let versioned = yarn_directory.join(format!("yarn-{}", self.version));
            if versioned.is_dir() {
                fs::rename(&versioned, &dist).map_err(|e| self.io_error(e))?;
            } else {
                return Err(InstallError::BinaryNotFound {
                    tool: "yarn",
                    path: dist,
                });
            }
        }

        // Yarn keeps living under its dist directory; that directory is
        // on the PATH of spawned processes instead of a launcher link,
        // which would collide with the yarn directory itself.
        let script = self.config.yarn_script_path();
        if !script.exists() {
            return Err(InstallError::BinaryNotFound {
                tool: "yarn",
                path: script,
            });
        }
        make_executable(&script).map_err(|e| self.io_error(e))?;

        info!("installed yarn locally");
        Ok(())
    }

    fn install_bun(&self) -> Result<(), InstallError> {
        let platform = &self.config.platform;
        if !self.version.starts_with('v') {
            warn!("bun version {} does not follow the 'v' naming convention", self.version);
        }
        let classifier = platform.bun_classifier();
        let download_url = format!(
            "{root}bun-{v}/bun-{classifier}.zip",
            root = self.download_root,
            v = self.version
        );
        let descriptor = CacheDescriptor::with_classifier("bun", &self.version, &classifier, "zip");
        let archive_path = self.config.cache.resolve(&descriptor);
        self.download_if_missing(&download_url, &archive_path)?;

        let scratch = self.scratch_directory()?;
        self.extract_archive(&archive_path, scratch.path())?;

        let file = if platform.is_windows() { "bun.exe" } else { "bun" };
        let binary = scratch.path().join(format!("bun-{classifier}")).join(file);
        if !binary.exists() {
            return Err(InstallError::BinaryNotFound {
                tool: "bun",
                path: binary,
            });
        }

        let destination = self.config.bun_path();
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        info!(
            "copying the bun binary from {} to {}",
            binary.display(),
            destination.display()
        );
        if destination.exists() {
            fs::remove_file(&destination).map_err(|e| self.io_error(e))?;
        }
        fs::rename(&binary, &destination).map_err(|e| self.io_error(e))?;
        make_executable(&destination).map_err(|e| self.io_error(e))?;

        info!("installed bun locally");
        Ok(())
    }

    fn download_if_missing(&self, url: &str, destination: &Path) -> Result<(), InstallError> {
        if destination.exists() {
            debug!("reusing the cached archive {}", destination.display());
            return Ok(());
        }
        info!("downloading {url} to {}", destination.display());
        self.downloader
            .download(url, destination, &self.auth)
            .map_err(|source| InstallError::Download {
                tool: self.tool.name(),
                source,
            })
    }

    /// Node publishes a SHASUMS256.txt next to every release; the cached
    /// archive has to match it before it is extracted. A mismatched file
    /// is deleted so the next run downloads from scratch.
    fn verify_node_archive(&self, archive_path: &Path) -> Result<(), InstallError> {
        let manifest_url = format!("{}{}/SHASUMS256.txt", self.download_root, self.version);
        let manifest_file = tempfile::NamedTempFile::new().map_err(|e| self.io_error(e))?;
        self.downloader
            .download(&manifest_url, manifest_file.path(), &self.auth)
            .map_err(|source| InstallError::Download {
                tool: "node",
                source,
            })?;
        let manifest =
            fs::read_to_string(manifest_file.path()).map_err(|e| self.io_error(e))?;

        let valid = checksum::is_checksum_valid(archive_path, &manifest).map_err(|source| {
            InstallError::Checksum {
                tool: "node",
                source,
            }
        })?;
        if !valid {
            error!(
                "the checksum of {} does not match SHASUMS256.txt, deleting it",
                archive_path.display()
            );
            let _ = fs::remove_file(archive_path);
            return Err(InstallError::ChecksumMismatch(archive_path.to_path_buf()));
        }
        debug!("checksum of {} verified", archive_path.display());
        Ok(())
    }

    fn extract_archive(&self, archive_path: &Path, destination: &Path) -> Result<(), InstallError> {
        info!(
            "unpacking {} into {}",
            archive_path.display(),
            destination.display()
        );
        archive::extract(archive_path, destination).map_err(|source| {
            if matches!(source, ArchiveError::Corrupt(_)) {
                // Most likely an interrupted download: evict it so the
                // next run starts clean instead of failing forever.
                error!(
                    "the archive file {} is corrupted and will be deleted, please try again",
                    archive_path.display()
                );
                let _ = fs::remove_file(archive_path);
            }
            InstallError::Extract {
                tool: self.tool.name(),
                source,
            }
        })
    }

    /// Scratch space inside the install directory, so the final rename
    /// never crosses a filesystem boundary. Cleaned up on drop.
    fn scratch_directory(&self) -> Result<tempfile::TempDir, InstallError> {
        fs::create_dir_all(&self.config.install_directory).map_err(|e| self.io_error(e))?;
        tempfile::TempDir::with_prefix_in("unpack-", &self.config.install_directory)
            .map_err(|e| self.io_error(e))
    }

    /// Puts a `<name>` launcher next to the node binary: a symlink on
    /// POSIX, a `.cmd` proxy script running the entry point through the
    /// local node on Windows.
    fn link_launcher(&self, name: &str, entrypoint: &Path) -> Result<(), InstallError> {
        let node_directory = self.config.node_install_directory();
        make_executable(entrypoint).map_err(|e| self.io_error(e))?;

        if self.config.platform.is_windows() {
            let launcher = node_directory.join(format!("{name}.cmd"));
            if launcher.exists() {
                info!("existing {name} launcher found, skipping linking");
                return Ok(());
            }
            let relative_node = relative_to(&self.config.node_path(), &node_directory);
            let relative_entry = relative_to(entrypoint, &node_directory);
            let script = format!(
                ":: Generated launcher, please don't edit manually.\r\n\
                 @ECHO OFF\r\n\
                 \r\n\
                 SETLOCAL\r\n\
                 \r\n\
                 SET \"NODE_EXE=%~dp0\\{relative_node}\"\r\n\
                 SET \"ENTRY_JS=%~dp0\\{relative_entry}\"\r\n\
                 \r\n\
                 \"%NODE_EXE%\" \"%ENTRY_JS%\" %*"
            );
            fs::write(&launcher, script).map_err(|e| self.io_error(e))?;
        } else {
            let launcher = node_directory.join(name);
            if launcher.exists() {
                info!("existing {name} launcher found, skipping linking");
                return Ok(());
            }
            info!(
                "creating a {name} launcher pointing at {}",
                entrypoint.display()
            );
            symlink(entrypoint, &launcher).map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> InstallError {
        InstallError::Io {
            tool: self.tool.name(),
            source,
        }
    }
}

fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
        .replace('/', "\\")
}

fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    fs::copy(original, link).map(|_| ())
}

fn copy_directory(source: &Path, destination: &Path) -> std::io::Result<()> {
    for entry in walkdir::WalkDir::new(source) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(std::io::Error::other)?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

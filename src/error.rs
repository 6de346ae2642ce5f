use std::path::PathBuf;

/// A download failed. No retry is attempted; callers decide whether that
/// fails the whole build.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("got status {status} from the server for {url}: {snippet}")]
    BadStatus {
        url: String,
        status: u16,
        snippet: String,
    },
    #[error("invalid download URL '{url}': {reason}")]
    BadUrl { url: String, reason: String },
    #[error("could not download {url}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not download {url}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive ended before its structure said it would. Installers
    /// delete the cached file so the next run re-downloads from scratch.
    #[error("archive {0} is truncated or corrupt")]
    Corrupt(PathBuf),
    /// An entry tried to escape the destination directory.
    #[error("archive entry '{entry}' would be extracted outside of {destination}")]
    Traversal { entry: String, destination: PathBuf },
    #[error("don't know how to extract '{0}'")]
    Unsupported(PathBuf),
    #[error("MSI extraction is only supported on Windows")]
    MsiUnsupportedPlatform,
    #[error("msiexec failed with exit code {0:?}")]
    MsiFailed(Option<i32>),
    #[error("could not extract archive {archive}")]
    Io {
        archive: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("no entry for '{0}' in the checksum manifest")]
    MissingEntry(String),
    #[error("checksum manifest entry for '{file}' is not valid hex")]
    BadHex {
        file: String,
        #[source]
        source: hex::FromHexError,
    },
    #[error("could not read {0} while checksumming")]
    Io(PathBuf, #[source] std::io::Error),
}

/// Wraps everything that can go wrong while ensuring a tool is present.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("could not download {tool}")]
    Download {
        tool: &'static str,
        #[source]
        source: DownloadError,
    },
    #[error("could not extract the {tool} archive")]
    Extract {
        tool: &'static str,
        #[source]
        source: ArchiveError,
    },
    #[error("checksum verification failed for {0}")]
    ChecksumMismatch(PathBuf),
    #[error("could not verify the {tool} archive")]
    Checksum {
        tool: &'static str,
        #[source]
        source: ChecksumError,
    },
    #[error("could not find the downloaded {tool} binary in {path}")]
    BinaryNotFound { tool: &'static str, path: PathBuf },
    #[error("{0}")]
    Message(String),
    #[error("could not install {tool}")]
    Io {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Non-zero exit or spawn failure in capture mode.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("'{command}' failed with exit code {exit_code:?}: {output}")]
    NonZeroExit {
        command: String,
        exit_code: Option<i32>,
        /// Merged stdout + stderr.
        output: String,
    },
    #[error("could not run '{command}'")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Raised by the task layer; the process layer itself hands the raw exit
/// code back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum TaskRunnerError {
    #[error("task '{0}' is not supported")]
    UnknownTask(String),
    #[error("could not find {} — is the {task} package installed?", path.display())]
    ScriptMissing { task: String, path: PathBuf },
    #[error("'{command}' failed with exit code {exit_code}")]
    NonZeroExit { command: String, exit_code: i32 },
    #[error("could not run '{command}'")]
    Process {
        command: String,
        #[source]
        source: ProcessError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("no tool version was configured and no version file was found under {0}")]
    NotFound(PathBuf),
    #[error("the version file doesn't seem to exist: {0}")]
    FileMissing(PathBuf),
    /// Raised for mise files using array syntax; support is limited to a
    /// single pinned version.
    #[error("version file {0} is not supported: {1}")]
    UnsupportedConfig(PathBuf, String),
    #[error("could not read {0}")]
    Io(PathBuf, #[source] std::io::Error),
}

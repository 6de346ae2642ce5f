use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// Directory the tools get installed into. Defaults to `.nodekit`
    /// inside the working directory
    #[clap(long, global = true)]
    pub install_directory: Option<PathBuf>,

    /// Project directory. Defaults to the current directory
    #[clap(long, global = true)]
    pub working_directory: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: NodekitCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum NodekitCommand {
    /// Install a tool locally: <name>@<version>, where name is one of
    /// node, npm, yarn, pnpm, bun, corepack
    Install {
        tool_at_version: String,
        /// Download from this mirror root instead of the default
        /// (must end with '/')
        #[clap(long)]
        download_root: Option<String>,
    },
    /// Print the node version the project pins (via `.nvmrc`,
    /// `.node-version`, `.tool-versions` or mise configuration)
    ResolveVersion {
        /// Read this version file instead of searching upward
        #[clap(long)]
        version_file: Option<PathBuf>,
    },
    /// Run a build task (webpack, gulp, ...) from the project's
    /// `node_modules` through the locally installed node
    Run {
        task: String,
        /// Raw argument string handed to the task; quotes group words
        #[clap(long)]
        args: Option<String>,
        /// Skip the run when nothing changed since the last success
        #[clap(long)]
        incremental: bool,
    },
    /// Print where a tool is installed, if it is
    Which { tool: String },
}

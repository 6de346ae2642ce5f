use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

use nodekit::cache::{default_cache_dir, DirectoryCacheResolver};
use nodekit::digest::IncrementalBuildGate;
use nodekit::install::{InstallConfig, Tool, ToolInstaller};
use nodekit::platform::Platform;
use nodekit::process::ProcessExecutor;
use nodekit::task::run_task;
use nodekit::version::{normalize_version, resolve_version, validate_version};

use crate::cli::{NodekitCommand, CLI};

pub fn execute(cli: CLI) -> Result<()> {
    let working_directory = match &cli.working_directory {
        Some(directory) => directory.clone(),
        None => std::env::current_dir()?,
    };
    let install_directory = cli
        .install_directory
        .clone()
        .unwrap_or_else(|| working_directory.join(".nodekit"));
    let config = install_config(&install_directory, &working_directory)?;

    match cli.command {
        NodekitCommand::Install {
            tool_at_version,
            download_root,
        } => execute_install(&config, &tool_at_version, download_root.as_deref()),
        NodekitCommand::ResolveVersion { version_file } => {
            execute_resolve_version(&config, version_file.as_deref())
        }
        NodekitCommand::Run {
            task,
            args,
            incremental,
        } => execute_run(&config, &task, args.as_deref(), incremental),
        NodekitCommand::Which { tool } => execute_which(&config, &tool),
    }
}

fn install_config(install_directory: &Path, working_directory: &Path) -> Result<InstallConfig> {
    let cache_directory = default_cache_dir()?;
    Ok(InstallConfig::new(
        install_directory,
        working_directory,
        Platform::host(),
        Box::new(DirectoryCacheResolver::new(cache_directory)),
    ))
}

fn extract_tool_at_version(tool_at_version: &str) -> Result<(Tool, String)> {
    let (name, version) = tool_at_version
        .split_once('@')
        .ok_or_else(|| anyhow!("expected <tool>@<version>, e.g. node@v22.9.0"))?;
    let tool = Tool::from_name(name).ok_or_else(|| anyhow!("unknown tool '{name}'"))?;
    if version.is_empty() {
        bail!("expected <tool>@<version>, e.g. node@v22.9.0");
    }
    Ok((tool, version.to_string()))
}

pub fn execute_install(
    config: &InstallConfig,
    tool_at_version: &str,
    download_root: Option<&str>,
) -> Result<()> {
    let (tool, version) = extract_tool_at_version(tool_at_version)?;

    // Node versions may be aliases or bare majors; pin them down before
    // building download URLs. Other tools take their version literally.
    let version = if tool == Tool::Node {
        if !validate_version(&version) {
            bail!("'{version}' is not a valid node version");
        }
        normalize_version(&version)
    } else {
        version
    };

    let mut installer = ToolInstaller::new(tool, &version, config);
    if let Some(root) = download_root {
        installer = installer.with_download_root(root);
    }
    installer
        .install()
        .with_context(|| format!("could not install {}", tool.name()))
}

pub fn execute_resolve_version(config: &InstallConfig, version_file: Option<&Path>) -> Result<()> {
    let version = resolve_version(&config.working_directory, None, version_file)?;
    println!("{}", normalize_version(&version));
    Ok(())
}

pub fn execute_run(
    config: &InstallConfig,
    task: &str,
    raw_arguments: Option<&str>,
    incremental: bool,
) -> Result<()> {
    if !incremental {
        run_task(config, task, raw_arguments, HashMap::new())?;
        return Ok(());
    }

    let gate = IncrementalBuildGate::new(
        task,
        &config.working_directory.join("target"),
        &config.working_directory,
    );
    let tool_versions = probe_tool_versions(config);
    if !gate.should_execute(
        raw_arguments.unwrap_or_default(),
        &tool_versions,
        &BTreeMap::new(),
    ) {
        info!("skipping {task}, nothing changed since the last successful run");
        return Ok(());
    }
    run_task(config, task, raw_arguments, HashMap::new())?;
    gate.accept();
    Ok(())
}

/// Best effort: a tool that isn't installed or won't answer simply stays
/// out of the digest.
fn probe_tool_versions(config: &InstallConfig) -> BTreeMap<String, String> {
    let mut versions = BTreeMap::new();
    for (name, binary) in [
        ("node", config.node_path()),
        ("bun", config.bun_path()),
        ("yarn", config.yarn_script_path()),
    ] {
        if !binary.exists() {
            continue;
        }
        let probe = ProcessExecutor::new(
            &config.working_directory,
            vec![binary.display().to_string(), "--version".to_string()],
            config.platform,
            HashMap::new(),
        )
        .with_paths(config.tool_directories())
        .capture();
        if let Ok(version) = probe {
            versions.insert(name.to_string(), version);
        }
    }
    versions
}

pub fn execute_which(config: &InstallConfig, name: &str) -> Result<()> {
    let tool = Tool::from_name(name).ok_or_else(|| anyhow!("unknown tool '{name}'"))?;
    let path = tool_path(config, tool);
    if path.exists() {
        println!("{}", path.display());
    } else {
        println!(
            "{name} is not installed under {}",
            config.install_directory.display()
        );
    }
    Ok(())
}

fn tool_path(config: &InstallConfig, tool: Tool) -> PathBuf {
    match tool {
        Tool::Node => config.node_path(),
        Tool::Bun => config.bun_path(),
        Tool::Yarn => config.yarn_script_path(),
        Tool::Npm | Tool::Pnpm | Tool::Corepack => {
            let file = if config.platform.is_windows() {
                format!("{}.cmd", tool.name())
            } else {
                tool.name().to_string()
            };
            config.node_install_directory().join(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodekit::install::PROVIDED_VERSION;

    #[test]
    fn tool_at_version_splits_on_the_at_sign() {
        let (tool, version) = extract_tool_at_version("node@v22.9.0").unwrap();
        assert_eq!(tool, Tool::Node);
        assert_eq!(version, "v22.9.0");

        let (tool, version) = extract_tool_at_version("npm@provided").unwrap();
        assert_eq!(tool, Tool::Npm);
        assert_eq!(version, PROVIDED_VERSION);

        assert!(extract_tool_at_version("node").is_err());
        assert!(extract_tool_at_version("node@").is_err());
        assert!(extract_tool_at_version("deno@v1.0.0").is_err());
    }
}

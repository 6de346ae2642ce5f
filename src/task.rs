use std::collections::HashMap;
use std::path::PathBuf;

use tracing::info;

use crate::args::parse_arguments;
use crate::error::{ProcessError, TaskRunnerError};
use crate::install::InstallConfig;
use crate::process::ProcessExecutor;

/// Build tools that can be launched through the local node, keyed by task
/// name, valued by the entry script relative to `node_modules`.
const TASK_SCRIPTS: &[(&str, &str)] = &[
    ("webpack", "webpack/bin/webpack.js"),
    (
        "webpack-dev-server",
        "webpack-dev-server/bin/webpack-dev-server.js",
    ),
    ("gulp", "gulp/bin/gulp.js"),
    ("grunt", "grunt-cli/bin/grunt"),
    ("karma", "karma/bin/karma"),
    ("bower", "bower/bin/bower"),
    ("ember", "ember-cli/bin/ember"),
    ("jspm", "jspm/jspm.js"),
];

pub fn task_script(task: &str) -> Option<&'static str> {
    TASK_SCRIPTS
        .iter()
        .find(|(name, _)| *name == task)
        .map(|(_, script)| *script)
}

pub fn known_tasks() -> impl Iterator<Item = &'static str> {
    TASK_SCRIPTS.iter().map(|(name, _)| *name)
}

/// Runs a build task from the project's own `node_modules` through the
/// locally installed node, streaming its output into the log.
pub fn run_task(
    config: &InstallConfig,
    task: &str,
    raw_arguments: Option<&str>,
    env: HashMap<String, String>,
) -> Result<(), TaskRunnerError> {
    let script = task_script(task).ok_or_else(|| TaskRunnerError::UnknownTask(task.to_string()))?;
    let script_path: PathBuf = config.working_directory.join("node_modules").join(script);
    if !script_path.exists() {
        return Err(TaskRunnerError::ScriptMissing {
            task: task.to_string(),
            path: script_path,
        });
    }

    let mut command = vec![
        config.node_path().display().to_string(),
        script_path.display().to_string(),
    ];
    command.extend(parse_arguments(raw_arguments, &[]));
    let command_display = format!("{task} {}", raw_arguments.unwrap_or_default())
        .trim()
        .to_string();

    info!("running {command_display}");
    let exit_code = ProcessExecutor::new(&config.working_directory, command, config.platform, env)
        .with_paths(config.tool_directories())
        .stream()
        .map_err(|source| process_error(&command_display, source))?;

    if exit_code == 0 {
        Ok(())
    } else {
        Err(TaskRunnerError::NonZeroExit {
            command: command_display,
            exit_code,
        })
    }
}

fn process_error(command: &str, source: ProcessError) -> TaskRunnerError {
    TaskRunnerError::Process {
        command: command.to_string(),
        source,
    }
}

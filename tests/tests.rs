use std::collections::{BTreeMap, HashMap};
use std::fs;

use tempfile::TempDir;

use nodekit::cache::DirectoryCacheResolver;
use nodekit::digest::IncrementalBuildGate;
use nodekit::install::{InstallConfig, Tool, ToolInstaller};
use nodekit::platform::Platform;
use nodekit::version::{normalize_version, resolve_version};

/// A project directory plus a fake `file://` registry holding module
/// tarballs, so installs run without any network access.
struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Fixture {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("project")).unwrap();
        fs::create_dir_all(root.path().join("registry")).unwrap();
        Fixture { root }
    }

    fn config(&self) -> InstallConfig {
        InstallConfig::new(
            &self.root.path().join("tools"),
            &self.root.path().join("project"),
            Platform::host(),
            Box::new(DirectoryCacheResolver::new(self.root.path().join("cache"))),
        )
    }

    fn registry_root(&self) -> String {
        format!(
            "{}/",
            url::Url::from_file_path(self.root.path().join("registry")).unwrap()
        )
    }

    fn publish_module(&self, name: &str, version: &str, entrypoint: &str) {
        let path = self
            .root
            .path()
            .join("registry")
            .join(format!("{name}-{version}.tgz"));
        let file = fs::File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let manifest = format!(r#"{{"name":"{name}","version":"{version}"}}"#);
        for (entry_name, contents) in [
            ("package/package.json".to_string(), manifest.as_str()),
            (format!("package/{entrypoint}"), "#!/usr/bin/env node\n"),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, entry_name, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }
}

#[cfg(unix)]
fn install_fake_node(config: &InstallConfig, script: &str) {
    use std::os::unix::fs::PermissionsExt;
    let node = config.node_path();
    fs::create_dir_all(node.parent().unwrap()).unwrap();
    fs::write(&node, script).unwrap();
    fs::set_permissions(&node, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
#[cfg(unix)]
fn installs_coexisting_node_modules() {
    let fixture = Fixture::new();
    fixture.publish_module("npm", "9.0.0", "bin/npm-cli.js");
    fixture.publish_module("pnpm", "8.6.0", "bin/pnpm.cjs");

    let config = fixture.config();
    let root = fixture.registry_root();
    ToolInstaller::new(Tool::Npm, "v9.0.0", &config)
        .with_download_root(&root)
        .install()
        .unwrap();
    ToolInstaller::new(Tool::Pnpm, "v8.6.0", &config)
        .with_download_root(&root)
        .install()
        .unwrap();

    // both live side by side in the shared node_modules tree
    let node_modules = config.node_modules_directory();
    assert!(node_modules.join("npm/package.json").exists());
    assert!(node_modules.join("pnpm/package.json").exists());

    // both launchers sit next to where node would be
    assert!(config.node_install_directory().join("npm").exists());
    assert!(config.node_install_directory().join("pnpm").exists());
}

#[test]
#[cfg(unix)]
fn second_install_is_served_from_the_cache() {
    let fixture = Fixture::new();
    fixture.publish_module("npm", "9.0.0", "bin/npm-cli.js");
    let root = fixture.registry_root();

    let first = fixture.config();
    ToolInstaller::new(Tool::Npm, "v9.0.0", &first)
        .with_download_root(&root)
        .install()
        .unwrap();

    // the registry disappears; a second install into a fresh directory
    // must come out of the shared cache
    fs::remove_dir_all(fixture.root.path().join("registry")).unwrap();

    let elsewhere = InstallConfig::new(
        &fixture.root.path().join("other-tools"),
        &fixture.root.path().join("project"),
        Platform::host(),
        Box::new(DirectoryCacheResolver::new(fixture.root.path().join("cache"))),
    );
    ToolInstaller::new(Tool::Npm, "v9.0.0", &elsewhere)
        .with_download_root(&root)
        .install()
        .unwrap();
    assert!(elsewhere
        .node_modules_directory()
        .join("npm/package.json")
        .exists());
}

#[test]
#[cfg(unix)]
fn incremental_run_skips_until_something_changes() {
    let fixture = Fixture::new();
    let config = fixture.config();
    install_fake_node(&config, "#!/bin/sh\nexit 0\n");

    let project = &config.working_directory;
    let gulp = project.join("node_modules/gulp/bin/gulp.js");
    fs::create_dir_all(gulp.parent().unwrap()).unwrap();
    fs::write(&gulp, "// cli\n").unwrap();
    fs::write(project.join("app.js"), "console.log(1)\n").unwrap();

    let gate = IncrementalBuildGate::new("gulp", &project.join("target"), project);
    let no_env = BTreeMap::new();

    // first run: no baseline yet
    assert!(gate.should_execute("build", &no_env, &no_env));
    nodekit::task::run_task(&config, "gulp", Some("build"), HashMap::new()).unwrap();
    gate.accept();

    // nothing changed: skip
    assert!(!gate.should_execute("build", &no_env, &no_env));

    // a source edit invalidates the baseline
    fs::write(project.join("app.js"), "console.log(2)\n").unwrap();
    assert!(gate.should_execute("build", &no_env, &no_env));
}

#[test]
fn pinned_version_resolves_and_normalizes_from_a_nested_directory() {
    let project = TempDir::new().unwrap();
    fs::write(project.path().join(".nvmrc"), "18.20.4 # pinned\n").unwrap();
    let nested = project.path().join("packages").join("app");
    fs::create_dir_all(&nested).unwrap();

    let version = resolve_version(&nested, None, None).unwrap();
    assert_eq!(version, "18.20.4");
    assert_eq!(normalize_version(&version), "v18.20.4");
}

#[test]
fn extraction_refuses_to_leave_the_destination() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("evil.tar.gz");
    {
        let file = fs::File::create(&archive).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let contents = b"pwned";
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        // append_data refuses `..`, so the name bytes go in directly
        let name = b"../outside.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_cksum();
        builder.append(&header, &contents[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    let destination = dir.path().join("unpack");
    fs::create_dir_all(&destination).unwrap();
    let error = nodekit::archive::extract(&archive, &destination).unwrap_err();
    assert!(matches!(
        error,
        nodekit::error::ArchiveError::Traversal { .. }
    ));
    assert!(!dir.path().join("outside.txt").exists());
}

#[test]
fn cache_paths_are_stable_and_collision_free() {
    let dir = TempDir::new().unwrap();
    let resolver = DirectoryCacheResolver::new(dir.path());
    let descriptor =
        nodekit::cache::CacheDescriptor::with_classifier("node", "v22.9.0", "linux-x64", "tar.gz");

    use nodekit::cache::CacheResolver;
    let path = resolver.resolve(&descriptor);
    assert_eq!(path, resolver.resolve(&descriptor));
    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        "node-v22.9.0-linux-x64.tar.gz"
    );

    let other =
        nodekit::cache::CacheDescriptor::with_classifier("node", "v22.9.0", "darwin-arm64", "tar.gz");
    assert_ne!(path, resolver.resolve(&other));
}

use once_cell::sync::Lazy;

/// Operating systems Node.js publishes binaries for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Windows,
    Mac,
    Linux,
    SunOs,
}

impl Os {
    pub fn guess() -> Os {
        match std::env::consts::OS {
            "windows" => Os::Windows,
            "macos" => Os::Mac,
            "solaris" | "illumos" => Os::SunOs,
            _ => Os::Linux,
        }
    }

    /// Node ships zips for Windows and tarballs for everything else.
    pub fn archive_extension(&self) -> &'static str {
        match self {
            Os::Windows => "zip",
            _ => "tar.gz",
        }
    }

    /// The OS name as it appears in Node.js download file names.
    pub fn codename(&self) -> &'static str {
        match self {
            Os::Windows => "win",
            Os::Mac => "darwin",
            Os::SunOs => "sunos",
            Os::Linux => "linux",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X64,
    Ppc64le,
    S390x,
    Arm64,
}

impl Arch {
    pub fn guess() -> Arch {
        match std::env::consts::ARCH {
            "powerpc64" => Arch::Ppc64le,
            "aarch64" => Arch::Arm64,
            "s390x" => Arch::S390x,
            "x86" => Arch::X86,
            _ => Arch::X64,
        }
    }

    /// The architecture name as it appears in Node.js download file names.
    pub fn name(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x64",
            Arch::Ppc64le => "ppc64le",
            Arch::S390x => "s390x",
            Arch::Arm64 => "arm64",
        }
    }
}

/// The host platform, probed once per process and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
    /// Set on musl-based Linux (Alpine), where the glibc binaries from
    /// nodejs.org don't run and the unofficial musl builds are needed.
    pub musl: bool,
}

static HOST: Lazy<Platform> = Lazy::new(|| {
    let os = Os::guess();
    let musl = os == Os::Linux && is_musl_libc();
    Platform {
        os,
        arch: Arch::guess(),
        musl,
    }
});

fn is_musl_libc() -> bool {
    if cfg!(target_env = "musl") {
        return true;
    }
    if std::fs::read_to_string("/etc/os-release")
        .map(|contents| contents.to_lowercase().contains("alpine"))
        .unwrap_or(false)
    {
        return true;
    }
    // ldd names its own libc in the version banner
    std::process::Command::new("ldd")
        .arg("--version")
        .output()
        .map(|output| {
            let banner = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            banner.to_lowercase().contains("musl")
        })
        .unwrap_or(false)
}

impl Platform {
    /// The probe runs once; every later call returns the same value.
    pub fn host() -> Platform {
        *HOST
    }

    pub fn new(os: Os, arch: Arch) -> Platform {
        Platform {
            os,
            arch,
            musl: false,
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == Os::Windows
    }

    pub fn is_mac(&self) -> bool {
        self.os == Os::Mac
    }

    pub fn archive_extension(&self) -> &'static str {
        self.os.archive_extension()
    }

    /// Platform suffix used in Node artifact names, e.g. `linux-x64` or
    /// `linux-x64-musl`.
    pub fn node_classifier(&self) -> String {
        let base = format!("{}-{}", self.os.codename(), self.arch.name());
        if self.musl {
            format!("{base}-musl")
        } else {
            base
        }
    }

    /// Top-level directory name inside a Node release archive, e.g.
    /// `node-v22.9.0-linux-x64`.
    pub fn long_node_filename(&self, node_version: &str) -> String {
        format!("node-{}-{}", node_version, self.node_classifier())
    }

    /// Path of the release archive relative to the download root, e.g.
    /// `v22.9.0/node-v22.9.0-linux-x64.tar.gz`.
    pub fn node_download_path(&self, node_version: &str) -> String {
        format!(
            "{}/{}.{}",
            node_version,
            self.long_node_filename(node_version),
            self.archive_extension()
        )
    }

    /// Classifier used for Bun release archives, e.g. `linux-x64`.
    pub fn bun_classifier(&self) -> String {
        let os = match self.os {
            Os::Mac => "darwin",
            Os::Windows => "windows",
            _ => "linux",
        };
        let arch = match self.arch {
            Arch::Arm64 => "aarch64",
            _ => "x64",
        };
        format!("{os}-{arch}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_platform_is_stable() {
        assert_eq!(Platform::host(), Platform::host());
    }

    #[test]
    fn node_classifier_combines_os_and_arch() {
        let platform = Platform::new(Os::Linux, Arch::X64);
        assert_eq!(platform.node_classifier(), "linux-x64");

        let platform = Platform::new(Os::Mac, Arch::Arm64);
        assert_eq!(platform.node_classifier(), "darwin-arm64");
    }

    #[test]
    fn musl_platforms_get_a_suffix() {
        let platform = Platform {
            os: Os::Linux,
            arch: Arch::X64,
            musl: true,
        };
        assert_eq!(platform.node_classifier(), "linux-x64-musl");
    }

    #[test]
    fn node_download_path_matches_dist_layout() {
        let platform = Platform::new(Os::Linux, Arch::X64);
        assert_eq!(
            platform.node_download_path("v22.9.0"),
            "v22.9.0/node-v22.9.0-linux-x64.tar.gz"
        );

        let platform = Platform::new(Os::Windows, Arch::X64);
        assert_eq!(
            platform.node_download_path("v22.9.0"),
            "v22.9.0/node-v22.9.0-win-x64.zip"
        );
    }
}

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};
use url::Url;

use crate::error::DownloadError;

/// One configured proxy. Credentials are kept in dedicated fields and are
/// deliberately left out of the `Display` impl so a logged proxy never
/// leaks them.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub id: String,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Pipe-separated host patterns that bypass this proxy, `*` wildcards
    /// allowed, e.g. `localhost|*.internal.example.com`.
    pub non_proxy_hosts: Option<String>,
}

impl Proxy {
    pub fn uses_authentication(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// The proxy URL handed to the HTTP client, credentials included.
    fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() => {
                format!("{}://{}:{}@{}:{}", self.protocol, user, pass, self.host, self.port)
            }
            _ => format!("{}://{}:{}", self.protocol, self.host, self.port),
        }
    }

    fn is_non_proxy_host(&self, host: &str) -> bool {
        let Some(patterns) = &self.non_proxy_hosts else {
            return false;
        };
        patterns
            .split('|')
            .filter(|pattern| !pattern.is_empty())
            .any(|pattern| wildcard_matches(pattern, host))
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{protocol='{}', host='{}', port={}{}}}",
            self.id,
            self.protocol,
            self.host,
            self.port,
            if self.uses_authentication() {
                ", with username/password authentication"
            } else {
                ""
            }
        )
    }
}

fn wildcard_matches(pattern: &str, host: &str) -> bool {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$"))
        .map(|re| re.is_match(host))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub proxies: Vec<Proxy>,
}

impl ProxyConfig {
    pub fn new(proxies: Vec<Proxy>) -> ProxyConfig {
        ProxyConfig { proxies }
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// The first configured proxy whose non-proxy-host patterns do not
    /// match the destination host.
    pub fn proxy_for_url(&self, url: &Url) -> Option<&Proxy> {
        let host = url.host_str()?;
        self.proxies.iter().find(|proxy| !proxy.is_non_proxy_host(host))
    }
}

/// Username/password pair for HTTP Basic auth on the download server.
#[derive(Debug, Clone, Default)]
pub struct DownloadAuth {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DownloadAuth {
    pub fn none() -> DownloadAuth {
        DownloadAuth::default()
    }

    fn is_set(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Downloads URLs to files. Supports `file://` copies, Basic auth, extra
/// headers (bearer tokens) and proxy routing. There is no retry and no
/// timeout on the transfer itself; a stalled download stalls the build.
pub struct FileDownloader {
    proxy_config: ProxyConfig,
    headers: HashMap<String, String>,
    trust_all_certs: bool,
}

impl FileDownloader {
    pub fn new(proxy_config: ProxyConfig) -> FileDownloader {
        FileDownloader {
            proxy_config,
            headers: HashMap::new(),
            trust_all_certs: false,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> FileDownloader {
        self.headers = headers;
        self
    }

    /// Accept self-signed certificates. Off by default.
    pub fn with_trust_all_certs(mut self, trust: bool) -> FileDownloader {
        self.trust_all_certs = trust;
        self
    }

    pub fn download(
        &self,
        download_url: &str,
        destination: &Path,
        auth: &DownloadAuth,
    ) -> Result<(), DownloadError> {
        let fixed_url = download_url.replace('\\', "/");
        let url = Url::parse(&fixed_url).map_err(|e| DownloadError::BadUrl {
            url: fixed_url.clone(),
            reason: e.to_string(),
        })?;

        if url.scheme().eq_ignore_ascii_case("file") {
            let source = url.to_file_path().map_err(|_| DownloadError::BadUrl {
                url: fixed_url.clone(),
                reason: "not a valid file path".to_string(),
            })?;
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|e| io_error(&fixed_url, e))?;
            }
            fs::copy(&source, destination).map_err(|e| io_error(&fixed_url, e))?;
            return Ok(());
        }

        let client = self.build_client(&url)?;
        let mut request = client.get(url.clone());
        if auth.is_set() {
            info!(
                "using credentials ({}) for {}",
                auth.username.as_deref().unwrap_or_default(),
                url.host_str().unwrap_or_default()
            );
            request = request.basic_auth(
                auth.username.clone().unwrap_or_default(),
                auth.password.clone(),
            );
        }
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let mut response = request.send().map_err(|e| DownloadError::Http {
            url: fixed_url.clone(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            // Best-effort peek at the body so error reports aren't blind.
            let mut snippet = String::new();
            let _ = response
                .take(1024)
                .read_to_string(&mut snippet);
            return Err(DownloadError::BadStatus {
                url: fixed_url,
                status: status.as_u16(),
                snippet: snippet.trim().to_string(),
            });
        }

        // Write to a sibling temp file and rename into place so two
        // concurrent builds can't observe a half-written cache entry.
        let parent = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| std::env::temp_dir());
        fs::create_dir_all(&parent).map_err(|e| io_error(&fixed_url, e))?;
        let mut temp = tempfile::Builder::new()
            .suffix(".part")
            .tempfile_in(&parent)
            .map_err(|e| io_error(&fixed_url, e))?;
        std::io::copy(&mut response, temp.as_file_mut()).map_err(|e| io_error(&fixed_url, e))?;
        temp.persist(destination)
            .map_err(|e| io_error(&fixed_url, e.error))?;
        Ok(())
    }

    fn build_client(&self, url: &Url) -> Result<reqwest::blocking::Client, DownloadError> {
        let mut builder = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(self.trust_all_certs)
            // connect timeout only; the transfer itself is unbounded
            .connect_timeout(Duration::from_secs(60))
            .timeout(None);

        match self.proxy_config.proxy_for_url(url) {
            Some(proxy) => {
                info!("downloading via proxy {proxy}");
                let reqwest_proxy =
                    reqwest::Proxy::all(proxy.url()).map_err(|e| DownloadError::Http {
                        url: url.to_string(),
                        source: e,
                    })?;
                builder = builder.proxy(reqwest_proxy);
            }
            None => {
                debug!("no proxy was configured, downloading directly");
                builder = builder.no_proxy();
            }
        }

        builder.build().map_err(|e| DownloadError::Http {
            url: url.to_string(),
            source: e,
        })
    }
}

fn io_error(url: &str, source: std::io::Error) -> DownloadError {
    DownloadError::Io {
        url: url.to_string(),
        source,
    }
}

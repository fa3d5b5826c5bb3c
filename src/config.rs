use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use url::Url;

/// Environment variable overriding [`DispatchConfig::github_secret`].
pub const SECRET_ENV: &str = "GITHUB_WEBHOOK_SECRET";
/// Environment variable overriding [`DispatchConfig::sphinx_build`].
pub const SPHINXBUILD_ENV: &str = "SPHINXBUILD";

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Shared secret configured on the GitHub webhook, used to check payload signatures.
    #[serde(default)]
    pub github_secret: Option<String>,
    /// Repository (`owner/name`) whose pull requests are checked for documentation changes.
    pub github_repository: String,
    /// Root of the GitHub REST API.
    #[serde(default = "defaults::github_api_url")]
    pub github_api_url: Url,
    /// Optional token sent to the GitHub API, to get a higher rate limit.
    #[serde(default)]
    pub github_api_token: Option<String>,
    /// A changed file whose path contains this marker counts as a documentation change.
    #[serde(default = "defaults::docs_marker")]
    pub docs_marker: String,
    /// Sphinx source directory, relative to the repository root.
    #[serde(default = "defaults::docs_source")]
    pub docs_source: PathBuf,
    /// Where the repository is cloned. Wiped before every build.
    #[serde(default = "defaults::scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Parent directory of the `pr-<number>` output directories. Defaults to `scratch_dir`.
    #[serde(default)]
    pub output_root: Option<PathBuf>,
    /// Name or path of the `sphinx-build` executable.
    #[serde(default = "defaults::sphinx_build")]
    pub sphinx_build: String,
    /// Upper bound on a whole build, in seconds. Unbounded if absent.
    #[serde(default)]
    pub build_timeout_secs: Option<u64>,
}

impl DispatchConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config_file =
            File::open(path).with_context(|| format!("couldn't open {}:", path.display()))?;
        serde_yaml::from_reader(BufReader::new(config_file)).context("couldn't parse config file")
    }

    /// Applies the process environment on top of the file configuration. `lookup` is usually
    /// `std::env::var(..).ok()`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(SECRET_ENV) {
            self.github_secret = Some(secret);
        }
        if let Some(sphinx_build) = lookup(SPHINXBUILD_ENV) {
            self.sphinx_build = sphinx_build;
        }
    }

    pub fn secret(&self) -> anyhow::Result<&str> {
        self.github_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "no webhook secret configured, set `github_secret` or {}",
                    SECRET_ENV
                )
            })
    }

    pub fn output_root(&self) -> &Path {
        self.output_root.as_deref().unwrap_or(&self.scratch_dir)
    }

    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_secs.map(Duration::from_secs)
    }
}

mod defaults {
    use std::path::PathBuf;

    use url::Url;

    pub fn github_api_url() -> Url {
        Url::parse("https://api.github.com").expect("hardcoded url is valid")
    }

    pub fn docs_marker() -> String {
        String::from("docs")
    }

    pub fn docs_source() -> PathBuf {
        PathBuf::from("docs/source")
    }

    pub fn scratch_dir() -> PathBuf {
        PathBuf::from("/tmp/docs-dispatch")
    }

    pub fn sphinx_build() -> String {
        String::from("sphinx-build")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "github_repository: conda/conda\n";

    #[test]
    fn test_defaults() {
        let config: DispatchConfig = serde_yaml::from_str(MINIMAL).unwrap();

        assert_eq!(config.github_repository, "conda/conda");
        assert_eq!(config.github_api_url.as_str(), "https://api.github.com/");
        assert_eq!(config.docs_marker, "docs");
        assert_eq!(config.docs_source, PathBuf::from("docs/source"));
        assert_eq!(config.sphinx_build, "sphinx-build");
        assert_eq!(config.output_root(), Path::new("/tmp/docs-dispatch"));
        assert!(config.build_timeout().is_none());
        assert!(config.secret().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config: DispatchConfig =
            serde_yaml::from_str("github_repository: conda/conda\ngithub_secret: from-file\n")
                .unwrap();

        config.apply_env_overrides(|key| match key {
            SECRET_ENV => Some("from-env".to_string()),
            SPHINXBUILD_ENV => Some("/opt/sphinx/bin/sphinx-build".to_string()),
            _ => None,
        });

        assert_eq!(config.secret().unwrap(), "from-env");
        assert_eq!(config.sphinx_build, "/opt/sphinx/bin/sphinx-build");
    }

    #[test]
    fn test_missing_env_keeps_file_values() {
        let mut config: DispatchConfig = serde_yaml::from_str(
            "github_repository: conda/conda\ngithub_secret: from-file\noutput_root: /srv/docs\nbuild_timeout_secs: 600\n",
        )
        .unwrap();

        config.apply_env_overrides(|_| None);

        assert_eq!(config.secret().unwrap(), "from-file");
        assert_eq!(config.output_root(), Path::new("/srv/docs"));
        assert_eq!(config.build_timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let config: DispatchConfig =
            serde_yaml::from_str("github_repository: conda/conda\ngithub_secret: ''\n").unwrap();

        assert!(config.secret().is_err());
    }
}

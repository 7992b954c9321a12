//! Configuration file parsing for `minivirt.toml`.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{eyre::Context as _, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "minivirt.toml";

/// Connection URI used when neither flag nor config provides one.
pub const DEFAULT_CONNECT_URI: &str = "qemu:///system";

/// Base directory under which the default pools are created.
pub const DEFAULT_POOL_DIR: &str = "/var/lib/libvirt";

/// Settings loaded from `minivirt.toml`. CLI flags override every field.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Hypervisor connection URI (e.g., qemu:///system,
    /// qemu+ssh://host/system).
    pub connect: Option<String>,

    /// Base directory for the default storage pools.
    pub pool_dir: Option<Utf8PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or from `minivirt.toml` in the
    /// working directory when no path is given. A missing file yields the
    /// empty (all-defaults) configuration.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let path = path
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from(CONFIG_FILE));
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("Reading {}", path))?;
        toml::from_str(&content).with_context(|| format!("Parsing {}", path))
    }

    /// Effective connection URI after applying defaults.
    pub fn connect_uri(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.connect.clone())
            .unwrap_or_else(|| DEFAULT_CONNECT_URI.to_string())
    }

    /// Effective pool base directory after applying defaults.
    pub fn pool_dir(&self, flag: Option<&Utf8Path>) -> Utf8PathBuf {
        flag.map(Utf8Path::to_path_buf)
            .or_else(|| self.pool_dir.clone())
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_POOL_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_which_overrides_defaults() {
        let config: Config = toml::from_str(
            r#"
            connect = "qemu+ssh://host/system"
            pool-dir = "/srv/pools"
            "#,
        )
        .unwrap();
        assert_eq!(config.connect_uri(None), "qemu+ssh://host/system");
        assert_eq!(
            config.connect_uri(Some("test:///default")),
            "test:///default"
        );
        assert_eq!(config.pool_dir(None), Utf8PathBuf::from("/srv/pools"));

        let empty = Config::default();
        assert_eq!(empty.connect_uri(None), DEFAULT_CONNECT_URI);
        assert_eq!(empty.pool_dir(None), Utf8PathBuf::from(DEFAULT_POOL_DIR));
    }
}

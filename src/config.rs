//! [`Config`]: the handful of host-supplied settings the engine needs but
//! cannot discover on its own (`spec.md` §4.4, §9).

use std::path::PathBuf;

/// Host-supplied configuration for one [`crate::FileTransmission`] instance.
#[derive(Clone, Debug)]
pub struct Config {
    /// The passphrase (if any) that lets a remote skip the interactive
    /// confirmation prompt by presenting a matching bypass token
    /// (`spec.md` §4.4). Empty means bypass is never honored.
    pub file_transfer_confirmation_bypass: String,
    /// The directory relative paths in `file`/`name` fields are resolved
    /// against (`spec.md` §4.2/§4.5 `resolve_path`/`expand_spec`).
    pub home: PathBuf,
}

impl Config {
    /// Builds a config with no bypass passphrase, rooted at `home`.
    #[must_use]
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            file_transfer_confirmation_bypass: String::new(),
            home: home.into(),
        }
    }

    /// Attaches a bypass passphrase.
    #[must_use]
    pub fn with_bypass_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.file_transfer_confirmation_bypass = passphrase.into();
        self
    }
}

impl Default for Config {
    /// Defaults `home` to `$HOME` (falling back to the system temp directory,
    /// mirroring `DestFile::resolve_path`'s own fallback) and disables the
    /// confirmation bypass.
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self::new(home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_bypass_passphrase() {
        let cfg = Config::new("/home/user").with_bypass_passphrase("secret");
        assert_eq!(cfg.file_transfer_confirmation_bypass, "secret");
        assert_eq!(cfg.home, PathBuf::from("/home/user"));
    }
}

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use kube::config::Kubeconfig;
use kubepatch_core::ProviderConfig;
use tracing::debug;

use crate::{Error, Result};

/// Environment variable holding a platform path-list of kubeconfig files
pub const KUBE_CONFIG_PATHS: &str = "KUBE_CONFIG_PATHS";

/// Kubeconfig files to load, in precedence order
///
/// `config_path` wins over `config_paths`, which wins over the `KUBE_CONFIG_PATHS` value in `env`.
/// An empty result means no kubeconfig file is in play.
pub fn config_paths(config: &ProviderConfig, env: Option<OsString>) -> Vec<PathBuf> {
    if let Some(path) = config.config_path.as_deref().filter(|p| !p.is_empty()) {
        return vec![PathBuf::from(path)];
    }
    if !config.config_paths.is_empty() {
        return config.config_paths.iter().map(PathBuf::from).collect();
    }
    match env {
        Some(value) => std::env::split_paths(&value)
            .filter(|p| !p.as_os_str().is_empty())
            .collect(),
        None => vec![],
    }
}

/// Replace a leading `~` component with the home directory
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = home::home_dir().ok_or_else(|| Error::HomeDir(path.to_path_buf()))?;
    if rest.as_os_str().is_empty() {
        Ok(home)
    } else {
        Ok(home.join(rest))
    }
}

/// Read and merge kubeconfig files
///
/// A single path must exist. With several paths, missing files are skipped
/// and the remaining ones are merged with the first file winning on conflicts.
pub fn load_kubeconfig(paths: &[PathBuf]) -> Result<Kubeconfig> {
    if let [path] = paths {
        debug!("Using kubeconfig: {}", path.display());
        return Kubeconfig::read_from(path).map_err(Error::Kubeconfig);
    }
    paths.iter().try_fold(Kubeconfig::default(), |merged, path| {
        if !path.exists() {
            debug!("Skipping missing kubeconfig: {}", path.display());
            return Ok(merged);
        }
        debug!("Using kubeconfig: {}", path.display());
        let next = Kubeconfig::read_from(path).map_err(Error::Kubeconfig)?;
        merged.merge(next).map_err(Error::Kubeconfig)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: Option<&str>, paths: &[&str]) -> ProviderConfig {
        ProviderConfig {
            config_path: path.map(String::from),
            config_paths: paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn config_path_wins() {
        let paths = config_paths(
            &config(Some("/a"), &["/b", "/c"]),
            Some(OsString::from("/d")),
        );
        assert_eq!(paths, vec![PathBuf::from("/a")]);
    }

    #[test]
    fn config_paths_before_env() {
        let paths = config_paths(&config(None, &["/b", "/c"]), Some(OsString::from("/d")));
        assert_eq!(paths, vec![PathBuf::from("/b"), PathBuf::from("/c")]);
    }

    #[test]
    fn env_is_a_path_list() {
        let joined = std::env::join_paths(["/d", "/e"]).unwrap();
        let paths = config_paths(&config(None, &[]), Some(joined));
        assert_eq!(paths, vec![PathBuf::from("/d"), PathBuf::from("/e")]);
        assert!(config_paths(&config(Some(""), &[]), None).is_empty());
        assert!(config_paths(&config(None, &[]), Some(OsString::new())).is_empty());
    }

    #[test]
    fn home_expansion() {
        let home = home::home_dir().unwrap();
        assert_eq!(expand_home(Path::new("~/.kube/config")).unwrap(), home.join(".kube/config"));
        assert_eq!(expand_home(Path::new("~")).unwrap(), home);
        assert_eq!(
            expand_home(Path::new("/etc/kubeconfig")).unwrap(),
            PathBuf::from("/etc/kubeconfig")
        );
        assert_eq!(expand_home(Path::new("~other/x")).unwrap(), PathBuf::from("~other/x"));
    }

    #[test]
    fn merged_paths_skip_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        std::fs::write(
            &first,
            "apiVersion: v1\nkind: Config\ncurrent-context: one\nclusters:\n- name: one\n  cluster:\n    server: https://one:6443\n",
        )
        .unwrap();
        std::fs::write(
            &second,
            "apiVersion: v1\nkind: Config\ncurrent-context: two\nclusters:\n- name: one\n  cluster:\n    server: https://ignored:6443\n- name: two\n  cluster:\n    server: https://two:6443\n",
        )
        .unwrap();

        let merged = load_kubeconfig(&[first, dir.path().join("missing"), second]).unwrap();
        assert_eq!(merged.current_context.as_deref(), Some("one"));
        let servers: Vec<_> = merged
            .clusters
            .iter()
            .map(|c| c.cluster.as_ref().and_then(|c| c.server.clone()).unwrap())
            .collect();
        assert_eq!(servers, vec!["https://one:6443", "https://two:6443"]);
    }

    #[test]
    fn single_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_kubeconfig(&[dir.path().join("missing")]),
            Err(Error::Kubeconfig(_))
        ));
    }
}

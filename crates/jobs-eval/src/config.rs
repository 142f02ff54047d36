use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::report::ReportLayout;
use crate::value::{AutoArg, AutoArgs};

/// Settings for one evaluation run. Read from a YAML or JSON file and then
/// overridden from the command line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    /// Directory receiving one GC root per discovered derivation. Unset
    /// disables root registration.
    pub gc_roots_dir: Option<PathBuf>,
    /// Never write to the store.
    pub dry_run: bool,
    pub layout: ReportLayout,
    /// Auto-arguments given as literal values.
    pub args: BTreeMap<String, serde_json::Value>,
    /// Auto-arguments given as plain strings.
    pub argstrs: BTreeMap<String, String>,
}

impl EvalConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&raw)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?,
            _ => serde_yaml::from_str(&raw)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?,
        };
        Ok(config)
    }

    pub fn roots_enabled(&self) -> bool {
        self.gc_roots_dir
            .as_ref()
            .is_some_and(|dir| !dir.as_os_str().is_empty())
    }

    /// `argstrs` win over `args` when both bind the same name.
    pub fn auto_args(&self) -> AutoArgs {
        let mut auto_args = AutoArgs::new();
        for (name, value) in &self.args {
            auto_args.insert(name.clone(), AutoArg::Expr(value.clone()));
        }
        for (name, value) in &self.argstrs {
            auto_args.insert(name.clone(), AutoArg::Str(value.clone()));
        }
        auto_args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_config_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.yaml");
        fs::write(
            &path,
            "gc_roots_dir: /var/lib/hydra/gcroots\ndry_run: true\nlayout: flat\nargs:\n  supportedSystems: [x86_64-linux]\nargstrs:\n  officialRelease: \"false\"\n",
        )
        .unwrap();
        let config = EvalConfig::load(&path).unwrap();
        assert_eq!(config.gc_roots_dir, Some(PathBuf::from("/var/lib/hydra/gcroots")));
        assert!(config.dry_run);
        assert_eq!(config.layout, ReportLayout::Flat);
        let args = config.auto_args();
        assert_eq!(
            args.get("supportedSystems"),
            Some(&AutoArg::Expr(serde_json::json!(["x86_64-linux"])))
        );
        assert_eq!(args.get("officialRelease"), Some(&AutoArg::Str("false".into())));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.json");
        fs::write(&path, r#"{ "gc_root_dir": "/tmp" }"#).unwrap();
        assert!(matches!(EvalConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn empty_roots_dir_disables_roots() {
        let config = EvalConfig {
            gc_roots_dir: Some(PathBuf::new()),
            ..EvalConfig::default()
        };
        assert!(!config.roots_enabled());
        assert!(!EvalConfig::default().roots_enabled());
    }
}

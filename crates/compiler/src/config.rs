//! Build option plumbing for one configure run.
//!
//! `BuildOptions` is the compiler's one configuration surface: the source
//! and build directories plus the `-D key=value` built-in options from the
//! CLI. Builder-with pattern, same shape as the teacher's `CompilerConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use buildgraph_core::CompileError;

fn validate_key(key: &str) -> Result<(), CompileError> {
    if key.is_empty() {
        return Err(CompileError::meson("option name cannot be empty"));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(CompileError::meson(format!(
            "invalid option name '{key}': only alphanumeric characters, '_' and '-' are allowed"
        )));
    }
    Ok(())
}

/// Build-time configuration: where the sources and the build tree live,
/// plus the `-D` option map.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub defines: BTreeMap<String, String>,
}

impl BuildOptions {
    pub fn new(source_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
        BuildOptions {
            source_dir: source_dir.into(),
            build_dir: build_dir.into(),
            defines: BTreeMap::new(),
        }
    }

    /// Parses one `-D key=value` flag and folds it in (builder pattern).
    pub fn with_define(mut self, spec: &str) -> Result<Self, CompileError> {
        let (key, value) = Self::parse_define(spec)?;
        validate_key(&key)?;
        self.defines.insert(key, value);
        Ok(self)
    }

    pub fn with_defines<'a>(mut self, specs: impl IntoIterator<Item = &'a str>) -> Result<Self, CompileError> {
        for spec in specs {
            self = self.with_define(spec)?;
        }
        Ok(self)
    }

    fn parse_define(spec: &str) -> Result<(String, String), CompileError> {
        match spec.split_once('=') {
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => Err(CompileError::meson(format!(
                "invalid -D option '{spec}': expected key=value"
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.defines.get(key).map(String::as_str)
    }

    pub fn source_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.source_dir.join(relative)
    }

    pub fn build_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.build_dir.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_define_parses_key_value() {
        let opts = BuildOptions::new("/src", "/build")
            .with_define("optimization=2")
            .unwrap();
        assert_eq!(opts.get("optimization"), Some("2"));
    }

    #[test]
    fn with_define_rejects_missing_equals() {
        let err = BuildOptions::new("/src", "/build").with_define("optimization");
        assert!(err.is_err());
    }

    #[test]
    fn with_define_rejects_invalid_key() {
        let err = BuildOptions::new("/src", "/build").with_define("bad key=1");
        assert!(err.is_err());
    }

    #[test]
    fn with_defines_folds_several_flags() {
        let opts = BuildOptions::new("/src", "/build")
            .with_defines(["a=1", "b=2"])
            .unwrap();
        assert_eq!(opts.get("a"), Some("1"));
        assert_eq!(opts.get("b"), Some("2"));
    }

    #[test]
    fn source_and_build_path_join_relative() {
        let opts = BuildOptions::new("/src", "/build");
        assert_eq!(opts.source_path("sub/meson.build"), PathBuf::from("/src/sub/meson.build"));
        assert_eq!(opts.build_path("exe.p/a.o"), PathBuf::from("/build/exe.p/a.o"));
    }
}

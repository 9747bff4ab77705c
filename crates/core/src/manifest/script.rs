use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

/// Path of command script, relative to the directory of `Project.yml`.
///
/// Always written with `/` in the manifest and converted to the native separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPath(String);

impl ScriptPath {
    /// Resolves this path against the project directory.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }

    fn from_manifest(raw: &str) -> Self {
        if cfg!(unix) {
            return Self(raw.to_owned());
        }

        let mut buf = String::with_capacity(raw.len());

        for c in raw.split('/') {
            if !buf.is_empty() {
                buf.push(std::path::MAIN_SEPARATOR);
            }

            buf.push_str(c);
        }

        Self(buf)
    }
}

impl<'a> Deserialize<'a> for ScriptPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'a>,
    {
        let raw = Cow::<str>::deserialize(deserializer)?;

        Ok(Self::from_manifest(&raw))
    }
}

impl Display for ScriptPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_against_root() {
        let path: ScriptPath = serde_yaml::from_str("scripts/build.lua").unwrap();
        let full = path.resolve(Path::new("project"));

        assert!(full.starts_with("project"));
        assert!(full.ends_with(Path::new("scripts").join("build.lua")));
    }

    #[test]
    #[cfg(unix)]
    fn unix_paths_are_kept() {
        let path: ScriptPath = serde_yaml::from_str("a/b.lua").unwrap();

        assert_eq!(path.to_string(), "a/b.lua");
    }
}

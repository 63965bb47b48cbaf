use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use regex::Regex;

use crate::error::SceneError;

pub const DATADIR_ENV: &str = "SATUTILS_DATADIR";
pub const FILENAME_ENV: &str = "SATUTILS_FILENAME";

const DEFAULT_FILENAME: &str = "${date}_${c:id}_${id}";

/// Process configuration for output placement. Resolved once per invocation
/// from the environment plus CLI overrides and passed into the operations
/// that write files; nothing reads it ambiently.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_dir: Utf8PathBuf,
    pub filename: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: Utf8PathBuf::from("./"),
            filename: DEFAULT_FILENAME.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Resolve from environment with explicit overrides taking precedence.
    pub fn resolve(data_dir: Option<&str>, filename: Option<&str>) -> Self {
        let data_dir = data_dir
            .map(str::to_string)
            .or_else(|| std::env::var(DATADIR_ENV).ok())
            .unwrap_or_else(|| "./".to_string());
        let filename = filename
            .map(str::to_string)
            .or_else(|| std::env::var(FILENAME_ENV).ok())
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        Self {
            data_dir: Utf8PathBuf::from(data_dir),
            filename,
        }
    }

    /// Expand the filename pattern against per-scene substitution values.
    /// Unknown `${...}` tokens are an error so that a typo in the pattern
    /// surfaces before any download starts.
    pub fn expand_filename(&self, vars: &BTreeMap<&str, String>) -> Result<String, SceneError> {
        expand_template(&self.filename, vars)
    }

    /// Output path for one scene file: `<data_dir>/<expanded pattern><suffix>`.
    pub fn output_path(
        &self,
        vars: &BTreeMap<&str, String>,
        suffix: &str,
        extension: &str,
    ) -> Result<Utf8PathBuf, SceneError> {
        let stem = self.expand_filename(vars)?;
        Ok(self
            .data_dir
            .join(format!("{stem}{suffix}.{extension}")))
    }
}

fn expand_template(
    template: &str,
    vars: &BTreeMap<&str, String>,
) -> Result<String, SceneError> {
    let token = Regex::new(r"\$\{([A-Za-z0-9:_\-]+)\}")
        .map_err(|err| SceneError::FilenameTemplate(err.to_string()))?;
    let mut out = String::new();
    let mut last = 0usize;
    for capture in token.captures_iter(template) {
        let whole = capture.get(0).unwrap();
        let key = capture.get(1).unwrap().as_str();
        let value = vars
            .get(key)
            .ok_or_else(|| SceneError::FilenameTemplate(format!("unknown token ${{{key}}}")))?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

use std::collections::BTreeMap;
use std::path::Path;

use super::error::StartupError;

/// Class index to disease name, contiguous from zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelIndex {
    names: Vec<String>,
}

impl LabelIndex {
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| StartupError::LabelsUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&contents)
    }

    /// Parses `{"0": "Healthy", "1": "Rust", ...}`.
    pub fn from_json(contents: &str) -> Result<Self, StartupError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(contents)
            .map_err(|e| StartupError::LabelsMalformed(e.to_string()))?;

        let mut indexed = BTreeMap::new();
        for (key, name) in raw {
            let index: usize = key
                .trim()
                .parse()
                .map_err(|_| StartupError::LabelsMalformed(format!("non-numeric key {key:?}")))?;
            if indexed.insert(index, name).is_some() {
                return Err(StartupError::LabelsMalformed(format!(
                    "duplicate index {index}"
                )));
            }
        }

        let names: Vec<String> = indexed
            .into_iter()
            .enumerate()
            .map(|(expected, (index, name))| {
                if index == expected {
                    Ok(name)
                } else {
                    Err(StartupError::LabelsMalformed(format!(
                        "missing label for index {expected}"
                    )))
                }
            })
            .collect::<Result<_, _>>()?;

        Self::from_names(names)
    }

    pub fn from_names(names: Vec<String>) -> Result<Self, StartupError> {
        if names.is_empty() {
            return Err(StartupError::LabelsMalformed("no labels".to_string()));
        }
        Ok(Self { names })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// File: dataset.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::error::{Result, WafError};
use crate::payload::DatasetType;
use std::io;
use std::path::{Path, PathBuf};

/// One payload file and the labels derived from where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    pub path: PathBuf,
    pub dataset_type: DatasetType,
    /// Name of the containing directory, stored verbatim with each result.
    pub type_label: String,
    pub test_name: String,
}

impl DatasetFile {
    pub fn from_path(path: PathBuf) -> Self {
        let type_label = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let test_name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            dataset_type: DatasetType::from_dir_name(&type_label),
            type_label,
            test_name,
            path,
        }
    }
}

/// Every `*.json` file below `data_dir`, sorted by path.
pub fn discover(data_dir: &Path) -> Result<Vec<DatasetFile>> {
    if !data_dir.is_dir() {
        return Err(WafError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("data directory {} does not exist", data_dir.display()),
        )));
    }

    let mut paths = Vec::new();
    collect_json(data_dir, &mut paths)?;
    paths.sort();
    Ok(paths.into_iter().map(DatasetFile::from_path).collect())
}

fn collect_json(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn labels_come_from_directory_and_stem() {
        let file = DatasetFile::from_path(PathBuf::from("Data/Malicious/sqli.json"));
        assert_eq!(file.dataset_type, DatasetType::Malicious);
        assert_eq!(file.type_label, "Malicious");
        assert_eq!(file.test_name, "sqli");
    }

    #[test]
    fn discovers_nested_json_only() {
        let dir = TempDir::new().unwrap();
        let legit = dir.path().join("Legitimate");
        let mal = dir.path().join("Malicious");
        std::fs::create_dir_all(&legit).unwrap();
        std::fs::create_dir_all(&mal).unwrap();
        std::fs::write(legit.join("browse.json"), "[]").unwrap();
        std::fs::write(mal.join("xss.json"), "[]").unwrap();
        std::fs::write(mal.join("notes.txt"), "ignored").unwrap();

        let files = discover(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.test_name.as_str()).collect();
        assert_eq!(names, vec!["browse", "xss"]);
        assert_eq!(files[1].dataset_type, DatasetType::Malicious);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(discover(&dir.path().join("nope")).is_err());
    }
}

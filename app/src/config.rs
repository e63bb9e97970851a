use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use glob::glob;
use pcd_core::classes::{ClassEntry, ClassMapping};

use crate::error::AppError;

/// Reads the ordered class dictionary, a JSON array of `{"code", "name"}`
/// objects. Array order defines the dense class index.
pub fn load_class_dictionary(path: &Path) -> Result<ClassMapping, AppError> {
    let file = File::open(path).map_err(|source| AppError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<ClassEntry> =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            AppError::ClassDictionary {
                path: path.to_path_buf(),
                source,
            }
        })?;
    Ok(ClassMapping::new(entries)?)
}

/// Expands glob patterns; plain paths are kept as given. Matches of one
/// pattern are sorted so batch order is reproducible.
pub fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>, AppError> {
    let mut paths = Vec::new();
    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let entries = glob(pattern).map_err(|source| AppError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            let mut matched = entries.collect::<Result<Vec<_>, _>>()?;
            matched.sort();
            paths.extend(matched);
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }
    if paths.is_empty() {
        return Err(AppError::NoBatchFiles(patterns.to_vec()));
    }
    Ok(paths)
}

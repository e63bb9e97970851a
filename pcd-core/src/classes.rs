use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ClassCode, ClassIndex, CoreError};

/// One entry of the ordered class dictionary. Its position in the dictionary
/// is the dense class index the model predicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub code: ClassCode,
    pub name: String,
}

/// Bijective table between dense class indices and external class codes.
#[derive(Debug, Clone)]
pub struct ClassMapping {
    entries: Vec<ClassEntry>,
    index_by_code: HashMap<ClassCode, ClassIndex>,
    index_by_name: HashMap<String, ClassIndex>,
}

impl ClassMapping {
    pub fn new(entries: Vec<ClassEntry>) -> Result<Self, CoreError> {
        if entries.is_empty() {
            return Err(CoreError::EmptyClassDictionary);
        }

        let mut index_by_code = HashMap::with_capacity(entries.len());
        let mut index_by_name = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let index = index as ClassIndex;
            if index_by_code.insert(entry.code, index).is_some() {
                return Err(CoreError::DuplicateClassCode(entry.code));
            }
            if index_by_name.insert(entry.name.clone(), index).is_some() {
                return Err(CoreError::DuplicateClassName(entry.name.clone()));
            }
        }

        Ok(Self {
            entries,
            index_by_code,
            index_by_name,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }

    pub fn code_of(&self, index: ClassIndex) -> Option<ClassCode> {
        self.entries.get(index as usize).map(|entry| entry.code)
    }

    pub fn index_of(&self, code: ClassCode) -> Option<ClassIndex> {
        self.index_by_code.get(&code).copied()
    }

    pub fn index_of_name(&self, name: &str) -> Result<ClassIndex, CoreError> {
        self.index_by_name
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::UnknownClassName(name.to_string()))
    }

    pub fn name_of(&self, index: ClassIndex) -> Option<&str> {
        self.entries
            .get(index as usize)
            .map(|entry| entry.name.as_str())
    }
}

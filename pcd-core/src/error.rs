use thiserror::Error;

use crate::ClassCode;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("class dictionary is empty")]
    EmptyClassDictionary,

    #[error("class code {0} appears more than once in the class dictionary")]
    DuplicateClassCode(ClassCode),

    #[error("class name '{0}' appears more than once in the class dictionary")]
    DuplicateClassName(String),

    #[error("class name '{0}' is not in the class dictionary")]
    UnknownClassName(String),

    #[error("sub-batch index {index} is out of range for {tiles} tile paths")]
    SubBatchOutOfRange { index: usize, tiles: usize },
}

impl CoreError {
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }
}

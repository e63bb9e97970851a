use crate::CoreError;

/// Row-major matrix of per-point feature vectors (logits, probabilities).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureMatrix {
    width: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(width: usize, rows: usize) -> Self {
        Self {
            width,
            data: Vec::with_capacity(width * rows),
        }
    }

    pub fn zeros(width: usize, rows: usize) -> Self {
        Self {
            width,
            data: vec![0.0; width * rows],
        }
    }

    pub fn from_flat(width: usize, data: Vec<f32>) -> Result<Self, CoreError> {
        if width == 0 || data.len() % width != 0 {
            return Err(CoreError::dimension_mismatch(
                "flat feature buffer",
                width,
                data.len(),
            ));
        }
        Ok(Self { width, data })
    }

    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, CoreError> {
        let width = rows.first().map(|row| row.as_ref().len()).unwrap_or(0);
        let mut matrix = Self::with_capacity(width, rows.len());
        for row in rows {
            matrix.push_row(row.as_ref())?;
        }
        Ok(matrix)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.width..(index + 1) * self.width]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.width.max(1))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn push_row(&mut self, row: &[f32]) -> Result<(), CoreError> {
        if row.len() != self.width {
            return Err(CoreError::dimension_mismatch(
                "feature row",
                self.width,
                row.len(),
            ));
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    /// Appends a row whose width the caller has already validated.
    pub(crate) fn extend_row(&mut self, row: &[f32]) {
        debug_assert_eq!(row.len(), self.width);
        self.data.extend_from_slice(row);
    }

    pub fn append(&mut self, other: &FeatureMatrix) -> Result<(), CoreError> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() && self.width == 0 {
            self.width = other.width;
        }
        if other.width != self.width {
            return Err(CoreError::dimension_mismatch(
                "feature matrix width",
                self.width,
                other.width,
            ));
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }
}

//! JSON Lines prediction batches, one `PredictionBatch` object per line.

use std::{
    fs::File,
    io::{BufRead as _, BufReader, Lines},
    path::PathBuf,
    vec,
};

use pcd_core::batch::PredictionBatch;

use crate::error::AppError;

struct OpenBatchFile {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line: usize,
}

/// Streams batches from a list of files in order. Blank lines are skipped.
pub struct BatchReader {
    files: vec::IntoIter<PathBuf>,
    current: Option<OpenBatchFile>,
}

impl BatchReader {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files: files.into_iter(),
            current: None,
        }
    }
}

impl Iterator for BatchReader {
    type Item = Result<PredictionBatch, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.lines.next() {
                    Some(Ok(line)) => {
                        current.line += 1;
                        if line.trim().is_empty() {
                            continue;
                        }
                        return Some(serde_json::from_str(&line).map_err(|source| {
                            AppError::MalformedBatch {
                                path: current.path.clone(),
                                line: current.line,
                                source,
                            }
                        }));
                    }
                    Some(Err(source)) => {
                        let path = current.path.clone();
                        self.current = None;
                        return Some(Err(AppError::Io { path, source }));
                    }
                    None => self.current = None,
                }
            }

            let path = self.files.next()?;
            log::info!("reading batches from {:?}", path);
            match File::open(&path) {
                Ok(file) => {
                    self.current = Some(OpenBatchFile {
                        path,
                        lines: BufReader::new(file).lines(),
                        line: 0,
                    })
                }
                Err(source) => return Some(Err(AppError::Io { path, source })),
            }
        }
    }
}

use crate::{
    accumulate::Accumulator,
    error::{ExportError, Result},
};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Processed<A> {
    pub accumulator: A,
    pub lines: u64,
}

/// Streams a JSONL file through a decoder and a fold, one line in memory at a time.
#[derive(Debug, Clone, Copy)]
pub struct RecordStreamProcessor {
    progress_interval: u64,
}

impl Default for RecordStreamProcessor {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl RecordStreamProcessor {
    pub fn new(progress_interval: u64) -> Self {
        Self {
            progress_interval: progress_interval.max(1),
        }
    }

    /// Decodes every line with `decode` and feeds it to `fold`.
    ///
    /// Any undecodable line fails the run. So does a file with exactly one
    /// line, which is almost always a single JSON document rather than JSONL.
    /// An empty file yields zero lines.
    pub fn fold<T, A, E, D, F>(
        &self,
        path: &Path,
        init: A,
        mut decode: D,
        mut fold: F,
    ) -> Result<Processed<A>>
    where
        E: Display,
        D: FnMut(&str) -> std::result::Result<T, E>,
        F: FnMut(&mut A, T),
    {
        let file = File::open(path).map_err(|e| ExportError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let mut acc = init;
        let mut line = String::new();
        let mut lines = 0u64;

        info!("opening {} for processing", path.display());
        loop {
            line.clear();
            let n = reader.read_line(&mut line).map_err(|e| {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    format_error(path, lines + 1, format!("not UTF-8 text: {e}"))
                } else {
                    ExportError::io(path, e)
                }
            })?;
            if n == 0 {
                break;
            }
            lines += 1;

            let record = decode(line.trim()).map_err(|e| {
                format_error(
                    path,
                    lines,
                    format!("probably not the expected line-delimited JSON format: {e}"),
                )
            })?;
            fold(&mut acc, record);

            if lines % self.progress_interval == 0 {
                info!("{lines} records processed");
            }
        }

        if lines == 1 {
            return Err(format_error(
                path,
                1,
                "file has a single line; it is probably JSON, not JSONL".to_string(),
            ));
        }

        info!("total {lines} records processed");
        Ok(Processed {
            accumulator: acc,
            lines,
        })
    }

    /// Decodes each line as `A::Record` and folds it into `acc`.
    pub fn process<A: Accumulator>(&self, path: &Path, acc: A) -> Result<Processed<A>> {
        self.fold(
            path,
            acc,
            |line: &str| serde_json::from_str::<A::Record>(line),
            |acc: &mut A, record| acc.fold(record),
        )
    }
}

fn format_error(path: &Path, line: u64, message: String) -> ExportError {
    ExportError::Format {
        path: path.to_path_buf(),
        line,
        message,
    }
}

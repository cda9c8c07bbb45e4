//! Per-cell accumulation of image values between flushes.

use std::collections::BTreeMap;

use cell_store::{ArchiveWriter, CellBlock, StoreResult, WriteOutcome};
use smap_common::{GridPoint, VariableMeta};
use smap_parser::Image;

/// Values of one cell collected over a window of timestamps.
///
/// Each accumulator is owned by exactly one worker at a time. Values are
/// appended time-major as images arrive and transposed to the archive's
/// point-major layout on flush.
#[derive(Debug)]
pub struct CellAccumulator {
    cell: u32,
    points: Vec<GridPoint>,
    /// Position of each point in the image value arrays.
    indices: Vec<usize>,
    times: Vec<i64>,
    /// Time-major values: `values[var][t * n_points + p]`.
    values: BTreeMap<String, Vec<f64>>,
    metadata: BTreeMap<String, VariableMeta>,
}

impl CellAccumulator {
    /// `points` and `indices` must be parallel and sorted by gpi.
    pub fn new(cell: u32, points: Vec<GridPoint>, indices: Vec<usize>) -> Self {
        debug_assert_eq!(points.len(), indices.len());
        Self {
            cell,
            points,
            indices,
            times: Vec::new(),
            values: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn cell(&self) -> u32 {
        self.cell
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of buffered timestamps.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Append this cell's slice of an image.
    ///
    /// Variables absent from the image are filled with `NaN` so every
    /// variable keeps the same time axis.
    pub fn push(&mut self, image: &Image) {
        let n_points = self.points.len();
        let filled = self.times.len() * n_points;

        for (name, meta) in &image.metadata {
            if !self.metadata.contains_key(name) {
                self.metadata.insert(name.clone(), meta.clone());
            }
        }

        for name in image.data.keys() {
            self.values
                .entry(name.clone())
                .or_insert_with(|| vec![f64::NAN; filled]);
        }

        for (name, column) in self.values.iter_mut() {
            match image.values(name) {
                Some(values) => column.extend(self.indices.iter().map(|&i| values[i])),
                None => column.extend(std::iter::repeat(f64::NAN).take(n_points)),
            }
        }

        self.times.push(image.timestamp.timestamp());
    }

    /// Append the buffered window to the cell archive and reset the buffer.
    ///
    /// Metadata is kept so later flushes describe the same variables.
    pub fn flush(&mut self, writer: &ArchiveWriter) -> StoreResult<Option<WriteOutcome>> {
        if self.times.is_empty() {
            return Ok(None);
        }

        let n_points = self.points.len();
        let n_times = self.times.len();

        let variables: BTreeMap<String, Vec<f64>> = self
            .values
            .iter()
            .map(|(name, column)| {
                let mut rows = vec![f64::NAN; n_points * n_times];
                for t in 0..n_times {
                    for p in 0..n_points {
                        rows[p * n_times + t] = column[t * n_points + p];
                    }
                }
                (name.clone(), rows)
            })
            .collect();

        let outcome = writer.write_block(&CellBlock {
            cell: self.cell,
            points: &self.points,
            times: &self.times,
            variables: &variables,
            metadata: &self.metadata,
        })?;

        self.times.clear();
        for column in self.values.values_mut() {
            column.clear();
        }

        Ok(Some(outcome))
    }
}

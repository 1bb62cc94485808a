//! Two-phase construction of CSR matrices.
//!
//! The number of entries of every row is reserved first. Once the first entry is appended, the
//! reservations are converted into row offsets and storage for all entries is allocated at
//! once. Rows may be filled in any order, either sequentially through the builder or in
//! parallel through disjoint [`RowBlock`]s. [`CsrBuilder::finalize`] sorts each row by column
//! and checks that every row received exactly as many entries as were reserved for it.
use eyre::eyre;
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;

#[derive(Debug, Clone)]
enum Phase {
    Counting { counts: Vec<usize> },
    Filling {
        offsets: Vec<usize>,
        columns: Vec<usize>,
        values: Vec<f64>,
        filled: Vec<usize>,
    },
}

#[derive(Debug, Clone)]
pub struct CsrBuilder {
    nrows: usize,
    ncols: usize,
    phase: Phase,
}

impl CsrBuilder {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            phase: Phase::Counting {
                counts: vec![0; nrows],
            },
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Reserves `count` additional entries in the given row.
    ///
    /// # Panics
    ///
    /// Panics if entries have already been appended, or if the row is out of bounds.
    pub fn reserve_row(&mut self, row: usize, count: usize) {
        match &mut self.phase {
            Phase::Counting { counts } => counts[row] += count,
            Phase::Filling { .. } => panic!("Cannot reserve entries after entries have been appended"),
        }
    }

    /// Total number of reserved entries.
    pub fn reserved_nnz(&self) -> usize {
        match &self.phase {
            Phase::Counting { counts } => counts.iter().sum(),
            Phase::Filling { offsets, .. } => offsets[self.nrows],
        }
    }

    /// Switches to the fill phase, allocating storage for all reserved entries.
    fn begin_fill(&mut self) {
        if let Phase::Counting { counts } = &self.phase {
            let mut offsets = Vec::with_capacity(self.nrows + 1);
            offsets.push(0);
            for count in counts {
                offsets.push(offsets.last().copied().unwrap_or(0) + count);
            }
            let nnz = offsets[self.nrows];
            self.phase = Phase::Filling {
                offsets,
                columns: vec![0; nnz],
                values: vec![0.0; nnz],
                filled: vec![0; self.nrows],
            };
        }
    }

    /// Appends an entry to the given row.
    ///
    /// # Panics
    ///
    /// Panics if the row already holds all entries reserved for it, or if the column is out of
    /// bounds.
    pub fn append_entry(&mut self, row: usize, col: usize, value: f64) {
        self.begin_fill();
        let ncols = self.ncols;
        if let Phase::Filling {
            offsets,
            columns,
            values,
            filled,
        } = &mut self.phase
        {
            assert!(col < ncols, "Column {} is out of bounds", col);
            let position = offsets[row] + filled[row];
            assert!(position < offsets[row + 1], "Row {} exceeds its reserved entries", row);
            columns[position] = col;
            values[position] = value;
            filled[row] += 1;
        }
    }

    /// Splits the rows into consecutive blocks of `rows_per_block` rows (the last block may be
    /// shorter) that can be filled independently, e.g. in parallel.
    pub fn row_blocks_mut(&mut self, rows_per_block: usize) -> Vec<RowBlock<'_>> {
        assert!(rows_per_block > 0);
        self.begin_fill();
        let ncols = self.ncols;
        let Phase::Filling {
            offsets,
            columns,
            values,
            filled,
        } = &mut self.phase
        else {
            unreachable!("builder is in the fill phase");
        };

        let mut blocks = Vec::with_capacity((self.nrows + rows_per_block - 1) / rows_per_block);
        let mut columns_rest = columns.as_mut_slice();
        let mut values_rest = values.as_mut_slice();
        for (block_index, filled) in filled.chunks_mut(rows_per_block).enumerate() {
            let first_row = block_index * rows_per_block;
            let block_offsets = &offsets[first_row..=first_row + filled.len()];
            let len = block_offsets[filled.len()] - block_offsets[0];
            let (block_columns, rest) = std::mem::take(&mut columns_rest).split_at_mut(len);
            columns_rest = rest;
            let (block_values, rest) = std::mem::take(&mut values_rest).split_at_mut(len);
            values_rest = rest;
            blocks.push(RowBlock {
                first_row,
                ncols,
                offsets: block_offsets,
                columns: block_columns,
                values: block_values,
                filled,
            });
        }
        blocks
    }

    /// Sorts every row by column and returns the finished matrix.
    ///
    /// Fails if the number of entries appended to some row differs from the number reserved
    /// for it, or if a row contains duplicate columns.
    pub fn finalize(mut self) -> eyre::Result<CsrMatrix<f64>> {
        self.begin_fill();
        let Phase::Filling {
            offsets,
            mut columns,
            mut values,
            filled,
        } = self.phase
        else {
            unreachable!("builder is in the fill phase");
        };

        for (row, &count) in filled.iter().enumerate() {
            let reserved = offsets[row + 1] - offsets[row];
            if count != reserved {
                return Err(eyre!(
                    "Row {row} was reserved {reserved} entries, but {count} entries were appended"
                ));
            }
        }

        let mut rows: Vec<(&mut [usize], &mut [f64])> = Vec::with_capacity(self.nrows);
        let mut columns_rest = columns.as_mut_slice();
        let mut values_rest = values.as_mut_slice();
        for row in 0..self.nrows {
            let len = offsets[row + 1] - offsets[row];
            let (row_columns, rest) = std::mem::take(&mut columns_rest).split_at_mut(len);
            columns_rest = rest;
            let (row_values, rest) = std::mem::take(&mut values_rest).split_at_mut(len);
            values_rest = rest;
            rows.push((row_columns, row_values));
        }
        rows.par_iter_mut()
            .with_min_len(256)
            .for_each(|(row_columns, row_values)| sort_row(row_columns, row_values));

        CsrMatrix::try_from_csr_data(self.nrows, self.ncols, offsets, columns, values)
            .map_err(|err| eyre!("Assembled sparsity pattern is not a valid CSR pattern: {err}"))
    }
}

fn sort_row(columns: &mut [usize], values: &mut [f64]) {
    if columns.windows(2).all(|pair| pair[0] < pair[1]) {
        return;
    }
    let mut entries: Vec<(usize, f64)> = columns.iter().copied().zip(values.iter().copied()).collect();
    entries.sort_unstable_by_key(|&(col, _)| col);
    for ((col, value), (col_out, value_out)) in entries.into_iter().zip(columns.iter_mut().zip(values.iter_mut())) {
        *col_out = col;
        *value_out = value;
    }
}

/// A consecutive range of rows of a [`CsrBuilder`] in its fill phase.
#[derive(Debug)]
pub struct RowBlock<'a> {
    first_row: usize,
    ncols: usize,
    // Absolute offsets of the rows of this block, one more than the number of rows
    offsets: &'a [usize],
    columns: &'a mut [usize],
    values: &'a mut [f64],
    filled: &'a mut [usize],
}

impl<'a> RowBlock<'a> {
    /// Global index of the first row of the block.
    pub fn first_row(&self) -> usize {
        self.first_row
    }

    pub fn row_count(&self) -> usize {
        self.filled.len()
    }

    /// Appends an entry to the given global row, which must belong to this block.
    ///
    /// # Panics
    ///
    /// Panics if the row is not part of the block, already holds all entries reserved for it,
    /// or if the column is out of bounds.
    pub fn append_entry(&mut self, row: usize, col: usize, value: f64) {
        assert!(col < self.ncols, "Column {} is out of bounds", col);
        let local = row
            .checked_sub(self.first_row)
            .filter(|&local| local < self.filled.len())
            .unwrap_or_else(|| panic!("Row {} is not part of the block", row));
        let position = self.offsets[local] + self.filled[local];
        assert!(position < self.offsets[local + 1], "Row {} exceeds its reserved entries", row);
        let index = position - self.offsets[0];
        self.columns[index] = col;
        self.values[index] = value;
        self.filled[local] += 1;
    }
}

/// Set of columns seen in the current row, reset in constant time.
#[derive(Debug, Clone, Default)]
pub struct ColumnMarker {
    stamps: Vec<usize>,
    generation: usize,
}

impl ColumnMarker {
    /// Forgets all marked columns and makes sure columns below `ncols` can be marked.
    pub fn reset(&mut self, ncols: usize) {
        if self.stamps.len() < ncols {
            self.stamps.resize(ncols, 0);
        }
        self.generation += 1;
    }

    /// Marks the column, returning `true` if it was not marked before.
    pub fn insert(&mut self, col: usize) -> bool {
        if self.stamps[col] == self.generation {
            false
        } else {
            self.stamps[col] = self.generation;
            true
        }
    }
}

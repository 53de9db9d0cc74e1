//! Per-node message storage.
//!
//! Each node owns a fixed-size table of outgoing messages, one row per
//! adjacent edge and one column per hypothesis. Rows are stored contiguously
//! at `row * nk + column`; the layout is the same for variable and function
//! nodes so that a neighbor's row can be addressed by slot alone.

use crate::engine::errors::BpError;

/// Fixed-size table of per-edge message vectors.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "MessageTableParts"))]
pub struct MessageTable {
    nk: usize,
    rows: usize,
    data: Vec<f64>,
}

impl MessageTable {
    /// Creates a table whose rows are all uniform distributions.
    pub fn uniform(rows: usize, nk: usize) -> Self {
        let value = if nk == 0 { 0.0 } else { 1.0 / nk as f64 };
        Self::filled(rows, nk, value)
    }

    /// Creates a table with every entry set to `value`.
    pub fn filled(rows: usize, nk: usize, value: f64) -> Self {
        Self {
            nk,
            rows,
            data: vec![value; rows * nk],
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn nk(&self) -> usize {
        self.nk
    }

    #[inline]
    fn index(&self, row: usize, column: usize) -> usize {
        debug_assert!(row < self.rows && column < self.nk);
        row * self.nk + column
    }

    /// Message on edge slot `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range. Slots are assigned by the graph when
    /// edges are wired, so an invalid slot is a bug rather than bad input.
    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        let start = self.index(row, 0);
        &self.data[start..start + self.nk]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let start = self.index(row, 0);
        &mut self.data[start..start + self.nk]
    }

    /// Checked access to a row, for slots coming from outside the graph.
    pub fn try_row(&self, row: usize) -> Result<&[f64], BpError> {
        if row >= self.rows {
            return Err(BpError::ValidationError(format!(
                "message slot {} out of range for table with {} rows",
                row, self.rows
            )));
        }
        Ok(self.row(row))
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> f64 {
        self.data[self.index(row, column)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, column: usize, value: f64) {
        let idx = self.index(row, column);
        self.data[idx] = value;
    }

    /// Adds `value` to entry `(row, column)`.
    #[inline]
    pub fn accumulate(&mut self, row: usize, column: usize, value: f64) {
        let idx = self.index(row, column);
        self.data[idx] += value;
    }

    /// Iterates over rows in slot order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.nk.max(1)).take(self.rows)
    }

    /// Iterates mutably over rows in slot order.
    pub fn iter_rows_mut(&mut self) -> impl Iterator<Item = &mut [f64]> {
        let rows = self.rows;
        self.data.chunks_mut(self.nk.max(1)).take(rows)
    }
}

/// Deserialized fields, checked before they become a [`MessageTable`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct MessageTableParts {
    nk: usize,
    rows: usize,
    data: Vec<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<MessageTableParts> for MessageTable {
    type Error = BpError;

    fn try_from(parts: MessageTableParts) -> Result<Self, BpError> {
        let MessageTableParts { nk, rows, data } = parts;
        if rows.checked_mul(nk) != Some(data.len()) {
            return Err(BpError::ValidationError(format!(
                "snapshot: message table of {} x {} holds {} entries",
                rows,
                nk,
                data.len()
            )));
        }
        if data.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(BpError::ValidationError(
                "snapshot: messages must be finite and non-negative".into(),
            ));
        }
        Ok(Self { nk, rows, data })
    }
}

//! Columnar tuple tables: the uniform record format of every exchange.
//!
//! A [`TupleList`] holds `n` rows of `mi` ints, `ml` longs, `mul` unsigned
//! longs and `mr` reals, stored column-group by column-group (`vi` holds
//! `mi` ints per row, and so on). Capacity grows geometrically on push.
//!
//! # Packed layout
//!
//! [`TupleList::pack`] produces a flat `u32` buffer:
//!
//! ```text
//! [n, mi, ml, mul, mr]
//! n*mi  ints    (one word each, two's complement)
//! n*ml  longs   (two words each, low word first)
//! n*mul ulongs  (two words each, low word first)
//! n*mr  reals   (IEEE-754 bits, two words each, low word first)
//! ```

use crate::algs::wire::WireTupleHeader;
use crate::mesh_error::CouplerError;
use std::cmp::Ordering;

/// One column of a [`TupleList`], addressed within its group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    Int(usize),
    Long(usize),
    ULong(usize),
    Real(usize),
}

/// Growable table of fixed-width records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TupleList {
    mi: usize,
    ml: usize,
    mul: usize,
    mr: usize,
    n: usize,
    max: usize,
    vi: Vec<i32>,
    vl: Vec<i64>,
    vul: Vec<u64>,
    vr: Vec<f64>,
}

impl TupleList {
    /// Empty table with room for `max` rows.
    pub fn new(mi: usize, ml: usize, mul: usize, mr: usize, max: usize) -> Self {
        Self {
            mi,
            ml,
            mul,
            mr,
            n: 0,
            max,
            vi: vec![0; max * mi],
            vl: vec![0; max * ml],
            vul: vec![0; max * mul],
            vr: vec![0.0; max * mr],
        }
    }

    /// Empty table with the same column widths as `self`.
    pub fn empty_like(&self) -> Self {
        Self::new(self.mi, self.ml, self.mul, self.mr, 0)
    }

    /// Column widths `[mi, ml, mul, mr]`.
    pub fn widths(&self) -> [usize; 4] {
        [self.mi, self.ml, self.mul, self.mr]
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Allocated rows.
    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Reallocates every column for `max` rows, keeping the first
    /// `min(n, max)` rows.
    pub fn resize(&mut self, max: usize) {
        self.vi.resize(max * self.mi, 0);
        self.vl.resize(max * self.ml, 0);
        self.vul.resize(max * self.mul, 0);
        self.vr.resize(max * self.mr, 0.0);
        self.max = max;
        self.n = self.n.min(max);
    }

    /// Drops every row, keeping the allocation.
    pub fn clear(&mut self) {
        self.n = 0;
    }

    /// Appends a row, growing capacity by half when full.
    ///
    /// Returns the new row index.
    pub fn push(
        &mut self,
        ints: &[i32],
        longs: &[i64],
        ulongs: &[u64],
        reals: &[f64],
    ) -> Result<usize, CouplerError> {
        let found = [ints.len(), longs.len(), ulongs.len(), reals.len()];
        if found != self.widths() {
            return Err(CouplerError::WidthMismatch(self.widths(), found));
        }
        if self.n == self.max {
            self.resize(self.max + self.max / 2 + 1);
        }
        let row = self.n;
        self.n += 1;
        self.ints_mut(row).copy_from_slice(ints);
        self.longs_mut(row).copy_from_slice(longs);
        self.ulongs_mut(row).copy_from_slice(ulongs);
        self.reals_mut(row).copy_from_slice(reals);
        Ok(row)
    }

    /// Appends every row of `other`.
    pub fn append(&mut self, other: &TupleList) -> Result<(), CouplerError> {
        if other.widths() != self.widths() {
            return Err(CouplerError::WidthMismatch(self.widths(), other.widths()));
        }
        if self.n + other.n > self.max {
            self.resize(self.n + other.n);
        }
        for row in 0..other.n {
            let dst = self.n;
            self.n += 1;
            self.ints_mut(dst).copy_from_slice(other.ints(row));
            self.longs_mut(dst).copy_from_slice(other.longs(row));
            self.ulongs_mut(dst).copy_from_slice(other.ulongs(row));
            self.reals_mut(dst).copy_from_slice(other.reals(row));
        }
        Ok(())
    }

    pub fn ints(&self, row: usize) -> &[i32] {
        &self.vi[row * self.mi..(row + 1) * self.mi]
    }

    pub fn ints_mut(&mut self, row: usize) -> &mut [i32] {
        &mut self.vi[row * self.mi..(row + 1) * self.mi]
    }

    pub fn longs(&self, row: usize) -> &[i64] {
        &self.vl[row * self.ml..(row + 1) * self.ml]
    }

    pub fn longs_mut(&mut self, row: usize) -> &mut [i64] {
        &mut self.vl[row * self.ml..(row + 1) * self.ml]
    }

    pub fn ulongs(&self, row: usize) -> &[u64] {
        &self.vul[row * self.mul..(row + 1) * self.mul]
    }

    pub fn ulongs_mut(&mut self, row: usize) -> &mut [u64] {
        &mut self.vul[row * self.mul..(row + 1) * self.mul]
    }

    pub fn reals(&self, row: usize) -> &[f64] {
        &self.vr[row * self.mr..(row + 1) * self.mr]
    }

    pub fn reals_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.vr[row * self.mr..(row + 1) * self.mr]
    }

    /// Serializes the used rows into the packed word layout.
    pub fn pack(&self) -> Vec<u32> {
        let n = self.n;
        let header = WireTupleHeader {
            n: n as u32,
            mi: self.mi as u32,
            ml: self.ml as u32,
            mul: self.mul as u32,
            mr: self.mr as u32,
        };
        let mut words = Vec::with_capacity(
            WireTupleHeader::WORDS + n * (self.mi + 2 * (self.ml + self.mul + self.mr)),
        );
        words.extend_from_slice(&header.to_words());
        words.extend(self.vi[..n * self.mi].iter().map(|&v| v as u32));
        let push64 = |words: &mut Vec<u32>, v: u64| {
            words.push(v as u32);
            words.push((v >> 32) as u32);
        };
        for &v in &self.vl[..n * self.ml] {
            push64(&mut words, v as u64);
        }
        for &v in &self.vul[..n * self.mul] {
            push64(&mut words, v);
        }
        for &v in &self.vr[..n * self.mr] {
            push64(&mut words, v.to_bits());
        }
        words
    }

    /// Rebuilds a table from [`TupleList::pack`] output.
    pub fn unpack(words: &[u32]) -> Result<Self, CouplerError> {
        let h = WireTupleHeader::from_words(words)?;
        let [n, mi, ml, mul, mr] = h.to_words().map(|w| w as usize);
        let expected = WireTupleHeader::WORDS + n * (mi + 2 * (ml + mul + mr));
        if words.len() != expected {
            return Err(CouplerError::Wire(format!(
                "packed tuple list of {n} rows needs {expected} words, buffer has {}",
                words.len()
            )));
        }
        let body = &words[WireTupleHeader::WORDS..];
        let (ints, body) = body.split_at(n * mi);
        let (longs, body) = body.split_at(2 * n * ml);
        let (ulongs, reals) = body.split_at(2 * n * mul);
        let join = |pair: &[u32]| u64::from(pair[0]) | (u64::from(pair[1]) << 32);
        let vi = ints.iter().map(|&w| w as i32).collect();
        let vl = longs.chunks_exact(2).map(|c| join(c) as i64).collect();
        let vul = ulongs.chunks_exact(2).map(join).collect();
        let vr = reals
            .chunks_exact(2)
            .map(|c| f64::from_bits(join(c)))
            .collect();
        Ok(Self {
            mi,
            ml,
            mul,
            mr,
            n,
            max: n,
            vi,
            vl,
            vul,
            vr,
        })
    }

    fn check_column(&self, col: Column) -> Result<(), CouplerError> {
        let (column, width) = match col {
            Column::Int(c) => (c, self.mi),
            Column::Long(c) => (c, self.ml),
            Column::ULong(c) => (c, self.mul),
            Column::Real(c) => (c, self.mr),
        };
        if column < width {
            Ok(())
        } else {
            Err(CouplerError::InvalidColumn { column, width })
        }
    }

    fn compare_column(&self, col: Column, a: usize, b: usize) -> Ordering {
        match col {
            Column::Int(c) => self.ints(a)[c].cmp(&self.ints(b)[c]),
            Column::Long(c) => self.longs(a)[c].cmp(&self.longs(b)[c]),
            Column::ULong(c) => self.ulongs(a)[c].cmp(&self.ulongs(b)[c]),
            Column::Real(c) => self.reals(a)[c].total_cmp(&self.reals(b)[c]),
        }
    }

    fn all_columns(&self) -> impl Iterator<Item = Column> + use<> {
        let [mi, ml, mul, mr] = self.widths();
        (0..mi)
            .map(Column::Int)
            .chain((0..ml).map(Column::Long))
            .chain((0..mul).map(Column::ULong))
            .chain((0..mr).map(Column::Real))
    }

    /// Keeps the rows listed in `perm`, in that order.
    fn permute(&mut self, perm: &[usize]) {
        let mut out = self.empty_like();
        out.resize(perm.len());
        out.n = perm.len();
        for (dst, &src) in perm.iter().enumerate() {
            out.ints_mut(dst).copy_from_slice(self.ints(src));
            out.longs_mut(dst).copy_from_slice(self.longs(src));
            out.ulongs_mut(dst).copy_from_slice(self.ulongs(src));
            out.reals_mut(dst).copy_from_slice(self.reals(src));
        }
        *self = out;
    }

    /// Stable sort of the rows by one column.
    pub fn sort(&mut self, col: Column) -> Result<(), CouplerError> {
        self.check_column(col)?;
        let mut perm: Vec<usize> = (0..self.n).collect();
        perm.sort_by(|&a, &b| self.compare_column(col, a, b));
        self.permute(&perm);
        Ok(())
    }

    /// Sorts rows lexicographically over every column (ints first, reals
    /// last): stable passes from the least to the most significant column.
    pub fn sort_all(&mut self) {
        let columns: Vec<Column> = self.all_columns().collect();
        let mut perm: Vec<usize> = (0..self.n).collect();
        for &col in columns.iter().rev() {
            perm.sort_by(|&a, &b| self.compare_column(col, a, b));
        }
        self.permute(&perm);
    }

    fn rows_identical(&self, a: usize, b: usize) -> bool {
        self.ints(a) == self.ints(b)
            && self.longs(a) == self.longs(b)
            && self.ulongs(a) == self.ulongs(b)
            && self
                .reals(a)
                .iter()
                .zip(self.reals(b))
                .all(|(x, y)| x.to_bits() == y.to_bits())
    }

    /// Drops rows that are bit-identical to their predecessor.
    pub fn dedup(&mut self) {
        if self.n < 2 {
            return;
        }
        let mut keep = vec![0];
        for row in 1..self.n {
            let last = keep[keep.len() - 1];
            if !self.rows_identical(last, row) {
                keep.push(row);
            }
        }
        if keep.len() != self.n {
            self.permute(&keep);
        }
    }

    /// Canonical form: every column sorted, duplicates removed.
    pub fn sort_dedup(&mut self) {
        self.sort_all();
        self.dedup();
    }
}

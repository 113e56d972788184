//! Fixed, little-endian wire types for the exchange paths.

use crate::geometry::bbox::BoundingBox;
use crate::mesh_error::CouplerError;
use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), CouplerError> {
    if actual == expected {
        Ok(())
    } else {
        Err(CouplerError::Wire(format!(
            "expected {expected} bytes, got {actual}"
        )))
    }
}

// All multi-byte integers in these structs are **little-endian** on the wire.
// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

/// Byte or record count preceding a payload.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following bytes/records
}
impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A rank's bounding box: reals travel as their IEEE-754 bit patterns.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireBox {
    pub min_le: [u64; 3],
    pub max_le: [u64; 3],
}
impl WireBox {
    pub fn of(b: &BoundingBox) -> Self {
        Self {
            min_le: b.min.map(|v| v.to_bits().to_le()),
            max_le: b.max.map(|v| v.to_bits().to_le()),
        }
    }
    pub fn get(&self) -> BoundingBox {
        BoundingBox {
            min: self.min_le.map(|v| f64::from_bits(u64::from_le(v))),
            max: self.max_le.map(|v| f64::from_bits(u64::from_le(v))),
        }
    }
}

/// Leading words of a packed tuple list: row count then the four column widths.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct WireTupleHeader {
    pub n: u32,
    pub mi: u32,
    pub ml: u32,
    pub mul: u32,
    pub mr: u32,
}

impl WireTupleHeader {
    /// Number of `u32` words in the header.
    pub const WORDS: usize = 5;

    pub fn to_words(self) -> [u32; Self::WORDS] {
        [self.n, self.mi, self.ml, self.mul, self.mr]
    }

    pub fn from_words(words: &[u32]) -> Result<Self, CouplerError> {
        match words {
            [n, mi, ml, mul, mr, ..] => Ok(Self {
                n: *n,
                mi: *mi,
                ml: *ml,
                mul: *mul,
                mr: *mr,
            }),
            _ => Err(CouplerError::Wire(format!(
                "tuple header needs {} words, buffer has {}",
                Self::WORDS,
                words.len()
            ))),
        }
    }
}

/// Converts a word buffer to little-endian bytes.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let le: Vec<u32> = words.iter().map(|w| w.to_le()).collect();
    cast_slice(&le).to_vec()
}

/// Converts little-endian bytes back to words.
pub fn bytes_to_words(bytes: &[u8]) -> Result<Vec<u32>, CouplerError> {
    if bytes.len() % size_of::<u32>() != 0 {
        return Err(CouplerError::Wire(format!(
            "byte length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let mut words = vec![0u32; bytes.len() / size_of::<u32>()];
    cast_slice_mut(&mut words).copy_from_slice(bytes);
    Ok(words.into_iter().map(u32::from_le).collect())
}

// ===== Compile-time sanity checks =========================================

const _: () = {
    assert!(size_of::<WireCount>() == 4);
    assert!(size_of::<WireBox>() == 48);
    assert!(align_of::<WireBox>() == 8);
    assert!(size_of::<WireTupleHeader>() == 4 * WireTupleHeader::WORDS);
};

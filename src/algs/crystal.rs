//! Crystal router: all-to-all personalized routing of tuple rows.
//!
//! Every row of a [`TupleList`] names its destination rank in one int
//! column. [`CrystalRouter::transfer`] delivers each row to that rank and,
//! on arrival, overwrites the routing column with the *source* rank, so the
//! receiver can answer by routing on the same column again.
//!
//! Rows arrive grouped by source rank in ascending order. Callers must not
//! depend on any ordering across sources.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::all_to_all_bytes;
use crate::algs::tuple_list::TupleList;
use crate::algs::wire::{bytes_to_words, words_to_bytes};
use crate::mesh_error::CouplerError;
use log::debug;

/// Routes tuple lists between the ranks of one communicator.
pub struct CrystalRouter<'a, C: Communicator> {
    comm: &'a C,
    tag: CommTag,
}

impl<'a, C: Communicator> CrystalRouter<'a, C> {
    /// Router using `tag` and `tag.offset(1)` for its messages.
    pub fn new(comm: &'a C, tag: CommTag) -> Self {
        Self { comm, tag }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// Sends every row of `table` to the rank in int column `route_column`.
    ///
    /// Collective: every rank must call it, even with an empty table. On
    /// return `table` holds the rows addressed to this rank, with the route
    /// column rewritten to the sending rank.
    pub fn transfer(&self, table: &mut TupleList, route_column: usize) -> Result<(), CouplerError> {
        let [mi, ..] = table.widths();
        if route_column >= mi {
            return Err(CouplerError::InvalidColumn {
                column: route_column,
                width: mi,
            });
        }
        let size = self.size();
        let mut per_dest: Vec<TupleList> = (0..size).map(|_| table.empty_like()).collect();
        for row in 0..table.len() {
            let dest = table.ints(row)[route_column];
            let slot = usize::try_from(dest)
                .ok()
                .filter(|&d| d < size)
                .ok_or(CouplerError::InvalidRoute {
                    row,
                    dest: i64::from(dest),
                    size,
                })?;
            per_dest[slot].push(
                table.ints(row),
                table.longs(row),
                table.ulongs(row),
                table.reals(row),
            )?;
        }
        let outgoing = per_dest
            .iter()
            .map(|t| {
                if t.is_empty() {
                    Vec::new()
                } else {
                    words_to_bytes(&t.pack())
                }
            })
            .collect();
        let incoming = all_to_all_bytes(self.comm, self.tag, outgoing)?;

        let mut received = table.empty_like();
        for (src, bytes) in incoming.iter().enumerate() {
            if bytes.is_empty() {
                continue;
            }
            let mut part = TupleList::unpack(&bytes_to_words(bytes)?)?;
            for row in 0..part.len() {
                part.ints_mut(row)[route_column] = src as i32;
            }
            received.append(&part)?;
        }
        debug!(
            "rank {}: crystal router sent {} rows, received {}",
            self.rank(),
            table.len(),
            received.len()
        );
        *table = received;
        Ok(())
    }
}

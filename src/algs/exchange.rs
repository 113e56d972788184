//! Collectives assembled from point-to-point messages.
//!
//! Every collective runs in two stages: stage 1 exchanges a [`WireCount`] byte
//! count with each peer, stage 2 exchanges the payloads themselves (empty
//! payloads are not sent; both sides know the count). All sends of a stage are
//! posted before any receive is waited on, and every send handle is drained
//! before returning, even if a receive fails. Messages to self never touch the
//! communicator.
//!
//! Each collective uses two tags: `tag` for sizes and `tag.offset(1)` for data.
//! All ranks must call the collectives in the same order.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::mesh_error::CouplerError;
use bytemuck::Zeroable;
use std::mem::size_of;

fn drain<H: Wait>(handles: Vec<H>) {
    for h in handles {
        let _ = h.wait();
    }
}

/// Receives exactly `len` bytes from `peer`.
fn recv_exact<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
    len: usize,
) -> Result<Vec<u8>, CouplerError> {
    let mut buf = vec![0u8; len];
    match comm.irecv(peer, tag.as_u16(), &mut buf).wait() {
        Some(data) if data.len() == len => Ok(data),
        Some(data) => Err(CouplerError::comm(
            peer,
            format!("expected {len} bytes, got {}", data.len()),
        )),
        None => Err(CouplerError::comm(
            peer,
            format!("failed to receive from rank {peer}"),
        )),
    }
}

fn recv_count<C: Communicator>(comm: &C, peer: usize, tag: CommTag) -> Result<usize, CouplerError> {
    let data = recv_exact(comm, peer, tag, size_of::<WireCount>())?;
    let mut cnt = WireCount::zeroed();
    cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&data);
    Ok(cnt.get())
}

/// Sends `outgoing[p]` to every peer `p` and receives one buffer from each.
///
/// Returns the received buffers indexed by source rank; entry `rank()` is
/// this rank's own `outgoing` buffer.
pub fn all_to_all_bytes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    mut outgoing: Vec<Vec<u8>>,
) -> Result<Vec<Vec<u8>>, CouplerError> {
    let (me, size) = (comm.rank(), comm.size());
    if outgoing.len() != size {
        return Err(CouplerError::LengthMismatch {
            what: "all-to-all outgoing buffers",
            expected: size,
            found: outgoing.len(),
        });
    }
    let mut incoming = vec![Vec::new(); size];
    incoming[me] = std::mem::take(&mut outgoing[me]);
    if size == 1 {
        return Ok(incoming);
    }
    let peers = || (0..size).filter(move |&p| p != me);

    // Stage 1: sizes.
    let counts: Vec<WireCount> = outgoing.iter().map(|b| WireCount::new(b.len())).collect();
    let mut pending = Vec::with_capacity(2 * size);
    for p in peers() {
        pending.push(comm.isend(
            p,
            tag.as_u16(),
            cast_slice(std::slice::from_ref(&counts[p])),
        ));
    }
    let mut sizes_in = vec![0usize; size];
    let mut maybe_err = None;
    for p in peers() {
        match recv_count(comm, p, tag) {
            Ok(n) => sizes_in[p] = n,
            Err(e) => {
                maybe_err.get_or_insert(e);
            }
        }
    }
    if let Some(err) = maybe_err {
        drain(pending);
        return Err(err);
    }

    // Stage 2: payloads.
    let data_tag = tag.offset(1);
    for p in peers().filter(|&p| !outgoing[p].is_empty()) {
        pending.push(comm.isend(p, data_tag.as_u16(), &outgoing[p]));
    }
    for p in peers().filter(|&p| sizes_in[p] > 0) {
        match recv_exact(comm, p, data_tag, sizes_in[p]) {
            Ok(data) => incoming[p] = data,
            Err(e) => {
                maybe_err.get_or_insert(e);
            }
        }
    }
    drain(pending);
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(incoming),
    }
}

/// Every rank contributes `local`; every rank receives all contributions in
/// rank order.
pub fn all_gather_bytes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    local: &[u8],
) -> Result<Vec<Vec<u8>>, CouplerError> {
    all_to_all_bytes(comm, tag, vec![local.to_vec(); comm.size()])
}

/// Sends `data` from `root` to every rank; `data` is ignored elsewhere.
pub fn broadcast_bytes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    root: usize,
    data: &[u8],
) -> Result<Vec<u8>, CouplerError> {
    let (me, size) = (comm.rank(), comm.size());
    if root >= size {
        return Err(CouplerError::InvalidRoute {
            row: 0,
            dest: root as i64,
            size,
        });
    }
    if me == root {
        let count = WireCount::new(data.len());
        let mut pending = Vec::with_capacity(2 * size);
        for p in (0..size).filter(|&p| p != me) {
            pending.push(comm.isend(p, tag.as_u16(), cast_slice(std::slice::from_ref(&count))));
            if !data.is_empty() {
                pending.push(comm.isend(p, tag.offset(1).as_u16(), data));
            }
        }
        drain(pending);
        return Ok(data.to_vec());
    }
    let len = recv_count(comm, root, tag)?;
    if len == 0 {
        return Ok(Vec::new());
    }
    recv_exact(comm, root, tag.offset(1), len)
}

/// Element-wise sum of `values` over all ranks, delivered on `root` only.
///
/// Every rank must pass the same number of values. Partial sums are added in
/// rank order, so the result is reproducible.
pub fn reduce_sum_f64<C: Communicator>(
    comm: &C,
    tag: CommTag,
    root: usize,
    values: &[f64],
) -> Result<Option<Vec<f64>>, CouplerError> {
    let (me, size) = (comm.rank(), comm.size());
    if root >= size {
        return Err(CouplerError::InvalidRoute {
            row: 0,
            dest: root as i64,
            size,
        });
    }
    let mut outgoing = vec![Vec::new(); size];
    outgoing[root] = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    let incoming = all_to_all_bytes(comm, tag, outgoing)?;
    if me != root {
        return Ok(None);
    }
    let mut sum = vec![0.0; values.len()];
    for (src, bytes) in incoming.iter().enumerate() {
        if bytes.len() != values.len() * size_of::<f64>() {
            return Err(CouplerError::comm(
                src,
                format!(
                    "reduction expected {} values, got {} bytes",
                    values.len(),
                    bytes.len()
                ),
            ));
        }
        for (acc, chunk) in sum.iter_mut().zip(bytes.chunks_exact(size_of::<f64>())) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *acc += f64::from_le_bytes(raw);
        }
    }
    Ok(Some(sum))
}

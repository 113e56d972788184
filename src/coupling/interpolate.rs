//! Field interpolation at located points.
//!
//! The rank that owns a located point's element evaluates the field there;
//! values travel back to the asking rank through the crystal router and are
//! written at the point's query index. Entries of `out` for unlocated points
//! are left untouched.

use super::{Coupler, Method, norm_factor_tag, phase};
use crate::algs::communicator::Communicator;
use crate::algs::crystal::CrystalRouter;
use crate::algs::tuple_list::TupleList;
use crate::data::mesh::MeshStore;
use crate::mesh_error::CouplerError;
use crate::topology::entity::EntityHandle;
use log::debug;

impl<C: Communicator> Coupler<'_, C> {
    /// Interpolates field `tag` at every located point into `out`. Collective.
    ///
    /// With `normalize`, each value is scaled by the factor stored in
    /// `"<tag>_normf"` on the owning rank: on the set given to the last
    /// [`Coupler::normalize_mesh`] call for `tag`, else on the root set.
    ///
    /// A rank that fails to evaluate one of its requested points still
    /// completes the exchange; it returns its own error and the asking ranks
    /// return [`CouplerError::PeerFailure`]. `out` is not written then.
    pub fn interpolate<M: MeshStore>(
        &self,
        mesh: &M,
        method: Method,
        tag: &str,
        out: &mut [f64],
        normalize: bool,
    ) -> Result<(), CouplerError> {
        let n = self.located.len();
        self.interpolate_many(mesh, &[method], &[tag], &[n], out, normalize)
    }

    /// Batched interpolation of several fields. Collective.
    ///
    /// The located points are split into consecutive runs of
    /// `points_per_method[k]` points, each interpolated from `tags[k]` with
    /// `methods[k]`. Every rank must pass the same `methods` and `tags`.
    pub fn interpolate_many<M: MeshStore>(
        &self,
        mesh: &M,
        methods: &[Method],
        tags: &[&str],
        points_per_method: &[usize],
        out: &mut [f64],
        normalize: bool,
    ) -> Result<(), CouplerError> {
        let n = self.located.len();
        check_len("interpolation tags", methods.len(), tags.len())?;
        check_len("points per method", methods.len(), points_per_method.len())?;
        check_len("located points", n, points_per_method.iter().sum())?;
        check_len("interpolation output", n, out.len())?;

        let mut requests = TupleList::new(4, 0, 0, 0, n);
        let runs = points_per_method
            .iter()
            .enumerate()
            .flat_map(|(k, &count)| std::iter::repeat_n(k, count));
        for (i, k) in runs.enumerate() {
            if let Some(loc) = self.located.get(i) {
                requests.push(
                    &[loc.rank as i32, i as i32, loc.mapped_index as i32, k as i32],
                    &[],
                    &[],
                    &[],
                )?;
            }
        }
        CrystalRouter::new(self.comm, self.tag(phase::REQUESTS)).transfer(&mut requests, 0)?;

        // A failed row is still answered (status 1) so every rank completes
        // the reply transfer; errors are returned only afterwards.
        let mut factors = vec![None; tags.len()];
        let mut local_err = None;
        let mut replies = TupleList::new(3, 0, 0, 1, requests.len());
        for row in 0..requests.len() {
            let [origin, idx, mapped, k] = [0, 1, 2, 3].map(|c| requests.ints(row)[c]);
            let answer =
                self.answer_request(mesh, mapped, k, methods, tags, normalize, &mut factors);
            let (status, value) = match answer {
                Ok(v) => (0, v),
                Err(err) => {
                    local_err.get_or_insert(err);
                    (1, 0.0)
                }
            };
            replies.push(&[origin, idx, status], &[], &[], &[value])?;
        }
        debug!(
            "rank {}: evaluated {} remote or local points",
            self.comm.rank(),
            replies.len()
        );
        CrystalRouter::new(self.comm, self.tag(phase::REPLIES)).transfer(&mut replies, 0)?;

        if let Some(err) = local_err {
            return Err(err);
        }
        let mut failed: Vec<usize> = (0..replies.len())
            .filter(|&row| replies.ints(row)[2] != 0)
            .map(|row| replies.ints(row)[0] as usize)
            .collect();
        if !failed.is_empty() {
            failed.sort_unstable();
            failed.dedup();
            return Err(CouplerError::PeerFailure { ranks: failed });
        }
        for row in 0..replies.len() {
            let idx = replies.ints(row)[1];
            let slot = usize::try_from(idx)
                .ok()
                .and_then(|i| out.get_mut(i))
                .ok_or_else(|| CouplerError::Wire(format!("reply for unknown point {idx}")))?;
            *slot = replies.reals(row)[0];
        }
        Ok(())
    }

    /// Value of one interpolation request, scaled by the cached
    /// normalization factor of its field when `normalize` is set.
    #[allow(clippy::too_many_arguments)]
    fn answer_request<M: MeshStore>(
        &self,
        mesh: &M,
        mapped: i32,
        slot: i32,
        methods: &[Method],
        tags: &[&str],
        normalize: bool,
        factors: &mut [Option<f64>],
    ) -> Result<f64, CouplerError> {
        let k = usize::try_from(slot)
            .ok()
            .filter(|&k| k < methods.len())
            .ok_or_else(|| CouplerError::Wire(format!("unknown method slot {slot}")))?;
        let value = self.evaluate_mapped(mesh, mapped, methods[k], tags[k])?;
        if !normalize {
            return Ok(value);
        }
        let factor = match factors[k] {
            Some(f) => f,
            None => {
                let f = self.norm_factor(mesh, tags[k])?;
                factors[k] = Some(f);
                f
            }
        };
        Ok(value * factor)
    }

    /// Normalization factor of `tag`: read from the set `normalize_mesh`
    /// last wrote it to, or from the root set.
    fn norm_factor<M: MeshStore>(&self, mesh: &M, tag: &str) -> Result<f64, CouplerError> {
        let set = self
            .norm_sets
            .get(tag)
            .copied()
            .unwrap_or_else(|| mesh.root_set());
        element_value(mesh, &norm_factor_tag(tag), set)
    }

    /// Evaluates field `tag` at local mapped point `mapped`.
    fn evaluate_mapped<M: MeshStore>(
        &self,
        mesh: &M,
        mapped: i32,
        method: Method,
        tag: &str,
    ) -> Result<f64, CouplerError> {
        let point = usize::try_from(mapped)
            .ok()
            .and_then(|m| self.mapped.get(m))
            .ok_or_else(|| CouplerError::Wire(format!("unknown mapped point {mapped}")))?;
        let map = self
            .source
            .map(point.element)
            .ok_or(CouplerError::MissingEntity(point.handle))?;
        let value = match method {
            Method::Constant => element_value(mesh, tag, point.handle)?,
            Method::LinearFe | Method::QuadraticFe => {
                let values = mesh.vertex_values(tag, point.handle)?;
                map.evaluate_scalar_field(&point.natural, &values)?
            }
            Method::Spectral => {
                let values = mesh.tag_get(tag, point.handle)?;
                map.evaluate_scalar_field(&point.natural, values)?
            }
        };
        Ok(value)
    }
}

/// First component of `tag` on entity `h`.
pub(crate) fn element_value<M: MeshStore>(
    mesh: &M,
    tag: &str,
    h: EntityHandle,
) -> Result<f64, CouplerError> {
    mesh.tag_get(tag, h)?
        .first()
        .copied()
        .ok_or_else(|| CouplerError::TagLength {
            tag: tag.to_string(),
            handle: h,
            expected: 1,
            found: 0,
        })
}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), CouplerError> {
    if expected == found {
        Ok(())
    } else {
        Err(CouplerError::LengthMismatch {
            what,
            expected,
            found,
        })
    }
}

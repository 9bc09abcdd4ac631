//! Matrix-level truncated decompositions backing the bond splitter.
//!
//! Both factorizations report the retained squared singular spectrum and the
//! relative weight that was discarded, so callers can track truncation error
//! across a sweep.

use std::cmp::Ordering;
use nalgebra as na;
use num_traits::{ Float, Zero };
use crate::ComplexScalar;

pub(crate) fn real<R: Float>(x: f64) -> R {
    R::from(x).unwrap_or_else(R::zero)
}

/// Report of the weight retained by a single bond decomposition.
///
/// `eigs` holds the squared singular values (equivalently, density-matrix
/// eigenvalues) that were kept, in descending order; `truncerr` is the sum of
/// the discarded weights relative to the total.
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrum<R> {
    eigs: Vec<R>,
    truncerr: R,
}

impl<R: Float> Spectrum<R> {
    pub(crate) fn new(eigs: Vec<R>, truncerr: R) -> Self {
        Self { eigs, truncerr }
    }

    /// Return the retained squared singular values, in descending order.
    pub fn eigs(&self) -> &[R] { &self.eigs }

    /// Return the relative weight discarded by truncation.
    pub fn truncerr(&self) -> R { self.truncerr }

    /// Return the number of retained values, i.e. the new bond dimension.
    pub fn rank(&self) -> usize { self.eigs.len() }
}

// Given non-negative weights `p` in descending order, return the number to
// keep and the relative discarded weight. At least one weight is always kept;
// beyond that, the tail is dropped greedily as long as its cumulative weight
// stays within `cutoff` times the total.
fn truncate_weights<R: Float>(p: &[R], cutoff: R, maxdim: Option<usize>)
    -> (usize, R)
{
    let total: R = p.iter().fold(R::zero(), |acc, pk| acc + *pk);
    if total <= R::zero() { return (1, R::zero()); }
    let maxdim = maxdim.unwrap_or(p.len()).clamp(1, p.len());
    let mut kept = maxdim;
    let mut discarded: R =
        p[maxdim..].iter().fold(R::zero(), |acc, pk| acc + *pk);
    while kept > 1 && discarded + p[kept - 1] <= cutoff * total {
        discarded = discarded + p[kept - 1];
        kept -= 1;
    }
    (kept, discarded / total)
}

pub(crate) struct SvdFactors<A: ComplexScalar> {
    pub u: na::DMatrix<A>,
    pub s: na::DVector<A::Re>,
    pub vt: na::DMatrix<A>,
    pub spectrum: Spectrum<A::Re>,
}

// Truncated singular value decomposition, mat ≈ u * diag(s) * vt, with
// singular values sorted in descending order.
pub(crate) fn factor_svd<A>(
    mat: na::DMatrix<A>,
    cutoff: A::Re,
    maxdim: Option<usize>,
) -> SvdFactors<A>
where A: ComplexScalar
{
    let (nrows, ncols) = (mat.nrows(), mat.ncols());
    let svd = mat.svd(true, true);
    let Some(u) = svd.u else { unreachable!() };
    let Some(vt) = svd.v_t else { unreachable!() };
    let s = svd.singular_values;
    // singular values are not guaranteed sorted
    let mut order: Vec<usize> = (0..s.len()).collect();
    order.sort_by(|&i, &j| {
        s[j].partial_cmp(&s[i]).unwrap_or(Ordering::Equal)
    });
    let p: Vec<A::Re> = order.iter().map(|&i| s[i] * s[i]).collect();
    let (rank, truncerr) = truncate_weights(&p, cutoff, maxdim);
    let ut =
        na::DMatrix::from_fn(nrows, rank, |r, c| u[(r, order[c])]);
    let st =
        na::DVector::from_iterator(
            rank, order[..rank].iter().map(|&i| s[i]));
    let vtt =
        na::DMatrix::from_fn(
            rank, ncols.min(vt.ncols()), |r, c| vt[(order[r], c)]);
    let spectrum = Spectrum::new(p[..rank].to_vec(), truncerr);
    SvdFactors { u: ut, s: st, vt: vtt, spectrum }
}

pub(crate) struct EigFactors<A: ComplexScalar> {
    pub u: na::DMatrix<A>,
    pub spectrum: Spectrum<A::Re>,
}

// Truncated Hermitian eigendecomposition of a (positive semi-definite)
// density matrix; the columns of `u` are the retained eigenvectors, ordered
// by descending eigenvalue. Small negative eigenvalues from roundoff are
// clamped to zero.
pub(crate) fn factor_denmat<A>(
    rho: na::DMatrix<A>,
    cutoff: A::Re,
    maxdim: Option<usize>,
) -> EigFactors<A>
where A: ComplexScalar
{
    let dim = rho.nrows();
    let eig = na::SymmetricEigen::new(rho);
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&i, &j| {
        eig.eigenvalues[j].partial_cmp(&eig.eigenvalues[i])
            .unwrap_or(Ordering::Equal)
    });
    let p: Vec<A::Re> =
        order.iter()
        .map(|&i| Float::max(eig.eigenvalues[i], A::Re::zero()))
        .collect();
    let (rank, truncerr) = truncate_weights(&p, cutoff, maxdim);
    let u =
        na::DMatrix::from_fn(
            dim, rank, |r, c| eig.eigenvectors[(r, order[c])]);
    let spectrum = Spectrum::new(p[..rank].to_vec(), truncerr);
    EigFactors { u, spectrum }
}

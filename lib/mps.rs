//! A matrix product state (MPS) in mixed canonical form.
//!
//! An [`MPS`] over `n` sites is a chain of rank ≤ 3 site tensors, each
//! carrying one physical index and up to two link indices shared with its
//! neighbors. Two orthogonality frontiers, `llim` and `rlim`, record how much
//! of the chain is known to be isometric: every site at position ≤ `llim` is
//! left-orthogonal and every site at position ≥ `rlim` is right-orthogonal.
//! When the frontiers pinch down to a single site (`llim + 2 == rlim`), that
//! site is the orthogonality center and the state's norm is just the norm of
//! the center tensor.
//!
//! Bonds are re-factorized with [`svd_bond`][MPS::svd_bond], which splits a
//! two-site ("bond") tensor back into a pair of site tensors, truncating the
//! new link. The decomposition runs in one of two modes: an exact truncated
//! SVD, or a density-matrix eigendecomposition that can absorb a stochastic
//! rank-restoring perturbation (see [`Projector`]).

use std::fmt;
use itertools::Itertools;
use nalgebra as na;
use num_complex::ComplexFloat;
use num_traits::{ Float, One, Zero };
use rand::{ distributions::{ Distribution, Standard }, thread_rng, Rng };
use thiserror::Error;
use crate::{
    ComplexFloatExt,
    ComplexScalar,
    svd::{ factor_denmat, factor_svd, real, EigFactors, Spectrum, SvdFactors },
    tensor::{ Idx, Tensor, TensorError },
};

#[derive(Debug, Error)]
pub enum MPSError {
    /// Returned when attempting to create a new MPS for a system of zero
    /// sites, or operate on one.
    #[error("cannot operate on an empty system")]
    EmptySystem,

    /// Returned when the site set of a default-initialized MPS is queried.
    #[error("MPS site set is default-initialized")]
    NoSiteSet,

    /// Returned when a site index is out of bounds.
    #[error("site index {i} out of bounds for {n} sites")]
    SiteOutOfBounds { i: usize, n: usize },

    /// Returned when a bond index is out of bounds.
    #[error("bond index {b} out of bounds for {n} sites")]
    BondOutOfBounds { b: usize, n: usize },

    /// Returned when a bond update would invalidate tensors that the
    /// orthogonality frontiers claim are isometric.
    #[error("updating bond {b} {dir:?} violates orthogonality frontiers \
        (llim = {llim}, rlim = {rlim})")]
    OrthoViolation { b: usize, dir: Direction, llim: isize, rlim: isize },

    /// Returned when a bond tensor does not carry the indices of the site
    /// tensors it is meant to replace.
    #[error("bond tensor at {b} does not match the site tensors being \
        replaced")]
    BondTensorShape { b: usize },

    /// Returned when an operation requires a well-defined orthogonality
    /// center but the frontiers have not pinched down to a single site.
    #[error("orthogonality center is not well defined; call position() \
        first")]
    NotOrtho,

    /// Returned when attempting to normalize a state of zero norm.
    #[error("cannot normalize an MPS with zero norm")]
    ZeroNorm,

    /// Returned when a binary operation is attempted between two MPSs of
    /// different lengths.
    #[error("mismatched system lengths: {a} vs {b}")]
    LengthMismatch { a: usize, b: usize },

    /// Returned when a binary operation is attempted between two MPSs whose
    /// physical indices disagree at some site.
    #[error("mismatched physical indices between operands")]
    SiteMismatch,

    /// Returned when an expected link index between neighboring site tensors
    /// is missing.
    #[error("missing link index at bond {b}")]
    MissingLink { b: usize },

    /// Returned when an operator matrix does not match the dimensions of the
    /// physical indices it is applied to.
    #[error("operator dimensions do not match the target physical indices")]
    OperatorShape,

    #[error(transparent)]
    Tensor(#[from] TensorError),
}
use MPSError::*;
pub type MPSResult<T> = Result<T, MPSError>;

/// The direction in which orthogonality is pushed by a bond update.
///
/// `Fromleft` makes the left factor of the split isometric and moves the
/// orthogonality center rightward; `Fromright` does the opposite.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Fromleft,
    Fromright,
}

/// Index type for tensors inside an [`MPS`].
///
/// Wraps a physical index of type `T` or a link (bond) index created by the
/// MPS itself. Both carry a prime level, used to keep otherwise identical
/// indices from contracting with each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MPSIndex<T> {
    /// A physical index attached to a single site.
    Physical { idx: T, prime: u32 },
    /// A link index shared by the site tensors on either side of bond `bond`.
    Link { bond: usize, dim: usize, prime: u32 },
}

impl<T> MPSIndex<T> {
    /// Return `true` if `self` is a physical index.
    pub fn is_physical(&self) -> bool { matches!(self, Self::Physical { .. }) }

    /// Return `true` if `self` is a link index.
    pub fn is_link(&self) -> bool { matches!(self, Self::Link { .. }) }

    /// Return the prime level.
    pub fn prime_level(&self) -> u32 {
        match self {
            Self::Physical { prime, .. } => *prime,
            Self::Link { prime, .. } => *prime,
        }
    }

    /// Raise the prime level by 1.
    pub fn prime(self) -> Self {
        match self {
            Self::Physical { idx, prime } =>
                Self::Physical { idx, prime: prime + 1 },
            Self::Link { bond, dim, prime } =>
                Self::Link { bond, dim, prime: prime + 1 },
        }
    }

    /// Reset the prime level to 0.
    pub fn unprime(self) -> Self {
        match self {
            Self::Physical { idx, .. } =>
                Self::Physical { idx, prime: 0 },
            Self::Link { bond, dim, .. } =>
                Self::Link { bond, dim, prime: 0 },
        }
    }
}

impl<T: Idx> Idx for MPSIndex<T> {
    fn dim(&self) -> usize {
        match self {
            Self::Physical { idx, .. } => idx.dim(),
            Self::Link { dim, .. } => *dim,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Physical { idx, prime } =>
                format!("s[{}]{}", idx.label(), "'".repeat(*prime as usize)),
            Self::Link { bond, dim, prime } =>
                format!("l{}<{}>{}", bond, dim, "'".repeat(*prime as usize)),
        }
    }
}

/// A rank-restoring perturbation applied to the density matrix on the
/// non-isometric side of a bond decomposition.
///
/// When a bond update runs in density-matrix mode with a nonzero noise
/// parameter, the density matrix is handed to the projector before
/// diagonalization. Implementations can use environment information to steer
/// the perturbation; the unit type `()` applies none at all, and
/// [`DiagonalNoise`] adds an unbiased random positive diagonal.
pub trait Projector<A: ComplexScalar> {
    fn perturb(
        &self,
        rho: &mut na::DMatrix<A>,
        noise: A::Re,
        dir: Direction,
    );
}

/// No-op projector; noise parameters are ignored.
impl<A: ComplexScalar> Projector<A> for () {
    fn perturb(&self, _: &mut na::DMatrix<A>, _: A::Re, _: Direction) { }
}

/// Environment-free perturbation: adds a uniformly random positive diagonal,
/// scaled by the noise parameter times the trace of the density matrix, to
/// restore bond dimensions that truncation would otherwise lock in.
#[derive(Copy, Clone, Debug, Default)]
pub struct DiagonalNoise;

impl<A> Projector<A> for DiagonalNoise
where
    A: ComplexScalar,
    Standard: Distribution<A::Re>,
{
    fn perturb(&self, rho: &mut na::DMatrix<A>, noise: A::Re, _: Direction) {
        if noise <= A::Re::zero() { return; }
        let tr: A::Re =
            rho.diagonal().iter()
            .fold(A::Re::zero(), |acc, z| acc + z.re());
        let scale: A::Re =
            if tr > A::Re::zero() { noise * tr } else { noise };
        let mut rng = thread_rng();
        for k in 0..rho.nrows() {
            let r: A::Re = rng.gen();
            rho[(k, k)] += A::from_re(scale * r);
        }
    }
}

/// Truncation and decomposition parameters for a bond update.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BondOptions<R> {
    /// Noise parameter passed to the [`Projector`] in density-matrix mode.
    pub noise: R,
    /// Relative truncation cutoff: trailing squared singular values are
    /// discarded as long as their cumulative weight stays within `cutoff`
    /// times the total.
    pub cutoff: R,
    /// Hard cap on the new bond dimension.
    pub maxdim: Option<usize>,
    /// Force the exact SVD mode even when noise or a loose cutoff would
    /// otherwise select the density-matrix mode.
    pub use_svd: bool,
    /// Rescale the factor carrying the singular weight to unit norm.
    pub normalize: bool,
}

impl<R: Float> Default for BondOptions<R> {
    fn default() -> Self {
        Self {
            noise: R::zero(),
            cutoff: real(MIN_CUT),
            maxdim: None,
            use_svd: false,
            normalize: false,
        }
    }
}

impl<R: Float> BondOptions<R> {
    pub fn new() -> Self { Self::default() }

    pub fn with_noise(mut self, noise: R) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_cutoff(mut self, cutoff: R) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_maxdim(mut self, maxdim: usize) -> Self {
        self.maxdim = Some(maxdim);
        self
    }

    pub fn with_svd(mut self, use_svd: bool) -> Self {
        self.use_svd = use_svd;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

/// Parameters for a two-site gate application.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GateOptions<R> {
    /// Sweep direction for the bond re-factorization after the gate; `true`
    /// moves the orthogonality center rightward.
    pub from_left: bool,
    /// Truncation parameters for the bond re-factorization.
    pub bond: BondOptions<R>,
}

impl<R: Float> Default for GateOptions<R> {
    fn default() -> Self {
        Self { from_left: true, bond: BondOptions::default() }
    }
}

impl<R: Float> GateOptions<R> {
    pub fn new() -> Self { Self::default() }

    pub fn with_from_left(mut self, from_left: bool) -> Self {
        self.from_left = from_left;
        self
    }

    pub fn with_bond(mut self, bond: BondOptions<R>) -> Self {
        self.bond = bond;
        self
    }
}

/// Default truncation cutoff; small enough that decompositions at this
/// setting are effectively exact.
pub const MIN_CUT: f64 = 1e-28;

/// A matrix product state over `n` sites, in mixed canonical form.
///
/// Sites and bonds are zero-indexed: site `k` sits between bonds `k - 1` and
/// `k`, so bond `b` connects sites `b` and `b + 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct MPS<T, A> {
    // site tensors; length n
    tensors: Vec<Tensor<MPSIndex<T>, A>>,
    // every site at position <= llim is left-orthogonal; -1 ≤ llim ≤ n - 1
    llim: isize,
    // every site at position >= rlim is right-orthogonal; 0 ≤ rlim ≤ n
    rlim: isize,
    // physical index set, if the state was built from one
    sites: Option<Vec<T>>,
}

impl<T, A> Default for MPS<T, A> {
    fn default() -> Self {
        Self { tensors: Vec::new(), llim: -1, rlim: 0, sites: None }
    }
}

impl<T, A> MPS<T, A>
where
    T: Idx,
    A: ComplexScalar,
{
    /// Create a new product-state MPS over a set of physical indices, with
    /// every site in its first basis state and all bond dimensions equal
    /// to 1.
    ///
    /// Fails if `sites` is empty or any site has zero dimension.
    pub fn new(sites: Vec<T>) -> MPSResult<Self> {
        if sites.is_empty() { return Err(EmptySystem); }
        let n = sites.len();
        let mut tensors: Vec<Tensor<MPSIndex<T>, A>> =
            Vec::with_capacity(n);
        for (k, s) in sites.iter().enumerate() {
            let mut indices: Vec<MPSIndex<T>> = Vec::with_capacity(3);
            if k > 0 {
                indices.push(MPSIndex::Link { bond: k - 1, dim: 1, prime: 0 });
            }
            let phys_pos = indices.len();
            indices.push(MPSIndex::Physical { idx: s.clone(), prime: 0 });
            if k < n - 1 {
                indices.push(MPSIndex::Link { bond: k, dim: 1, prime: 0 });
            }
            let t =
                Tensor::new(
                    indices,
                    |coords| {
                        if coords[phys_pos] == 0 { A::one() } else { A::zero() }
                    },
                )?;
            tensors.push(t);
        }
        Ok(Self { tensors, llim: -1, rlim: n as isize, sites: Some(sites) })
    }

    /// Return the number of sites.
    pub fn len(&self) -> usize { self.tensors.len() }

    /// Return `true` if `self` holds no sites.
    pub fn is_empty(&self) -> bool { self.tensors.is_empty() }

    /// Return the left orthogonality frontier: every site at position ≤ this
    /// is left-orthogonal.
    pub fn left_lim(&self) -> isize { self.llim }

    /// Return the right orthogonality frontier: every site at position ≥ this
    /// is right-orthogonal.
    pub fn right_lim(&self) -> isize { self.rlim }

    /// Return the physical index set, if the state was built from one.
    pub fn sites(&self) -> MPSResult<&[T]> {
        self.sites.as_deref().ok_or(NoSiteSet)
    }

    /// Return a reference to the site tensor at position `i`.
    pub fn site_tensor(&self, i: usize) -> MPSResult<&Tensor<MPSIndex<T>, A>> {
        self.tensors.get(i)
            .ok_or(SiteOutOfBounds { i, n: self.tensors.len() })
    }

    /// Return the two-site tensor at bond `b`, i.e. the contraction of the
    /// site tensors at positions `b` and `b + 1` over their shared link.
    pub fn bond_tensor(&self, b: usize) -> MPSResult<Tensor<MPSIndex<T>, A>> {
        if b + 1 >= self.tensors.len() {
            return Err(BondOutOfBounds { b, n: self.tensors.len() });
        }
        Ok(self.tensors[b].clone() * self.tensors[b + 1].clone())
    }

    /// Return the link index at bond `b`, shared by the site tensors at
    /// positions `b` and `b + 1`.
    pub fn link_index(&self, b: usize) -> Option<MPSIndex<T>> {
        if b + 1 >= self.tensors.len() { return None; }
        self.tensors[b]
            .common_index_with(&self.tensors[b + 1], MPSIndex::is_link)
    }

    /// Return the dimension of the link index at bond `b`.
    pub fn bond_dim(&self, b: usize) -> Option<usize> {
        self.link_index(b).map(|l| l.dim())
    }

    /// Return the maximum bond dimension across all bonds, or 0 for systems
    /// of fewer than two sites.
    pub fn max_bond_dim(&self) -> usize {
        let n = self.tensors.len();
        (0..n.saturating_sub(1))
            .filter_map(|b| self.bond_dim(b))
            .max()
            .unwrap_or(0)
    }

    /// Return the average bond dimension across all bonds, or 0 for systems
    /// of fewer than two sites.
    pub fn avg_bond_dim(&self) -> f64 {
        let n = self.tensors.len();
        if n < 2 { return 0.0; }
        let total: usize =
            (0..n - 1).filter_map(|b| self.bond_dim(b)).sum();
        total as f64 / (n - 1) as f64
    }

    /// Return `true` if the orthogonality frontiers have pinched down to a
    /// single site.
    pub fn is_ortho(&self) -> bool { self.llim + 2 == self.rlim }

    /// Return the position of the orthogonality center.
    ///
    /// Fails if the frontiers have not pinched down to a single site; call
    /// [`position`][Self::position] to sweep them there.
    pub fn ortho_center(&self) -> MPSResult<usize> {
        if !self.is_ortho() { return Err(NotOrtho); }
        Ok((self.llim + 1) as usize)
    }

    /// Return the norm of the state, i.e. the norm of the tensor at the
    /// orthogonality center.
    ///
    /// Fails if the orthogonality center is not well defined.
    pub fn norm(&self) -> MPSResult<A::Re> {
        let c = self.ortho_center()?;
        Ok(self.tensors[c].norm())
    }

    /// Rescale the state to unit norm, returning the previous norm.
    ///
    /// Fails if the orthogonality center is not well defined or the norm is
    /// zero.
    pub fn normalize(&mut self) -> MPSResult<A::Re> {
        let c = self.ortho_center()?;
        let nrm = self.tensors[c].norm();
        if nrm < real(1e-20) { return Err(ZeroNorm); }
        self.tensors[c].scale_mut(A::from_re(nrm.recip()));
        Ok(nrm)
    }

    // bounds and frontier preconditions for a bond update
    fn check_bond(&self, b: usize, dir: Direction) -> MPSResult<()> {
        let n = self.tensors.len();
        if b + 1 >= n { return Err(BondOutOfBounds { b, n }); }
        let ok = match dir {
            Direction::Fromleft => b as isize - 1 <= self.llim,
            Direction::Fromright => b as isize + 2 >= self.rlim,
        };
        if ok {
            Ok(())
        } else {
            Err(OrthoViolation { b, dir, llim: self.llim, rlim: self.rlim })
        }
    }

    /// Re-factorize bond `b`, replacing the site tensors at positions `b` and
    /// `b + 1` with the two factors of `aa` and truncating the new link
    /// between them.
    ///
    /// `aa` must carry exactly the external indices of the two site tensors
    /// being replaced (their indices minus the current shared link);
    /// typically it is [`bond_tensor(b)`][Self::bond_tensor] times some
    /// update.
    ///
    /// With `dir == Fromleft` the left factor is made isometric and the
    /// singular weight is pushed into the right factor (and vice versa), and
    /// the orthogonality frontiers are advanced accordingly. The update is
    /// refused if it would invalidate tensors the frontiers claim are
    /// isometric: `Fromleft` requires `b - 1 ≤ llim` and `Fromright` requires
    /// `b + 2 ≥ rlim`.
    ///
    /// The decomposition mode is chosen as in a DMRG sweep: an exact
    /// truncated SVD when `use_svd` is set or when the noise is zero and the
    /// cutoff is tight (`< 1e-12`); otherwise the density matrix of `aa` on
    /// the isometric side is perturbed by `projector` and diagonalized.
    pub fn svd_bond<P>(
        &mut self,
        b: usize,
        aa: Tensor<MPSIndex<T>, A>,
        dir: Direction,
        projector: &P,
        opts: &BondOptions<A::Re>,
    ) -> MPSResult<Spectrum<A::Re>>
    where P: Projector<A>
    {
        self.check_bond(b, dir)?;
        let old_link = self.link_index(b);
        let rows: Vec<MPSIndex<T>> =
            self.tensors[b].indices().iter()
            .filter(|idx| Some(*idx) != old_link.as_ref())
            .cloned()
            .collect();
        let cols: Vec<MPSIndex<T>> =
            self.tensors[b + 1].indices().iter()
            .filter(|idx| Some(*idx) != old_link.as_ref())
            .cloned()
            .collect();
        if aa.rank() != rows.len() + cols.len()
            || rows.iter().chain(&cols).any(|idx| !aa.has_index(idx))
        {
            return Err(BondTensorShape { b });
        }
        let mat = aa.to_matrix(&rows, &cols)
            .map_err(|_| BondTensorShape { b })?;

        let exact =
            opts.use_svd
            || (opts.noise == A::Re::zero() && opts.cutoff < real(1e-12));
        let (lmat, rmat, spectrum) =
            if exact {
                let SvdFactors { u, mut s, mut vt, spectrum } =
                    factor_svd(mat, opts.cutoff, opts.maxdim);
                if opts.normalize {
                    let nrm = s.norm();
                    if nrm > real(1e-16) { s.unscale_mut(nrm); }
                }
                match dir {
                    Direction::Fromleft => {
                        vt.row_iter_mut().zip(s.iter())
                            .for_each(|(mut row, sk)| { row.scale_mut(*sk); });
                        (u, vt, spectrum)
                    }
                    Direction::Fromright => {
                        let mut u = u;
                        u.column_iter_mut().zip(s.iter())
                            .for_each(|(mut col, sk)| { col.scale_mut(*sk); });
                        (u, vt, spectrum)
                    }
                }
            } else {
                match dir {
                    Direction::Fromleft => {
                        let mut rho = &mat * mat.adjoint();
                        projector.perturb(&mut rho, opts.noise, dir);
                        let EigFactors { u, spectrum } =
                            factor_denmat(rho, opts.cutoff, opts.maxdim);
                        let mut center = u.adjoint() * &mat;
                        if opts.normalize {
                            let nrm = center.norm();
                            if nrm > real(1e-16) { center.unscale_mut(nrm); }
                        }
                        (u, center, spectrum)
                    }
                    Direction::Fromright => {
                        let mut rho = mat.adjoint() * &mat;
                        projector.perturb(&mut rho, opts.noise, dir);
                        let EigFactors { u: w, spectrum } =
                            factor_denmat(rho, opts.cutoff, opts.maxdim);
                        let mut center = &mat * &w;
                        if opts.normalize {
                            let nrm = center.norm();
                            if nrm > real(1e-16) { center.unscale_mut(nrm); }
                        }
                        (center, w.adjoint(), spectrum)
                    }
                }
            };

        let rank = lmat.ncols();
        let new_link = MPSIndex::Link { bond: b, dim: rank, prime: 0 };
        self.tensors[b] =
            Tensor::from_matrix(rows, vec![new_link.clone()], &lmat)
            .map_err(|_| BondTensorShape { b })?;
        self.tensors[b + 1] =
            Tensor::from_matrix(vec![new_link], cols, &rmat)
            .map_err(|_| BondTensorShape { b })?;

        match dir {
            Direction::Fromleft => {
                self.llim = b as isize;
                self.rlim = self.rlim.max(b as isize + 2);
            }
            Direction::Fromright => {
                self.llim = self.llim.min(b as isize - 1);
                self.rlim = b as isize + 1;
            }
        }
        Ok(spectrum)
    }

    /// Sweep the orthogonality center to site `j` using exact bond
    /// decompositions, leaving the state unchanged up to floating-point
    /// error.
    pub fn position(&mut self, j: usize) -> MPSResult<()> {
        let n = self.tensors.len();
        if j >= n { return Err(SiteOutOfBounds { i: j, n }); }
        let opts = BondOptions { use_svd: true, ..BondOptions::default() };
        while self.llim < j as isize - 1 {
            let b = (self.llim + 1) as usize;
            let aa = self.bond_tensor(b)?;
            self.svd_bond(b, aa, Direction::Fromleft, &(), &opts)?;
        }
        while self.rlim > j as isize + 1 {
            let b = (self.rlim - 2) as usize;
            let aa = self.bond_tensor(b)?;
            self.svd_bond(b, aa, Direction::Fromright, &(), &opts)?;
        }
        Ok(())
    }

    /// Check that the site tensor at position `i` is left-orthogonal (if
    /// `left`) or right-orthogonal, by contracting it with its own conjugate
    /// over all indices except the outward-facing link and comparing the
    /// result to the identity at an absolute tolerance of 1e-13.
    ///
    /// A diagnostic is printed to stderr on failure.
    pub fn check_ortho_site(&self, i: usize, left: bool) -> MPSResult<bool> {
        let a = self.site_tensor(i)?;
        let link =
            if left {
                self.link_index(i)
            } else if i > 0 {
                self.link_index(i - 1)
            } else {
                None
            };
        let thresh: A::Re = real(1e-13);
        let dev: A::Re =
            match link {
                Some(l) => {
                    let lp = l.clone().prime();
                    let primed =
                        a.clone()
                        .map_indices(|idx| {
                            if idx == l { lp.clone() } else { idx }
                        });
                    let rho = a.clone() * primed.conj();
                    let delta = Tensor::delta(l, lp)?;
                    rho.sub_checked(delta)?.norm()
                }
                None => {
                    // no outward link; the tensor must have unit norm
                    let z =
                        (a.conj() * a.clone()).scalar()
                        .unwrap_or_else(A::zero);
                    ComplexFloat::abs(z - A::one())
                }
            };
        if dev < thresh { return Ok(true); }
        eprintln!(
            "check_ortho: tensor at site {} failed to be {} orthogonal",
            i, if left { "left" } else { "right" },
        );
        eprintln!(
            "check_ortho: deviation {:?} exceeds threshold {:?}",
            dev, thresh,
        );
        Ok(false)
    }

    /// Check that every site tensor inside the orthogonality frontiers is
    /// actually isometric in the direction the frontiers claim.
    pub fn check_ortho(&self) -> bool {
        let n = self.tensors.len();
        let left_ok =
            (0..=self.llim).all(|i| {
                self.check_ortho_site(i as usize, true).unwrap_or(false)
            });
        if !left_ok { return false; }
        (self.rlim.max(0)..n as isize).all(|i| {
            self.check_ortho_site(i as usize, false).unwrap_or(false)
        })
    }

    // conjugate with all link indices primed, so that contraction with an
    // unconjugated state touches only physical indices and the running
    // boundary tensor
    fn dag_linked(t: &Tensor<MPSIndex<T>, A>) -> Tensor<MPSIndex<T>, A> {
        t.conj()
            .map_indices(|idx| {
                if idx.is_link() { idx.prime() } else { idx }
            })
    }

    /// Compute the inner product `⟨psi|phi⟩`, conjugating `psi`.
    ///
    /// Fails if the two states have different lengths, are empty, or their
    /// physical indices disagree at some site.
    pub fn overlap(psi: &Self, phi: &Self) -> MPSResult<A> {
        let n = psi.tensors.len();
        if n != phi.tensors.len() {
            return Err(LengthMismatch { a: n, b: phi.tensors.len() });
        }
        if n == 0 { return Err(EmptySystem); }
        if n == 1 {
            return (Self::dag_linked(&psi.tensors[0])
                * phi.tensors[0].clone())
                .scalar()
                .ok_or(SiteMismatch);
        }
        let mut bdry =
            phi.tensors[0].clone() * Self::dag_linked(&psi.tensors[0]);
        for i in 1..n - 1 {
            bdry =
                bdry
                * phi.tensors[i].clone()
                * Self::dag_linked(&psi.tensors[i]);
        }
        bdry = bdry * phi.tensors[n - 1].clone();
        (bdry * Self::dag_linked(&psi.tensors[n - 1]))
            .scalar()
            .ok_or(SiteMismatch)
    }

    /// Compute the real part of the inner product `⟨psi|phi⟩`, warning on
    /// stderr if a non-negligible imaginary part is dropped.
    pub fn overlap_re(psi: &Self, phi: &Self) -> MPSResult<A::Re> {
        let z = Self::overlap(psi, phi)?;
        if z.im().abs() > real::<A::Re>(1e-12) * z.re().abs() {
            eprintln!(
                "overlap: warning: dropping non-zero imaginary part {:?} \
                of inner product",
                z.im(),
            );
        }
        Ok(z.re())
    }

    // positions of the physical indices of the site tensor at `k`, in tensor
    // index order
    fn phys_indices(&self, k: usize) -> Vec<MPSIndex<T>> {
        self.tensors[k].indices().iter()
            .filter(|idx| idx.is_physical())
            .cloned()
            .collect()
    }

    /// Compute the exact sum of two states as a direct ("block diagonal")
    /// embedding: every new bond dimension is the sum of the operands'.
    ///
    /// The result makes no orthogonality claims; sweep it with
    /// [`position`][Self::position] to restore a center (and re-compress).
    ///
    /// Fails if the states have different lengths, are empty, or their
    /// physical indices disagree at some site.
    pub fn add(&self, rhs: &Self) -> MPSResult<Self> {
        let n = self.tensors.len();
        if n != rhs.tensors.len() {
            return Err(LengthMismatch { a: n, b: rhs.tensors.len() });
        }
        if n == 0 { return Err(EmptySystem); }
        if n == 1 {
            let t =
                self.tensors[0].clone()
                .add_checked(rhs.tensors[0].clone())
                .map_err(|_| SiteMismatch)?;
            return Ok(Self {
                tensors: vec![t],
                llim: -1,
                rlim: 1,
                sites: self.sites.clone(),
            });
        }
        let mut tensors: Vec<Tensor<MPSIndex<T>, A>> = Vec::with_capacity(n);
        for k in 0..n {
            let has_l = k > 0;
            let has_r = k < n - 1;
            let phys = self.phys_indices(k);
            let mut order_a: Vec<MPSIndex<T>> = Vec::with_capacity(4);
            let mut order_b: Vec<MPSIndex<T>> = Vec::with_capacity(4);
            let mut new_order: Vec<MPSIndex<T>> = Vec::with_capacity(4);
            let (mut dla, mut dlb) = (0, 0);
            let (mut dra, mut drb) = (0, 0);
            if has_l {
                let la = self.link_index(k - 1)
                    .ok_or(MissingLink { b: k - 1 })?;
                let lb = rhs.link_index(k - 1)
                    .ok_or(MissingLink { b: k - 1 })?;
                dla = la.dim();
                dlb = lb.dim();
                order_a.push(la);
                order_b.push(lb);
                new_order.push(MPSIndex::Link {
                    bond: k - 1,
                    dim: dla + dlb,
                    prime: 0,
                });
            }
            order_a.extend(phys.iter().cloned());
            order_b.extend(phys.iter().cloned());
            new_order.extend(phys.iter().cloned());
            if has_r {
                let ra = self.link_index(k).ok_or(MissingLink { b: k })?;
                let rb = rhs.link_index(k).ok_or(MissingLink { b: k })?;
                dra = ra.dim();
                drb = rb.dim();
                order_a.push(ra);
                order_b.push(rb);
                new_order.push(MPSIndex::Link {
                    bond: k,
                    dim: dra + drb,
                    prime: 0,
                });
            }
            let ta =
                self.tensors[k].permuted_to(&order_a)
                .map_err(|_| SiteMismatch)?;
            let tb =
                rhs.tensors[k].permuted_to(&order_b)
                .map_err(|_| SiteMismatch)?;
            let t =
                Tensor::new(
                    new_order,
                    |coords| {
                        let (l, rest) =
                            if has_l {
                                (coords[0], &coords[1..])
                            } else {
                                (0, coords)
                            };
                        let (r, mid) =
                            if has_r {
                                (rest[rest.len() - 1], &rest[..rest.len() - 1])
                            } else {
                                (0, rest)
                            };
                        let in_a =
                            (!has_l || l < dla) && (!has_r || r < dra);
                        let mut cc: Vec<usize> =
                            Vec::with_capacity(mid.len() + 2);
                        if in_a {
                            if has_l { cc.push(l); }
                            cc.extend_from_slice(mid);
                            if has_r { cc.push(r); }
                            ta.get(&cc)
                        } else if (!has_l || l >= dla) && (!has_r || r >= dra)
                        {
                            if has_l { cc.push(l - dla); }
                            cc.extend_from_slice(mid);
                            if has_r { cc.push(r - dra); }
                            tb.get(&cc)
                        } else {
                            A::zero()
                        }
                    },
                )?;
            tensors.push(t);
        }
        Ok(Self {
            tensors,
            llim: -1,
            rlim: n as isize,
            sites: self.sites.clone(),
        })
    }

    /// Sum an arbitrary number of states by pairwise reduction: terms are
    /// added in pairs, then the partial sums in pairs, and so on, keeping the
    /// addition tree balanced. Zero terms produce a default (empty) state; a
    /// single term is returned unchanged.
    pub fn sum(terms: &[Self]) -> MPSResult<Self> {
        match terms.len() {
            0 => Ok(Self::default()),
            1 => Ok(terms[0].clone()),
            2 => terms[0].add(&terms[1]),
            _ => {
                let mut level: Vec<Self> = terms.to_vec();
                while level.len() > 1 {
                    let mut next: Vec<Self> =
                        Vec::with_capacity(level.len() / 2 + 1);
                    for (a, b) in level.iter().tuples() {
                        next.push(a.add(b)?);
                    }
                    if level.len() % 2 == 1 {
                        // odd term out; carried to the next round
                        next.push(level[level.len() - 1].clone());
                    }
                    level = next;
                }
                Ok(level.pop().unwrap_or_default())
            }
        }
    }

    /// Apply a two-site operator at the orthogonality center, acting on the
    /// physical indices of the center site and its right neighbor, then
    /// re-factorize the bond between them.
    ///
    /// `op` is given as a matrix over the combined physical space, row-major
    /// in the pair of physical indices (center first). After the update the
    /// orthogonality center sits at the right neighbor if
    /// `opts.from_left`, or stays at the same position otherwise.
    ///
    /// Fails if the orthogonality center is not well defined, sits at the
    /// last site, or `op` has the wrong dimensions.
    pub fn apply_gate<P>(
        &mut self,
        op: &na::DMatrix<A>,
        projector: &P,
        opts: &GateOptions<A::Re>,
    ) -> MPSResult<Spectrum<A::Re>>
    where P: Projector<A>
    {
        let c = self.ortho_center()?;
        if c + 1 >= self.tensors.len() {
            return Err(BondOutOfBounds { b: c, n: self.tensors.len() });
        }
        let pc =
            self.phys_indices(c).into_iter().next().ok_or(SiteMismatch)?;
        let pc1 =
            self.phys_indices(c + 1).into_iter().next().ok_or(SiteMismatch)?;
        let dc = pc.dim();
        let dc1 = pc1.dim();
        if op.nrows() != dc * dc1 || op.ncols() != dc * dc1 {
            return Err(OperatorShape);
        }
        let gate =
            Tensor::new(
                [
                    pc.clone().prime(),
                    pc1.clone().prime(),
                    pc,
                    pc1,
                ],
                |x| op[(x[0] * dc1 + x[1], x[2] * dc1 + x[3])],
            )?;
        let aa = (self.bond_tensor(c)? * gate).map_indices(MPSIndex::unprime);
        let dir =
            if opts.from_left {
                Direction::Fromleft
            } else {
                Direction::Fromright
            };
        self.svd_bond(c, aa, dir, projector, &opts.bond)
    }
}

impl<T, A> fmt::Display for MPS<T, A>
where
    T: Idx,
    A: ComplexScalar + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f, "MPS over {} sites (llim = {}, rlim = {}):",
            self.tensors.len(), self.llim, self.rlim,
        )?;
        for (k, t) in self.tensors.iter().enumerate() {
            writeln!(f, "  A[{}] = {}", k, t)?;
        }
        Ok(())
    }
}

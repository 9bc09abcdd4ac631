//! An N-dimensional array of data with shape determined by a set of labeled
//! indices.
//!
//! A [`Tensor`] is a multi-linear algebraic object generalizing vectors and
//! matrices to an arbitrary number of indices. The usual matrix-matrix,
//! matrix-vector, and vector-vector "dot" products are generalized to the
//! tensor contraction, which sums over every index the two operands hold in
//! common and leaves all others untouched.
//!
//! ```
//! use mps_canon::tensor::{ Idx, Tensor };
//!
//! #[derive(Copy, Clone, Debug, PartialEq, Eq)]
//! enum Index { A, B, C }
//!
//! impl Idx for Index {
//!     fn dim(&self) -> usize {
//!         match self {
//!             Self::A => 3,
//!             Self::B => 4,
//!             Self::C => 5,
//!         }
//!     }
//! }
//!
//! let a: Tensor<Index, num_complex::Complex64> =
//!     Tensor::new([Index::A, Index::B], |_| 1.0.into()).unwrap();
//! let b: Tensor<Index, num_complex::Complex64> =
//!     Tensor::new([Index::B, Index::C], |_| 2.0.into()).unwrap();
//! let c = a * b; // C_{a,c} = Σ_b A_{a,b} B_{b,c}
//! assert_eq!(c.indices(), &[Index::A, Index::C]);
//! ```

use std::fmt;
use nalgebra::{ self as na, ComplexField };
use num_traits::{ One, Zero };
use thiserror::Error;
use crate::ComplexScalar;

#[derive(Debug, Error)]
pub enum TensorError {
    /// Returned when attempting to create a new tensor with duplicate indices.
    #[error("error in tensor creation: duplicate indices")]
    DuplicateIndices,

    /// Returned when attempting to create a new tensor with at least one index
    /// that has zero dimension.
    #[error("error in tensor creation: encountered a zero-dimensional index")]
    ZeroDimIndex,

    /// Returned when attempting to create a new tensor from a pre-existing
    /// collection of elements and the provided indices have non-matching total
    /// dimension.
    #[error("error in tensor creation: non-matching indices and number of elements")]
    IncompatibleElems,

    /// Returned when a tensor add or sub is attempted between two tensors with
    /// incompatible indices, or a permutation target is not a rearrangement of
    /// a tensor's indices.
    #[error("error in tensor arithmetic: non-matching indices")]
    IncompatibleIndices,
}
use TensorError::*;
pub type TensorResult<T> = Result<T, TensorError>;

/// Describes a tensor index.
///
/// Two indices are considered contractible when they compare equal, so the
/// implementing type must carry enough information to distinguish every index
/// in play.
pub trait Idx: Clone + PartialEq + fmt::Debug {
    /// Return the number of values the index can take.
    ///
    /// This value must never be zero.
    fn dim(&self) -> usize;

    /// Return an identifying label for the index. This method is used only for
    /// printing purposes.
    ///
    /// The default implementation renders `self` using `Debug`.
    fn label(&self) -> String { format!("{self:?}") }
}

fn is_unique<T: PartialEq>(elems: &[T]) -> bool {
    elems.iter().enumerate()
        .all(|(k, e)| !elems[..k].contains(e))
}

// row-major strides: the stride of index k is the product of all dimensions to
// its right
fn strides<T: Idx>(indices: &[T]) -> Vec<usize> {
    let mut acc = 1;
    let mut out = vec![1; indices.len()];
    for (k, idx) in indices.iter().enumerate().rev() {
        out[k] = acc;
        acc *= idx.dim();
    }
    out
}

fn decode(mut k: usize, dims: &[usize], coords: &mut [usize]) {
    for (c, d) in coords.iter_mut().zip(dims).rev() {
        *c = k % d;
        k /= d;
    }
}

fn dim_prod<T: Idx>(indices: &[T]) -> usize {
    indices.iter().map(Idx::dim).product()
}

/// A dense tensor over a set of indices of type `T`, holding elements of type
/// `A`.
///
/// Elements are stored flat in row-major order with respect to the index list,
/// i.e. the last index varies fastest. A tensor with no indices is a scalar
/// holding exactly one element.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<T, A> {
    indices: Vec<T>,
    data: na::DVector<A>,
}

impl<T, A> Tensor<T, A>
where
    T: Idx,
    A: ComplexScalar,
{
    /// Create a new tensor, with elements provided by a function of their
    /// coordinates.
    ///
    /// Fails if any index is repeated or has zero dimension.
    pub fn new<I, F>(indices: I, mut elems: F) -> TensorResult<Self>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&[usize]) -> A,
    {
        let indices: Vec<T> = indices.into_iter().collect();
        if !is_unique(&indices) { return Err(DuplicateIndices); }
        if indices.iter().any(|idx| idx.dim() == 0) {
            return Err(ZeroDimIndex);
        }
        let dims: Vec<usize> = indices.iter().map(Idx::dim).collect();
        let len: usize = dims.iter().product();
        let mut coords = vec![0; indices.len()];
        let data =
            na::DVector::from_iterator(
                len,
                (0..len).map(|k| {
                    decode(k, &dims, &mut coords);
                    elems(&coords)
                }),
            );
        Ok(Self { indices, data })
    }

    /// Create a new rank-0 (scalar) tensor.
    pub fn new_scalar(val: A) -> Self {
        Self {
            indices: Vec::new(),
            data: na::DVector::from_element(1, val),
        }
    }

    /// Create a new tensor from a flat, row-major element buffer.
    ///
    /// Fails if any index is repeated or has zero dimension, or if the buffer
    /// length does not match the total dimension of the indices.
    pub fn from_elems<I>(indices: I, elems: na::DVector<A>)
        -> TensorResult<Self>
    where I: IntoIterator<Item = T>
    {
        let indices: Vec<T> = indices.into_iter().collect();
        if !is_unique(&indices) { return Err(DuplicateIndices); }
        if indices.iter().any(|idx| idx.dim() == 0) {
            return Err(ZeroDimIndex);
        }
        if dim_prod(&indices) != elems.len() { return Err(IncompatibleElems); }
        Ok(Self { indices, data: elems })
    }

    /// Return the number of indices.
    pub fn rank(&self) -> usize { self.indices.len() }

    /// Return `true` if `self` has no indices.
    pub fn is_scalar(&self) -> bool { self.indices.is_empty() }

    /// If `self` has no indices, return its single element.
    pub fn scalar(&self) -> Option<A> {
        self.is_scalar().then(|| self.data[0])
    }

    /// Return a reference to the index list.
    pub fn indices(&self) -> &[T] { &self.indices }

    /// Return `true` if `self` holds `target` as an index.
    pub fn has_index(&self, target: &T) -> bool {
        self.indices.contains(target)
    }

    /// Return the element at a set of coordinates, given in index-list order.
    ///
    /// *Panics* if the number of coordinates does not match the rank of the
    /// tensor or any coordinate is out of bounds.
    pub fn get(&self, coords: &[usize]) -> A {
        let flat: usize =
            coords.iter().zip(strides(&self.indices))
            .map(|(c, s)| c * s)
            .sum();
        self.data[flat]
    }

    /// Apply a mapping function to all indices, leaving elements in place.
    ///
    /// *Panics* if the mapping changes the dimension of any index.
    pub fn map_indices<F, U>(self, map: F) -> Tensor<U, A>
    where
        F: FnMut(T) -> U,
        U: Idx,
    {
        let dims: Vec<usize> = self.indices.iter().map(Idx::dim).collect();
        let indices: Vec<U> = self.indices.into_iter().map(map).collect();
        let dims_ok =
            indices.iter().zip(&dims).all(|(idx, d)| idx.dim() == *d);
        assert!(dims_ok, "map_indices: index dimensions must be preserved");
        Tensor { indices, data: self.data }
    }

    /// Return the complex conjugate of `self`, with all indices unchanged.
    pub fn conj(&self) -> Self {
        Self {
            indices: self.indices.clone(),
            data: self.data.map(|a| a.conjugate()),
        }
    }

    /// Multiply all elements by `z` in place.
    pub fn scale_mut(&mut self, z: A) {
        self.data.iter_mut().for_each(|a| { *a = *a * z; });
    }

    /// Return the Frobenius norm of `self`, i.e. the square root of the sum of
    /// the absolute squares of all elements.
    pub fn norm(&self) -> A::Re { self.data.norm() }

    /// Return the first index of `self` that `other` also holds and that
    /// satisfies a predicate.
    pub fn common_index_with<F>(&self, other: &Self, mut pred: F) -> Option<T>
    where F: FnMut(&T) -> bool
    {
        self.indices.iter()
            .find(|idx| pred(idx) && other.indices.contains(idx))
            .cloned()
    }

    // rearrange to the index order given by positions into the current index
    // list; `perm` must be a valid permutation of 0..rank
    fn permute_positions(&self, perm: &[usize]) -> Self {
        let old_strides = strides(&self.indices);
        let gather: Vec<usize> =
            perm.iter().map(|&p| old_strides[p]).collect();
        let indices: Vec<T> =
            perm.iter().map(|&p| self.indices[p].clone()).collect();
        let dims: Vec<usize> = indices.iter().map(Idx::dim).collect();
        let len = self.data.len();
        let mut coords = vec![0; indices.len()];
        let data =
            na::DVector::from_iterator(
                len,
                (0..len).map(|k| {
                    decode(k, &dims, &mut coords);
                    let flat: usize =
                        coords.iter().zip(&gather)
                        .map(|(c, s)| c * s)
                        .sum();
                    self.data[flat]
                }),
            );
        Self { indices, data }
    }

    /// Return a copy of `self` with its indices rearranged to match `target`.
    ///
    /// Fails if `target` is not a rearrangement of the indices of `self`.
    pub fn permuted_to(&self, target: &[T]) -> TensorResult<Self> {
        if target.len() != self.indices.len() {
            return Err(IncompatibleIndices);
        }
        if self.indices.as_slice() == target { return Ok(self.clone()); }
        let perm: Vec<usize> =
            target.iter()
            .map(|t| {
                self.indices.iter().position(|idx| idx == t)
                    .ok_or(IncompatibleIndices)
            })
            .collect::<TensorResult<_>>()?;
        if !is_unique(&perm) { return Err(IncompatibleIndices); }
        Ok(self.permute_positions(&perm))
    }

    /// Flatten to a matrix whose rows run over the coordinates of `rows` and
    /// whose columns run over those of `cols`, both row-major.
    ///
    /// Fails if `rows` and `cols` together are not a rearrangement of the
    /// indices of `self`.
    pub fn to_matrix(&self, rows: &[T], cols: &[T])
        -> TensorResult<na::DMatrix<A>>
    {
        let order: Vec<T> = rows.iter().chain(cols).cloned().collect();
        let permuted = self.permuted_to(&order)?;
        let m = dim_prod(rows);
        let n = dim_prod(cols);
        Ok(na::DMatrix::from_row_iterator(
            m, n, permuted.data.iter().copied()))
    }

    /// Inverse of [`to_matrix`][Self::to_matrix]: unflatten a matrix into a
    /// tensor whose index list is `rows` followed by `cols`.
    ///
    /// Fails if the matrix dimensions do not match the index dimensions, or
    /// the combined index list is invalid.
    pub fn from_matrix(rows: Vec<T>, cols: Vec<T>, mat: &na::DMatrix<A>)
        -> TensorResult<Self>
    {
        if dim_prod(&rows) != mat.nrows() || dim_prod(&cols) != mat.ncols() {
            return Err(IncompatibleElems);
        }
        let indices: Vec<T> = rows.into_iter().chain(cols).collect();
        // matrix storage is column-major; transposing first makes a plain
        // iterator yield row-major order
        let data =
            na::DVector::from_iterator(
                mat.len(), mat.transpose().iter().copied());
        Self::from_elems(indices, data)
    }

    /// Contract `self` with `rhs` over all common indices.
    ///
    /// If no indices are shared, this is the tensor product; if all are, the
    /// result is a scalar. Scalar operands multiply elementwise into the
    /// other.
    ///
    /// This is also available through the `*` operator.
    pub fn contract(self, rhs: Self) -> Self {
        if self.is_scalar() {
            let a = self.data[0];
            return Self {
                indices: rhs.indices,
                data: rhs.data.map(|b| a * b),
            };
        }
        if rhs.is_scalar() {
            let b = rhs.data[0];
            return Self {
                indices: self.indices,
                data: self.data.map(|a| a * b),
            };
        }
        let common_l: Vec<usize> =
            self.indices.iter().enumerate()
            .filter(|(_, idx)| rhs.indices.contains(idx))
            .map(|(k, _)| k)
            .collect();
        let rest_l: Vec<usize> =
            (0..self.indices.len())
            .filter(|k| !common_l.contains(k))
            .collect();
        let common_r: Vec<usize> =
            common_l.iter()
            .map(|&k| {
                rhs.indices.iter()
                    .position(|idx| *idx == self.indices[k])
                    .unwrap_or(0) // position exists by construction
            })
            .collect();
        let rest_r: Vec<usize> =
            (0..rhs.indices.len())
            .filter(|k| !common_r.contains(k))
            .collect();
        let perm_l: Vec<usize> =
            rest_l.iter().chain(&common_l).copied().collect();
        let perm_r: Vec<usize> =
            common_r.iter().chain(&rest_r).copied().collect();
        let a = self.permute_positions(&perm_l);
        let b = rhs.permute_positions(&perm_r);
        let m: usize = rest_l.iter().map(|&k| self.indices[k].dim()).product();
        let d: usize =
            common_l.iter().map(|&k| self.indices[k].dim()).product();
        let n: usize = rest_r.iter().map(|&k| rhs.indices[k].dim()).product();
        let amat = na::DMatrix::from_row_iterator(m, d, a.data.iter().copied());
        let bmat = na::DMatrix::from_row_iterator(d, n, b.data.iter().copied());
        let cmat = amat * bmat;
        let indices: Vec<T> =
            rest_l.iter().map(|&k| self.indices[k].clone())
            .chain(rest_r.iter().map(|&k| rhs.indices[k].clone()))
            .collect();
        let data =
            na::DVector::from_iterator(
                m * n, cmat.transpose().iter().copied());
        Self { indices, data }
    }

    /// Compute the elementwise sum of `self` and `rhs`, rearranging indices as
    /// needed.
    ///
    /// Fails if the index sets of the two tensors are not equal.
    pub fn add_checked(self, rhs: Self) -> TensorResult<Self> {
        let rhs = rhs.permuted_to(&self.indices)?;
        Ok(Self { indices: self.indices, data: self.data + rhs.data })
    }

    /// Compute the elementwise difference of `self` and `rhs`, rearranging
    /// indices as needed.
    ///
    /// Fails if the index sets of the two tensors are not equal.
    pub fn sub_checked(self, rhs: Self) -> TensorResult<Self> {
        let rhs = rhs.permuted_to(&self.indices)?;
        Ok(Self { indices: self.indices, data: self.data - rhs.data })
    }

    /// Create the rank-2 identity ("delta") tensor over a pair of indices.
    ///
    /// Fails if the two indices are equal or their dimensions differ.
    pub fn delta(a: T, b: T) -> TensorResult<Self> {
        if a.dim() != b.dim() { return Err(IncompatibleIndices); }
        Self::new(
            [a, b],
            |coords| {
                if coords[0] == coords[1] { A::one() } else { A::zero() }
            },
        )
    }
}

/// Contraction via [`Tensor::contract`].
impl<T, A> std::ops::Mul<Tensor<T, A>> for Tensor<T, A>
where
    T: Idx,
    A: ComplexScalar,
{
    type Output = Tensor<T, A>;

    fn mul(self, rhs: Tensor<T, A>) -> Self::Output { self.contract(rhs) }
}

impl<T, A> fmt::Display for Tensor<T, A>
where
    T: Idx,
    A: ComplexScalar + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        let n = self.indices.len();
        for (k, idx) in self.indices.iter().enumerate() {
            write!(f, "{}<{}>", idx.label(), idx.dim())?;
            if k < n - 1 { write!(f, ", ")?; }
        }
        write!(f, " }} [")?;
        let len = self.data.len();
        for (k, a) in self.data.iter().enumerate() {
            write!(f, "{}", a)?;
            if k < len - 1 { write!(f, ", ")?; }
        }
        write!(f, "]")
    }
}

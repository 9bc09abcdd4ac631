//! Abelian quantum numbers for symmetric-state bookkeeping.
//!
//! A [`QN`] is a small fixed collection of conserved-quantity sectors, each a
//! [`QNVal`] carrying an integer value and a modulus that selects the
//! sector's arithmetic: modulus 1 means ordinary integer addition (a plain ℤ
//! charge such as total S<sup>z</sup>), modulus *m* > 1 means addition mod
//! *m* (a ℤ<sub>m</sub> charge such as a clock variable), and a negative
//! modulus marks the sector as fermionic, where the value's parity feeds
//! [`QN::parity_sign`]. A modulus of 0 marks the sector unused.

use std::{ cmp::Ordering, fmt, ops };
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QNError {
    /// Returned when arithmetic is attempted between quantum numbers whose
    /// sector moduli disagree.
    #[error("mismatched sector moduli: {a} vs {b}")]
    MismatchedMod { a: i32, b: i32 },
}
use QNError::*;
pub type QNResult<T> = Result<T, QNError>;

/// Number of sectors held by a [`QN`].
pub const QN_SIZE: usize = 4;

/// A single conserved-quantity sector: an integer value with a modulus
/// selecting ℤ (modulus ±1), ℤ<sub>m</sub> (modulus ±m, m > 1), or inactive
/// (modulus 0) arithmetic. Negative moduli mark fermionic sectors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct QNVal {
    val: i32,
    modulus: i32,
}

impl Default for QNVal {
    fn default() -> Self { Self { val: 0, modulus: 0 } }
}

impl QNVal {
    /// Create a plain ℤ sector.
    pub fn new(val: i32) -> Self { Self::with_mod(val, 1) }

    /// Create a sector with an explicit modulus, wrapping the value into
    /// canonical range if the modulus calls for modular arithmetic.
    pub fn with_mod(val: i32, modulus: i32) -> Self {
        let mut out = Self { val: 0, modulus };
        out.set(val);
        out
    }

    /// Return the sector value.
    pub fn val(&self) -> i32 { self.val }

    /// Return the sector modulus.
    pub fn modulus(&self) -> i32 { self.modulus }

    /// Return `true` if the sector is in use.
    pub fn is_active(&self) -> bool { self.modulus != 0 }

    /// Return `true` if the sector is fermionic.
    pub fn is_fermionic(&self) -> bool { self.modulus < 0 }

    fn set(&mut self, val: i32) {
        let m = self.modulus.abs();
        if m > 1 {
            self.val = val.rem_euclid(m);
        } else {
            self.val = val;
        }
    }

    fn combine(self, rhs: Self) -> QNResult<Self> {
        if self.modulus != rhs.modulus {
            return Err(MismatchedMod { a: self.modulus, b: rhs.modulus });
        }
        Ok(Self::with_mod(self.val + rhs.val, self.modulus))
    }
}

impl ops::Neg for QNVal {
    type Output = QNVal;

    fn neg(self) -> Self::Output { Self::with_mod(-self.val, self.modulus) }
}

impl fmt::Display for QNVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modulus == 1 {
            write!(f, "{}", self.val)
        } else {
            write!(f, "{}%{}", self.val, self.modulus)
        }
    }
}

/// A full quantum number: up to [`QN_SIZE`] conserved-quantity sectors.
///
/// Sectors are compared and combined positionally; arithmetic between two
/// `QN`s requires their sector moduli to agree everywhere. The `+`, `-`, and
/// unary `-` operators *panic* on mismatched moduli; use
/// [`checked_add`][Self::checked_add] to handle the error instead.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct QN {
    vals: [QNVal; QN_SIZE],
}

impl QN {
    /// Create a quantum number from up to [`QN_SIZE`] sectors; the rest stay
    /// inactive.
    ///
    /// *Panics* if more than [`QN_SIZE`] sectors are provided.
    pub fn from_vals(vals: &[QNVal]) -> Self {
        assert!(
            vals.len() <= QN_SIZE,
            "QN holds at most {} sectors", QN_SIZE,
        );
        let mut out = Self::default();
        out.vals[..vals.len()].copy_from_slice(vals);
        out
    }

    /// Return the sector at position `k`.
    pub fn sector(&self, k: usize) -> QNVal { self.vals[k] }

    /// Return the number of active sectors.
    pub fn num_active(&self) -> usize {
        self.vals.iter().filter(|v| v.is_active()).count()
    }

    /// Return `true` if any sector is fermionic.
    pub fn is_fermionic(&self) -> bool {
        self.vals.iter().any(|v| v.is_fermionic())
    }

    /// Return the fermionic parity of the quantum number: −1 if the summed
    /// values of the fermionic sectors are odd, +1 otherwise.
    pub fn parity_sign(&self) -> i32 {
        let odd =
            self.vals.iter()
            .filter(|v| v.is_fermionic())
            .map(|v| v.val())
            .sum::<i32>()
            .rem_euclid(2);
        if odd == 1 { -1 } else { 1 }
    }

    /// Combine sector-wise with `rhs`, failing if any pair of sector moduli
    /// disagree.
    pub fn checked_add(self, rhs: Self) -> QNResult<Self> {
        let mut out = Self::default();
        for (k, (a, b)) in
            self.vals.into_iter().zip(rhs.vals).enumerate()
        {
            out.vals[k] = a.combine(b)?;
        }
        Ok(out)
    }
}

impl ops::Add for QN {
    type Output = QN;

    /// *Panics* if any pair of sector moduli disagree.
    fn add(self, rhs: QN) -> Self::Output {
        match self.checked_add(rhs) {
            Ok(out) => out,
            Err(err) => panic!("QN addition: {}", err),
        }
    }
}

impl ops::Neg for QN {
    type Output = QN;

    fn neg(self) -> Self::Output {
        let mut out = self;
        out.vals.iter_mut().for_each(|v| { *v = -*v; });
        out
    }
}

impl ops::Sub for QN {
    type Output = QN;

    /// *Panics* if any pair of sector moduli disagree.
    fn sub(self, rhs: QN) -> Self::Output { self + (-rhs) }
}

impl PartialOrd for QN {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Positional lexicographic order over sector values; meaningful only
/// between quantum numbers with matching moduli.
impl Ord for QN {
    fn cmp(&self, other: &Self) -> Ordering {
        self.vals.iter().map(QNVal::val)
            .cmp(other.vals.iter().map(QNVal::val))
    }
}

impl fmt::Display for QN {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QN(")?;
        let mut first = true;
        for v in self.vals.iter().filter(|v| v.is_active()) {
            if !first { write!(f, ", ")?; }
            write!(f, "{}", v)?;
            first = false;
        }
        write!(f, ")")
    }
}

/// A total-S<sup>z</sup> quantum number (in units of 1/2).
pub fn spin(sz: i32) -> QN { QN::from_vals(&[QNVal::new(sz)]) }

/// A boson-number quantum number.
pub fn boson(n: i32) -> QN { QN::from_vals(&[QNVal::new(n)]) }

/// Combined S<sup>z</sup> and boson-number quantum numbers.
pub fn spinboson(sz: i32, n: i32) -> QN {
    QN::from_vals(&[QNVal::new(sz), QNVal::new(n)])
}

/// A fermion-number quantum number; the sector is marked fermionic.
pub fn fermion(n: i32) -> QN { QN::from_vals(&[QNVal::with_mod(n, -1)]) }

/// A fermion-parity quantum number, conserved mod 2.
pub fn fparity(p: i32) -> QN { QN::from_vals(&[QNVal::with_mod(p, -2)]) }

/// Combined particle-number and S<sup>z</sup> quantum numbers for electrons.
pub fn electron(nf: i32, sz: i32) -> QN {
    QN::from_vals(&[QNVal::with_mod(nf, -1), QNVal::new(sz)])
}

/// Combined fermion-parity and S<sup>z</sup> quantum numbers.
pub fn elparity(p: i32, sz: i32) -> QN {
    QN::from_vals(&[QNVal::with_mod(p, -2), QNVal::new(sz)])
}

/// A ℤ<sub>m</sub> clock quantum number.
pub fn clock(n: i32, m: i32) -> QN { QN::from_vals(&[QNVal::with_mod(n, m)]) }

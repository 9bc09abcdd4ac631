use mps_canon::{
    mps::{ GateOptions, MPS, MPSError },
    tensor::Idx,
};
use nalgebra as na;
use num_complex::Complex64 as C64;
use rand::{ rngs::StdRng, Rng, SeedableRng };

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Spin(usize);

impl Idx for Spin {
    fn dim(&self) -> usize { 2 }
}

fn sites(n: usize) -> Vec<Spin> { (0..n).map(Spin).collect() }

fn rand_unitary(rng: &mut StdRng) -> na::DMatrix<C64> {
    let m: na::DMatrix<C64> =
        na::DMatrix::from_fn(4, 4, |_, _| {
            C64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5)
        });
    m.qr().q()
}

fn entangled(n: usize, seed: u64) -> MPS<Spin, C64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut psi: MPS<Spin, C64> = MPS::new(sites(n)).unwrap();
    psi.position(0).unwrap();
    let opts = GateOptions::default();
    for _ in 0..n - 1 {
        psi.apply_gate(&rand_unitary(&mut rng), &(), &opts).unwrap();
    }
    psi
}

// X ⊗ X on neighboring sites; flips both qubits
fn xx() -> na::DMatrix<C64> {
    na::DMatrix::from_fn(4, 4, |r, c| {
        if r + c == 3 { C64::new(1.0, 0.0) } else { C64::new(0.0, 0.0) }
    })
}

#[test]
fn overlap_of_product_states() {
    let psi: MPS<Spin, C64> = MPS::new(sites(3)).unwrap();
    let z = MPS::overlap(&psi, &psi).unwrap();
    assert!((z.re - 1.0).abs() < 1e-12);
    assert!(z.im.abs() < 1e-12);

    // flipping two qubits makes the states orthogonal
    let mut phi = psi.clone();
    phi.position(0).unwrap();
    phi.apply_gate(&xx(), &(), &GateOptions::default()).unwrap();
    let z = MPS::overlap(&psi, &phi).unwrap();
    assert!(z.norm() < 1e-12);
}

#[test]
fn overlap_conjugate_symmetry() {
    let psi = entangled(4, 1);
    let phi = entangled(4, 2);
    let zab = MPS::overlap(&psi, &phi).unwrap();
    let zba = MPS::overlap(&phi, &psi).unwrap();
    assert!((zab - zba.conj()).norm() < 1e-12);
    // generic random states overlap at less than unit magnitude
    assert!(zab.norm() < 1.0);
}

#[test]
fn overlap_re_drops_imaginary_part() {
    let psi = entangled(3, 10);
    let phi = entangled(3, 20);
    let z = MPS::overlap(&psi, &phi).unwrap();
    let re = MPS::overlap_re(&psi, &phi).unwrap();
    assert_eq!(re, z.re);
}

#[test]
fn overlap_length_mismatch() {
    let psi = entangled(3, 1);
    let phi = entangled(4, 1);
    assert!(matches!(
        MPS::overlap(&psi, &phi),
        Err(MPSError::LengthMismatch { a: 3, b: 4 }),
    ));
    assert!(matches!(
        psi.add(&phi),
        Err(MPSError::LengthMismatch { a: 3, b: 4 }),
    ));
}

#[test]
fn add_doubles_amplitudes() {
    let psi: MPS<Spin, C64> = MPS::new(sites(3)).unwrap();
    let mut sum = psi.add(&psi).unwrap();
    // direct-sum embedding: bond dimensions add, no orthogonality claims
    assert_eq!(sum.bond_dim(0), Some(2));
    assert_eq!(sum.bond_dim(1), Some(2));
    assert_eq!(sum.left_lim(), -1);
    assert_eq!(sum.right_lim(), 3);
    sum.position(0).unwrap();
    assert!((sum.norm().unwrap() - 2.0).abs() < 1e-10);
}

#[test]
fn add_is_exact() {
    let a = entangled(4, 31);
    let b = entangled(4, 32);
    let w = entangled(4, 33);
    let s = a.add(&b).unwrap();
    for bond in 0..3 {
        assert_eq!(
            s.bond_dim(bond),
            Some(a.bond_dim(bond).unwrap() + b.bond_dim(bond).unwrap()),
        );
    }
    // ⟨w|a + b⟩ = ⟨w|a⟩ + ⟨w|b⟩ exactly
    let za = MPS::overlap(&w, &a).unwrap();
    let zb = MPS::overlap(&w, &b).unwrap();
    let zs = MPS::overlap(&w, &s).unwrap();
    assert!((zs - (za + zb)).norm() < 1e-10);
}

#[test]
fn single_site_addition() {
    let psi: MPS<Spin, C64> = MPS::new(sites(1)).unwrap();
    let sum = psi.add(&psi).unwrap();
    assert_eq!(sum.len(), 1);
    // one site has no bonds; the sum is a plain tensor add and the state
    // stays trivially centered
    assert!(sum.is_ortho());
    assert!((sum.norm().unwrap() - 2.0).abs() < 1e-12);
}

#[test]
fn tree_sum_matches_sequential() {
    for nt in 1..=5 {
        let terms: Vec<MPS<Spin, C64>> =
            (0..nt).map(|k| entangled(3, 100 + k as u64)).collect();
        let tree = MPS::sum(&terms).unwrap();
        let mut seq = terms[0].clone();
        for t in &terms[1..] {
            seq = seq.add(t).unwrap();
        }
        let w = entangled(3, 999);
        let zt = MPS::overlap(&w, &tree).unwrap();
        let zs = MPS::overlap(&w, &seq).unwrap();
        assert!((zt - zs).norm() < 1e-10, "nt = {}", nt);
        // both representations hold the same state with the same total norm
        let nt2 = MPS::overlap(&tree, &tree).unwrap();
        let ns2 = MPS::overlap(&seq, &seq).unwrap();
        assert!((nt2 - ns2).norm() < 1e-8, "nt = {}", nt);
    }
}

#[test]
fn empty_sum_is_default() {
    let terms: Vec<MPS<Spin, C64>> = Vec::new();
    let s = MPS::sum(&terms).unwrap();
    assert!(s.is_empty());
    assert!(matches!(s.sites(), Err(MPSError::NoSiteSet)));
}

#[test]
fn singleton_sum_is_identity() {
    let terms = vec![entangled(3, 77)];
    let s = MPS::sum(&terms).unwrap();
    let z = MPS::overlap(&terms[0], &s).unwrap();
    assert!((z.re - 1.0).abs() < 1e-10);
    assert_eq!(s.left_lim(), terms[0].left_lim());
    assert_eq!(s.right_lim(), terms[0].right_lim());
}

#[test]
fn sum_then_recompress() {
    let terms: Vec<MPS<Spin, C64>> =
        (0..4).map(|k| entangled(4, 200 + k as u64)).collect();
    let mut s = MPS::sum(&terms).unwrap();
    let fat = s.max_bond_dim();
    s.position(0).unwrap();
    // sweeping restores a center and compresses away the padding the
    // direct-sum embedding introduced
    assert!(s.check_ortho());
    assert!(s.max_bond_dim() <= fat);
    let nrm = s.norm().unwrap();
    let n2 = MPS::overlap(&s, &s).unwrap();
    assert!((n2.re - nrm * nrm).abs() < 1e-8);
}

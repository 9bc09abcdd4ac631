use mps_canon::{
    mps::{
        BondOptions, DiagonalNoise, Direction, GateOptions, MPS, MPSError,
    },
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

// Haar-ish random two-site unitary from the QR decomposition of a random
// complex matrix
fn rand_unitary(rng: &mut StdRng) -> na::DMatrix<C64> {
    let m: na::DMatrix<C64> =
        na::DMatrix::from_fn(4, 4, |_, _| {
            C64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5)
        });
    m.qr().q()
}

// product state entangled by a right-moving staircase of random two-site
// unitaries; leaves the orthogonality center at the last site
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

#[test]
fn product_state_basics() {
    let mut psi: MPS<Spin, C64> = MPS::new(sites(4)).unwrap();
    assert_eq!(psi.len(), 4);
    assert_eq!(psi.left_lim(), -1);
    assert_eq!(psi.right_lim(), 4);
    assert!(!psi.is_ortho());
    assert!(matches!(psi.norm(), Err(MPSError::NotOrtho)));
    assert_eq!(psi.sites().unwrap().len(), 4);
    assert_eq!(psi.max_bond_dim(), 1);
    assert_eq!(psi.avg_bond_dim(), 1.0);

    psi.position(0).unwrap();
    assert!(psi.is_ortho());
    assert_eq!(psi.ortho_center().unwrap(), 0);
    assert_eq!(psi.left_lim(), -1);
    assert_eq!(psi.right_lim(), 1);
    assert!((psi.norm().unwrap() - 1.0).abs() < 1e-12);
    assert!(psi.check_ortho());
}

#[test]
fn empty_system_rejected() {
    let err = MPS::<Spin, C64>::new(Vec::new());
    assert!(matches!(err, Err(MPSError::EmptySystem)));

    let def = MPS::<Spin, C64>::default();
    assert!(def.is_empty());
    assert!(matches!(def.sites(), Err(MPSError::NoSiteSet)));
}

#[test]
fn gates_advance_frontiers() {
    let mut rng = StdRng::seed_from_u64(17);
    let n = 5;
    let mut psi: MPS<Spin, C64> = MPS::new(sites(n)).unwrap();
    psi.position(0).unwrap();
    let opts = GateOptions::default();
    for step in 0..n - 1 {
        psi.apply_gate(&rand_unitary(&mut rng), &(), &opts).unwrap();
        assert_eq!(psi.ortho_center().unwrap(), step + 1);
        assert!(psi.check_ortho());
        assert!((psi.norm().unwrap() - 1.0).abs() < 1e-10);
    }
}

#[test]
fn position_is_lossless() {
    let psi = entangled(5, 42);
    let mut moved = psi.clone();
    moved.position(2).unwrap();
    assert_eq!(moved.ortho_center().unwrap(), 2);
    assert!(moved.check_ortho());
    moved.position(0).unwrap();
    assert_eq!(moved.ortho_center().unwrap(), 0);
    // sweeping is exact: the moved state still overlaps the original at unity
    let z = MPS::overlap(&psi, &moved).unwrap();
    assert!((z.re - 1.0).abs() < 1e-10);
    assert!(z.im.abs() < 1e-10);
}

#[test]
fn exact_split_is_lossless() {
    let mut psi = entangled(4, 7);
    psi.position(1).unwrap();
    let aa = psi.bond_tensor(1).unwrap();
    let spec =
        psi.svd_bond(
            1,
            aa.clone(),
            Direction::Fromleft,
            &(),
            &BondOptions::default().with_svd(true),
        )
        .unwrap();
    assert!(spec.truncerr() < 1e-12);
    let rebuilt = psi.bond_tensor(1).unwrap();
    let diff = rebuilt.sub_checked(aa).unwrap();
    assert!(diff.norm() < 1e-10);
    assert_eq!(psi.ortho_center().unwrap(), 2);
}

#[test]
fn frontier_violations_rejected() {
    let mut psi = entangled(4, 3);
    // center at site 3: everything left of it is left-orthogonal, so a
    // right-moving update far from the center is fine...
    let aa = psi.bond_tensor(0).unwrap();
    let res =
        psi.clone().svd_bond(
            0, aa.clone(), Direction::Fromleft, &(), &BondOptions::default());
    assert!(res.is_ok());
    // ...but claiming right-orthogonality at bond 0 is not
    let res =
        psi.svd_bond(
            0, aa, Direction::Fromright, &(), &BondOptions::default());
    assert!(matches!(res, Err(MPSError::OrthoViolation { .. })));
}

#[test]
fn bond_tensor_shape_checked() {
    let mut psi = entangled(3, 11);
    psi.position(0).unwrap();
    // a bond tensor for the wrong bond carries the wrong indices
    let aa = psi.bond_tensor(1).unwrap();
    let res =
        psi.svd_bond(
            0, aa, Direction::Fromleft, &(), &BondOptions::default());
    assert!(matches!(res, Err(MPSError::BondTensorShape { b: 0 })));
}

#[test]
fn truncation_is_monotonic_in_cutoff() {
    let base = entangled(4, 1234);
    let mut prev_rank = usize::MAX;
    let mut prev_err = -1.0;
    // all cutoffs loose enough to select the density-matrix mode
    for cutoff in [1e-8, 1e-4, 1e-2, 0.5] {
        let mut psi = base.clone();
        psi.position(1).unwrap();
        let aa = psi.bond_tensor(1).unwrap();
        let spec =
            psi.svd_bond(
                1,
                aa,
                Direction::Fromleft,
                &(),
                &BondOptions::default().with_cutoff(cutoff),
            )
            .unwrap();
        assert!(spec.rank() <= prev_rank);
        assert!(spec.truncerr() >= prev_err);
        assert_eq!(psi.bond_dim(1), Some(spec.rank()));
        prev_rank = spec.rank();
        prev_err = spec.truncerr();
    }
}

#[test]
fn maxdim_caps_bond_dimension() {
    let mut psi = entangled(4, 99);
    psi.position(1).unwrap();
    let aa = psi.bond_tensor(1).unwrap();
    let spec =
        psi.svd_bond(
            1,
            aa,
            Direction::Fromleft,
            &(),
            &BondOptions::default().with_svd(true).with_maxdim(1),
        )
        .unwrap();
    assert_eq!(spec.rank(), 1);
    assert_eq!(psi.bond_dim(1), Some(1));
    assert!(psi.check_ortho());
}

#[test]
fn normalize_rescales_center() {
    let mut psi = entangled(3, 5);
    psi.position(0).unwrap();
    // a non-unitary "gate" scales the state
    let op = na::DMatrix::<C64>::identity(4, 4) * C64::new(3.0, 0.0);
    psi.apply_gate(&op, &(), &GateOptions::default()).unwrap();
    let nrm = psi.norm().unwrap();
    assert!((nrm - 3.0).abs() < 1e-10);
    let prev = psi.normalize().unwrap();
    assert!((prev - nrm).abs() < 1e-12);
    assert!((psi.norm().unwrap() - 1.0).abs() < 1e-12);
}

#[test]
fn zero_norm_rejected() {
    let mut psi: MPS<Spin, C64> = MPS::new(sites(3)).unwrap();
    psi.position(0).unwrap();
    let op = na::DMatrix::<C64>::zeros(4, 4);
    psi.apply_gate(&op, &(), &GateOptions::default()).unwrap();
    assert!(matches!(psi.normalize(), Err(MPSError::ZeroNorm)));
}

#[test]
fn normalize_option_in_density_matrix_mode() {
    let mut psi = entangled(4, 21);
    psi.position(1).unwrap();
    let aa = psi.bond_tensor(1).unwrap();
    psi.svd_bond(
        1,
        aa,
        Direction::Fromleft,
        &(),
        &BondOptions::default().with_cutoff(1e-2).with_normalize(true),
    )
    .unwrap();
    // truncation changed the state, but the center was rescaled to unit norm
    assert!((psi.norm().unwrap() - 1.0).abs() < 1e-12);
    assert!(psi.check_ortho());
}

#[test]
fn diagonal_noise_restores_rank() {
    let mut psi: MPS<Spin, C64> = MPS::new(sites(3)).unwrap();
    psi.position(0).unwrap();
    let aa = psi.bond_tensor(0).unwrap();
    let spec =
        psi.svd_bond(
            0,
            aa,
            Direction::Fromleft,
            &DiagonalNoise,
            &BondOptions::default()
                .with_cutoff(1e-10)
                .with_noise(1e-4)
                .with_normalize(true),
        )
        .unwrap();
    // the perturbation lifts the zero eigenvalue of the rank-1 density
    // matrix, so the new bond keeps both directions
    assert_eq!(spec.rank(), 2);
    assert_eq!(psi.bond_dim(0), Some(2));
    assert!((psi.norm().unwrap() - 1.0).abs() < 1e-12);
}

#[test]
fn bond_dim_queries() {
    let psi = entangled(5, 8);
    let n = psi.len();
    for b in 0..n - 1 {
        let d = psi.bond_dim(b).unwrap();
        assert!(d >= 1);
        assert!(d <= psi.max_bond_dim());
    }
    assert!(psi.avg_bond_dim() <= psi.max_bond_dim() as f64);
    assert!(psi.bond_dim(n - 1).is_none());
}

use spsim_common::{InitialConditions, Potential, SplittingScheme};
use spsim_simulator::simulation_object::{SimulationObject, SimulationParameters};

fn gauss_parameters(
    space_steps: Vec<usize>,
    space_step_size: Vec<f64>,
    time_steps: usize,
    dt: f64,
    gravity: f64,
) -> SimulationParameters {
    let dims = space_steps.len();
    SimulationParameters::new(
        "integration-test".to_string(),
        time_steps,
        dt,
        space_steps,
        space_step_size,
        gravity,
        SplittingScheme::LieTrotter,
        true,
        InitialConditions::ColdGauss {
            mean: vec![0.0; dims],
            std: vec![1.0; dims],
        },
        Potential::default(),
    )
    .expect("valid parameters")
}

fn run(parameters: SimulationParameters) -> SimulationObject {
    let mut sim = SimulationObject::new_from_params(parameters).expect("failed to build simulation");
    sim.run_to_completion().expect("failed to run simulation");
    sim
}

/// Density-weighted mean of x over the points with x > 0
fn right_half_center(sim: &SimulationObject, t: usize) -> f64 {
    let x = sim.grid.axes()[0].values();
    let ψ = sim.grid.slice_at(t);
    let (moment, mass) = x
        .iter()
        .zip(ψ.iter())
        .filter(|(x, _)| **x > 0.0)
        .fold((0.0, 0.0), |(moment, mass), (&x, ψ)| {
            (moment + x * ψ.norm_sqr(), mass + ψ.norm_sqr())
        });
    moment / mass
}

#[test]
fn test_free_gauss_1d_small_grid() {
    // Gather requirements for unit test
    use approx::assert_abs_diff_eq;

    let sim = run(gauss_parameters(vec![8], vec![0.5], 10, 0.1, 0.0));

    assert_eq!(sim.grid.values().shape(), &[10, 8]);
    assert_abs_diff_eq!(sim.grid.diagnostic_at(0), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(
        sim.grid.diagnostic_at(0),
        sim.grid.diagnostic_at(9),
        epsilon = 1e-10
    );

    // The kinetic step moves the field even though the diagnostic does not
    let change = sim
        .grid
        .slice_at(9)
        .iter()
        .zip(sim.grid.slice_at(0).iter())
        .fold(0.0, |acc: f64, (x, y)| acc + (x - y).norm());
    assert!(change > 1e-6, "field did not evolve: {change}");
}

#[test]
fn test_norm_preserved_free_2d() {
    use approx::assert_abs_diff_eq;

    let sim = run(gauss_parameters(vec![32, 24], vec![0.5, 0.5], 20, 0.1, 0.0));
    for &norm in sim.grid.diagnostic().iter() {
        assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-10);
    }
}

#[test]
fn test_norm_preserved_with_gravity_and_external_potential() {
    use approx::assert_abs_diff_eq;

    for scheme in [SplittingScheme::LieTrotter, SplittingScheme::Strang] {
        let mut parameters = gauss_parameters(vec![32, 32], vec![0.5, 0.5], 20, 0.05, 5.0);
        parameters.scheme = scheme;
        parameters.potential = Potential::Harmonic {
            strength: 0.05,
            perturbation: 0.1,
        };

        let sim = run(parameters);
        for &norm in sim.grid.diagnostic().iter() {
            assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-10);
        }
    }
}

#[test]
fn test_runs_are_deterministic() {
    let parameters = gauss_parameters(vec![64], vec![0.25], 15, 0.05, 10.0);
    let first = run(parameters.clone());
    let second = run(parameters);

    assert_eq!(first.grid.values(), second.grid.values());
    assert_eq!(first.grid.diagnostic(), second.grid.diagnostic());
}

#[test]
fn test_degenerate_2d_matches_1d() {
    let line = run(gauss_parameters(vec![64], vec![0.25], 12, 0.05, 2.0));
    let plane = run(gauss_parameters(vec![64, 1], vec![0.25, 1.0], 12, 0.05, 2.0));

    assert_eq!(plane.grid.values().shape(), &[12, 64, 1]);
    for t in 0..12 {
        let difference = line
            .grid
            .slice_at(t)
            .iter()
            .zip(plane.grid.slice_at(t).iter())
            .fold(0.0, |acc: f64, (x, y)| acc.max((x - y).norm()));
        assert!(difference < 1e-8, "t = {t}: {difference}");
        assert!((line.grid.diagnostic_at(t) - plane.grid.diagnostic_at(t)).abs() < 1e-12);
    }
}

#[test]
fn test_free_gauss_spreads() {
    let sim = run(gauss_parameters(vec![128], vec![0.25], 21, 0.1, 0.0));

    let peak = |t: usize| {
        sim.grid
            .slice_at(t)
            .iter()
            .map(|ψ| ψ.norm_sqr())
            .fold(0.0, f64::max)
    };
    assert!(peak(20) < 0.97 * peak(0), "{} vs {}", peak(20), peak(0));
}

#[test]
fn test_two_bumps_attract() {
    let two_bump = |gravity: f64| {
        let mut parameters = gauss_parameters(vec![128], vec![0.25], 41, 0.05, gravity);
        parameters.ics = InitialConditions::GaussianSum {
            means: vec![vec![-4.0], vec![4.0]],
            std: vec![1.0],
        };
        run(parameters)
    };

    let free = two_bump(0.0);
    let bound = two_bump(20.0);

    let initial = right_half_center(&free, 0);
    assert!((initial - 4.0).abs() < 0.05);
    assert!((right_half_center(&free, 40) - initial).abs() < 0.05);
    assert!(right_half_center(&bound, 40) < right_half_center(&free, 40) - 0.3);
}

#[test]
fn test_step_by_step_matches_run_to_completion() {
    let parameters = gauss_parameters(vec![32], vec![0.5], 8, 0.1, 3.0);
    let batch = run(parameters.clone());

    let mut stepped = SimulationObject::new_from_params(parameters).unwrap();
    while stepped.not_finished() {
        stepped.update().unwrap();
    }

    assert_eq!(batch.grid.values(), stepped.grid.values());
    assert_eq!(batch.grid.diagnostic(), stepped.grid.diagnostic());
}

#[test]
fn test_missing_initial_condition() {
    use spsim_simulator::{
        field::FieldState,
        simulation_object::SplitOperatorIntegrator,
        utils::{error::RuntimeError, grid::Mesh},
    };

    let mesh = Mesh::from_steps(&[16, 16], &[0.5, 0.5]).unwrap();
    let mut state = FieldState::new(5, mesh.clone()).unwrap();
    let mut integrator = SplitOperatorIntegrator::new(
        &mesh,
        &|x: &[f64]| x[0] * x[0],
        1.0,
        0.1,
        SplittingScheme::Strang,
    );

    assert!(matches!(
        integrator.step(&mut state),
        Err(RuntimeError::MissingInitialCondition)
    ));
    assert_eq!(state.filled(), 0);
}

#[test]
fn test_example_configs_are_valid() {
    use spsim_common::{read_toml, REFERENCE_GRAVITY_1D, REFERENCE_GRAVITY_2D};
    use spsim_simulator::utils::grid::Dimensions;

    let configs = concat!(env!("CARGO_MANIFEST_DIR"), "/../configs");
    for (file, dims) in [
        ("two_bump_1d.toml", Dimensions::One),
        ("two_bump_2d.toml", Dimensions::Two),
        ("harmonic_strang_2d.toml", Dimensions::Two),
    ] {
        let toml = read_toml(&format!("{configs}/{file}")).unwrap();
        let parameters = SimulationParameters::from_toml(toml).unwrap();
        assert_eq!(parameters.dims, dims, "{file}");

        // The two-bump setups use the reference coupling of their dimensionality
        if file.starts_with("two_bump") {
            let gravity = match dims {
                Dimensions::One => REFERENCE_GRAVITY_1D,
                Dimensions::Two => REFERENCE_GRAVITY_2D,
            };
            assert_eq!(parameters.gravity, gravity, "{file}");
        }
    }
}

#[test]
fn test_dump() {
    use ndarray::{Array1, ArrayD};
    use ndarray_npy::read_npy;

    let sim = run(gauss_parameters(vec![16], vec![0.5], 4, 0.1, 1.0));
    let root = std::env::temp_dir().join(format!("spsim-dump-test-{}", std::process::id()));
    let dir = sim.dump(&root).unwrap();
    assert_eq!(dir, root.join("integration-test"));

    let real: ArrayD<f64> = read_npy(dir.join("psi_real.npy")).unwrap();
    let imag: ArrayD<f64> = read_npy(dir.join("psi_imag.npy")).unwrap();
    assert_eq!(real.shape(), &[4, 16]);
    assert_eq!(real, sim.grid.values().mapv(|ψ| ψ.re));
    assert_eq!(imag, sim.grid.values().mapv(|ψ| ψ.im));

    let diagnostic: Array1<f64> = read_npy(dir.join("diagnostic.npy")).unwrap();
    assert_eq!(&diagnostic, sim.grid.diagnostic());

    let axis: Array1<f64> = read_npy(dir.join("axis_0.npy")).unwrap();
    assert_eq!(axis.to_vec(), sim.grid.axes()[0].values());

    let metadata = std::fs::read_to_string(dir.join("metadata.toml")).unwrap();
    assert!(metadata.contains("sim_name = \"integration-test\""));
    assert!(metadata.contains("Split-Operator Poisson (Lie-Trotter)"));

    std::fs::remove_dir_all(&root).unwrap();
}

/// Coordinates of a centered axis of `n` points spaced `dx`
fn centered_axis(n: usize, dx: f64) -> Vec<f64> {
    let mut offset = -((n / 2) as f64) * dx;
    if n % 2 == 0 {
        offset += dx / 2.0;
    }
    (0..n).map(|i| offset + i as f64 * dx).collect()
}

/// Unregularized angular wavenumbers of a centered axis, in DFT order
fn axis_wavenumbers(n: usize, dx: f64) -> Vec<f64> {
    use std::f64::consts::PI;

    let last = centered_axis(n, dx)[n - 1];
    (0..n)
        .map(|i| {
            let j = if i <= (n - 1) / 2 {
                i as f64
            } else {
                i as f64 - n as f64
            };
            j / n as f64 * (n as f64 / 2.0) * PI / last
        })
        .collect()
}

/// Direct O(N²) DFT. `sign = -1` is the forward transform, `sign = 1` the inverse with its `1/N`
fn direct_dft(
    values: &ndarray::ArrayD<ndrustfft::Complex<f64>>,
    sign: f64,
) -> ndarray::ArrayD<ndrustfft::Complex<f64>> {
    use ndarray::{ArrayD, IxDyn};
    use ndrustfft::Complex;
    use std::f64::consts::PI;

    let shape = values.shape().to_vec();
    let size: usize = shape.iter().product();
    let output = ArrayD::from_shape_fn(IxDyn(&shape), |k| {
        values
            .indexed_iter()
            .fold(Complex::new(0.0, 0.0), |acc, (j, &value)| {
                let turns: f64 = (0..shape.len())
                    .map(|d| ((k[d] * j[d]) % shape[d]) as f64 / shape[d] as f64)
                    .sum();
                acc + value * Complex::new(0.0, sign * 2.0 * PI * turns).exp()
            })
    });
    if sign > 0.0 {
        output.mapv(|z| z / size as f64)
    } else {
        output
    }
}

/// One Lie-Trotter step written out term by term on top of `direct_dft`
fn reference_step(
    ψ: &ndarray::ArrayD<ndrustfft::Complex<f64>>,
    space_step_size: &[f64],
    gravity: f64,
    dt: f64,
    external: impl Fn(&[f64]) -> f64,
) -> ndarray::ArrayD<ndrustfft::Complex<f64>> {
    use ndarray::{ArrayD, IxDyn};
    use ndrustfft::Complex;
    use spsim_common::ZERO_MODE_SENTINEL;

    let shape = ψ.shape().to_vec();
    let x: Vec<Vec<f64>> = shape
        .iter()
        .zip(space_step_size)
        .map(|(&n, &dx)| centered_axis(n, dx))
        .collect();
    let k: Vec<Vec<f64>> = shape
        .iter()
        .zip(space_step_size)
        .map(|(&n, &dx)| axis_wavenumbers(n, dx))
        .collect();
    let k2 = |i: &IxDyn| -> f64 { (0..shape.len()).map(|d| k[d][i[d]].powi(2)).sum() };

    // Forward transforms of ψ and of the density
    let mut ψk = direct_dft(ψ, -1.0);
    let ρk = direct_dft(&ψ.mapv(|z| Complex::new(z.norm_sqr(), 0.0)), -1.0);

    // Poisson solve, with the sentinel standing in for |k| at the origin
    let mut φk = ArrayD::from_elem(IxDyn(&shape), Complex::new(0.0, 0.0));
    φk.indexed_iter_mut().zip(ρk.iter()).for_each(|((i, φ), &ρ)| {
        let origin = (0..shape.len()).all(|d| i[d] == 0);
        let k2 = if origin {
            ZERO_MODE_SENTINEL.powi(2)
        } else {
            k2(&i)
        };
        *φ = -ρ / k2;
    });

    // Kinetic phase
    ψk.indexed_iter_mut().for_each(|(i, z)| *z *= Complex::new(0.0, -0.5 * k2(&i) * dt).exp());

    // Back to position space, then the potential phase
    let mut next = direct_dft(&ψk, 1.0);
    let φ = direct_dft(&φk, 1.0).mapv(|z| z.re);
    next.indexed_iter_mut().zip(φ.iter()).for_each(|((i, z), &φ)| {
        let coordinates: Vec<f64> = (0..shape.len()).map(|d| x[d][i[d]]).collect();
        let v = gravity * φ + external(&coordinates);
        *z *= Complex::new(0.0, -v * dt).exp();
    });
    next
}

fn max_difference(
    a: &ndarray::ArrayViewD<ndrustfft::Complex<f64>>,
    b: &ndarray::ArrayViewD<ndrustfft::Complex<f64>>,
) -> f64 {
    a.iter()
        .zip(b.iter())
        .fold(0.0, |acc: f64, (x, y)| acc.max((x - y).norm()))
}

#[test]
fn test_first_step_matches_direct_transform() {
    use approx::assert_abs_diff_eq;

    // Asymmetric two-bump fields, with gravity and a harmonic trap, in 1D and on a non-square 2D grid
    let cases = [
        (
            vec![8],
            vec![0.5],
            vec![vec![-1.0], vec![0.75]],
            vec![0.6],
        ),
        (
            vec![6, 4],
            vec![0.5, 0.75],
            vec![vec![-0.8, 0.3], vec![0.6, -0.5]],
            vec![0.7, 0.9],
        ),
    ];
    let (gravity, dt, strength, perturbation) = (5.0, 0.05, 0.3, 0.2);

    for (space_steps, space_step_size, means, std) in cases {
        let mut parameters =
            gauss_parameters(space_steps, space_step_size.clone(), 2, dt, gravity);
        parameters.ics = InitialConditions::GaussianSum { means, std };
        parameters.potential = Potential::Harmonic {
            strength,
            perturbation,
        };
        let sim = run(parameters);

        let expected = reference_step(
            &sim.grid.slice_at(0).to_owned(),
            &space_step_size,
            gravity,
            dt,
            |x: &[f64]| strength * x.iter().map(|x| x * x).sum::<f64>() + perturbation,
        );

        // The zero-mode sentinel puts a constant of order 1e7 into Φ, so agreement is
        // limited by the rounding of that constant rather than by the transforms
        let difference = max_difference(&sim.grid.slice_at(1), &expected.view());
        assert!(difference < 1e-7, "{space_step_size:?}: {difference}");

        let norm: f64 = expected.iter().map(|z| z.norm_sqr()).sum();
        assert_abs_diff_eq!(sim.grid.diagnostic_at(1), norm, epsilon = 1e-10);
    }
}

#[test]
fn test_splitting_convergence_orders() {
    let final_time = 0.8;
    let final_state = |scheme: SplittingScheme, steps: usize| {
        let mut parameters = gauss_parameters(
            vec![64],
            vec![0.25],
            steps + 1,
            final_time / steps as f64,
            2.0,
        );
        parameters.scheme = scheme;
        parameters.ics = InitialConditions::ColdGauss {
            mean: vec![0.5],
            std: vec![1.0],
        };
        parameters.potential = Potential::Harmonic {
            strength: 0.2,
            perturbation: 0.0,
        };
        run(parameters).grid.slice_at(steps).to_owned()
    };

    let reference = final_state(SplittingScheme::Strang, 512);
    let error = |scheme: SplittingScheme, steps: usize| {
        max_difference(&final_state(scheme, steps).view(), &reference.view())
    };

    let (lie_coarse, lie_fine) = (
        error(SplittingScheme::LieTrotter, 16),
        error(SplittingScheme::LieTrotter, 32),
    );
    let (strang_coarse, strang_fine) = (
        error(SplittingScheme::Strang, 16),
        error(SplittingScheme::Strang, 32),
    );

    // Halving dt halves the first-order error and quarters the second-order one
    let lie_ratio = lie_coarse / lie_fine;
    let strang_ratio = strang_coarse / strang_fine;
    assert!(lie_ratio > 1.5 && lie_ratio < 2.6, "Lie-Trotter ratio {lie_ratio}");
    assert!(
        strang_ratio > 3.2 && strang_ratio < 5.0,
        "Strang ratio {strang_ratio}"
    );
    assert!(strang_fine < lie_fine);

    // The two schemes take different paths to the same solution
    let lie = final_state(SplittingScheme::LieTrotter, 32);
    let strang = final_state(SplittingScheme::Strang, 32);
    assert!(max_difference(&lie.view(), &strang.view()) > 1e-6);
}

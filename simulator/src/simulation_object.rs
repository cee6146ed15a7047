use ndarray::{ArrayD, Zip};
use ndrustfft::Complex;
use spsim_common::{read_toml, InitialConditions, Potential, SplittingScheme, TomlParameters};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::{
    field::FieldState,
    ics::{external_potential, initial_function, PotentialFunction},
    utils::{
        error::{ParameterError, RuntimeError},
        fft::{inverse_laplacian, wavevector_magnitude_squared, SpectralTransform},
        grid::{check_complex_for_nans, Dimensions, Mesh},
        io,
    },
};

/// This `SimulationParameters` struct stores validated simulation parameters
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationParameters {
    // Grid Parameters
    /// Number of pixels per axis
    pub space_steps: Vec<usize>,
    /// Spatial cell size per axis
    pub space_step_size: Vec<f64>,
    /// Dimensionality of grid
    pub dims: Dimensions,

    // Temporal Parameters
    /// Number of rows in the time series, including the initial condition
    pub time_steps: usize,
    /// Timestep
    pub dt: f64,

    // Physical Parameters
    /// Strength of the self-consistent potential
    pub gravity: f64,
    /// External potential
    pub potential: Potential,

    // Method
    pub scheme: SplittingScheme,
    /// Initial Conditions
    pub ics: InitialConditions,
    /// Whether the initial condition is scaled to unit norm
    pub normalize: bool,

    // Metadata
    /// Simulation name
    pub sim_name: String,
}

impl SimulationParameters {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sim_name: String,
        time_steps: usize,
        dt: f64,
        space_steps: Vec<usize>,
        space_step_size: Vec<f64>,
        gravity: f64,
        scheme: SplittingScheme,
        normalize: bool,
        ics: InitialConditions,
        potential: Potential,
    ) -> Result<Self, ParameterError> {
        if time_steps == 0 {
            return Err(ParameterError::NonPositiveCount {
                name: "time_steps",
                value: time_steps,
            });
        }
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(ParameterError::NonPositiveSize {
                name: "time_step_size",
                value: dt,
            });
        }
        if !gravity.is_finite() {
            return Err(ParameterError::NonFinite {
                name: "gravity",
                value: gravity,
            });
        }

        // Builds (and so validates) every axis
        let dims = Mesh::from_steps(&space_steps, &space_step_size)?.dims();

        Ok(SimulationParameters {
            space_steps,
            space_step_size,
            dims,
            time_steps,
            dt,
            gravity,
            potential,
            scheme,
            ics,
            normalize,
            sim_name,
        })
    }

    pub fn from_toml(toml: TomlParameters) -> Result<Self, ParameterError> {
        SimulationParameters::new(
            toml.sim_name,
            toml.time_steps,
            toml.time_step_size,
            toml.space_steps,
            toml.space_step_size,
            toml.gravity,
            toml.scheme,
            toml.normalize,
            toml.ics,
            toml.potential,
        )
    }

    pub fn mesh(&self) -> Result<Mesh, ParameterError> {
        Mesh::from_steps(&self.space_steps, &self.space_step_size)
    }
}

impl Display for SimulationParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", "-".repeat(40))?;
        writeln!(f, "space_steps     = {:?}", self.space_steps)?;
        writeln!(f, "space_step_size = {:?}", self.space_step_size)?;
        writeln!(f, "dims            = {}", self.dims as usize)?;
        writeln!(f, "time_steps      = {}", self.time_steps)?;
        writeln!(f, "dt              = {}", self.dt)?;
        writeln!(f, "gravity         = {}", self.gravity)?;
        writeln!(f, "potential       = {:?}", self.potential)?;
        writeln!(f, "scheme          = {:?}", self.scheme)?;
        writeln!(f, "ics             = {:?}", self.ics)?;
        writeln!(f, "normalize       = {}", self.normalize)?;
        writeln!(f, "sim_name        = {}", self.sim_name)?;
        writeln!(f, "{}", "-".repeat(40))?;
        Ok(())
    }
}

/// Advances a [`FieldState`] one row at a time with the split-operator scheme.
///
/// Each step forms the self-consistent potential `Φ = F⁻¹[-F[|ψ|²] / |k|²]` from the
/// current density, propagates `ψ` by `exp(-i ½|k|² dt)` in frequency space, and then
/// by `exp(-i (gravity Φ + V_ext) dt)` in position space.
pub struct SplitOperatorIntegrator {
    dt: f64,
    gravity: f64,
    scheme: SplittingScheme,

    transform: SpectralTransform,

    /// exp(-i ½|k|² dt) on the frequency grid
    kinetic: ArrayD<Complex<f64>>,

    /// -1/|k|² on the frequency grid
    inverse_laplacian: ArrayD<f64>,

    /// External potential sampled on the mesh
    external: ArrayD<f64>,

    reported_nonfinite: bool,
}

impl SplitOperatorIntegrator {
    pub fn new<P>(
        mesh: &Mesh,
        potential: &P,
        gravity: f64,
        dt: f64,
        scheme: SplittingScheme,
    ) -> SplitOperatorIntegrator
    where
        P: PotentialFunction + ?Sized,
    {
        let spectral = mesh.spectral_axes();
        let kinetic = wavevector_magnitude_squared(&spectral)
            .mapv(|k2| Complex::new(0.0, -0.5 * k2 * dt).exp());

        SplitOperatorIntegrator {
            dt,
            gravity,
            scheme,
            transform: SpectralTransform::new(&mesh.shape()),
            kinetic,
            inverse_laplacian: inverse_laplacian(&spectral),
            external: mesh.evaluate(|x| potential.evaluate(x)),
            reported_nonfinite: false,
        }
    }

    /// Tag identifying the integration method
    pub fn label(&self) -> &'static str {
        match self.scheme {
            SplittingScheme::LieTrotter => "Split-Operator Poisson (Lie-Trotter)",
            SplittingScheme::Strang => "Split-Operator Poisson (Strang)",
        }
    }

    pub fn not_finished(&self, state: &FieldState) -> bool {
        !state.is_complete()
    }

    /// Computes the next row of `state` from the last populated one
    pub fn step(&mut self, state: &mut FieldState) -> Result<(), RuntimeError> {
        self.check_state(state)?;
        if state.is_complete() {
            return Err(RuntimeError::TimeSeriesComplete {
                time_steps: state.time_steps(),
            });
        }

        let i = state.filled() - 1;
        if i == 0 {
            state.record_diagnostic(0);
            state.label = self.label().to_string();
        }

        let ψ = state.slice_at(i).to_owned();
        let ψ = match self.scheme {
            SplittingScheme::LieTrotter => self.lie_trotter(ψ),
            SplittingScheme::Strang => self.strang(ψ),
        };
        if !self.reported_nonfinite && !check_complex_for_nans(&ψ) {
            log::warn!("non-finite values appeared at time step {}", i + 1);
            self.reported_nonfinite = true;
        }
        state.write_row(i + 1, &ψ);
        log::trace!(
            "step {} -> {}: norm² = {:.12e}",
            i,
            i + 1,
            state.diagnostic_at(i + 1)
        );

        Ok(())
    }

    /// Fills every remaining row of `state`
    pub fn run_to_completion(&mut self, state: &mut FieldState) -> Result<(), RuntimeError> {
        self.check_state(state)?;
        state.record_diagnostic(0);
        state.label = self.label().to_string();

        let now = Instant::now();
        while self.not_finished(state) {
            self.step(state)?;
        }
        log::info!(
            "integrated {} time steps in {} ms",
            state.time_steps(),
            now.elapsed().as_millis()
        );

        Ok(())
    }

    fn check_state(&self, state: &FieldState) -> Result<(), RuntimeError> {
        let shape = state.mesh().shape();
        if shape != self.transform.shape() {
            return Err(RuntimeError::MismatchedMesh {
                expected: self.transform.shape().to_vec(),
                got: shape,
            });
        }
        if !state.is_initialized() {
            return Err(RuntimeError::MissingInitialCondition);
        }
        Ok(())
    }

    /// The self-consistent potential Φ of the density |ψ|², from the Poisson equation ∇²Φ = |ψ|²
    pub fn self_potential(&mut self, ψ: &ArrayD<Complex<f64>>) -> ArrayD<f64> {
        let mut ρ = ψ.mapv(|ψ| Complex::new(ψ.norm_sqr(), 0.0));
        self.transform.forward_inplace(&mut ρ);
        Zip::from(&mut ρ)
            .and(&self.inverse_laplacian)
            .for_each(|ρk, &l| *ρk *= l);
        self.transform.inverse_inplace(&mut ρ);
        ρ.mapv(|φ| φ.re)
    }

    /// gravity * Φ + V_ext
    fn total_potential(&mut self, ψ: &ArrayD<Complex<f64>>) -> ArrayD<f64> {
        let gravity = self.gravity;
        let mut v = self.self_potential(ψ);
        Zip::from(&mut v)
            .and(&self.external)
            .for_each(|v, &external| *v = gravity * *v + external);
        v
    }

    fn kinetic_step(&mut self, mut ψ: ArrayD<Complex<f64>>) -> ArrayD<Complex<f64>> {
        self.transform.forward_inplace(&mut ψ);
        Zip::from(&mut ψ)
            .and(&self.kinetic)
            .for_each(|ψk, &k| *ψk *= k);
        self.transform.inverse_inplace(&mut ψ);
        ψ
    }

    fn lie_trotter(&mut self, ψ: ArrayD<Complex<f64>>) -> ArrayD<Complex<f64>> {
        // The potential comes from the density before the kinetic step
        let v = self.total_potential(&ψ);
        let mut ψ = self.kinetic_step(ψ);
        apply_potential(&mut ψ, &v, self.dt);
        ψ
    }

    fn strang(&mut self, mut ψ: ArrayD<Complex<f64>>) -> ArrayD<Complex<f64>> {
        let half_dt = 0.5 * self.dt;

        let v = self.total_potential(&ψ);
        apply_potential(&mut ψ, &v, half_dt);

        let mut ψ = self.kinetic_step(ψ);

        let v = self.total_potential(&ψ);
        apply_potential(&mut ψ, &v, half_dt);
        ψ
    }
}

/// ψ ← ψ exp(-i v dt)
fn apply_potential(ψ: &mut ArrayD<Complex<f64>>, v: &ArrayD<f64>, dt: f64) {
    Zip::from(ψ)
        .and(v)
        .for_each(|ψ, &v| *ψ *= Complex::new(0.0, -v * dt).exp());
}

/// This holds the `FieldState` being filled, the integrator filling it,
/// and the `SimulationParameters` both were built from.
pub struct SimulationObject {
    /// The time series of the wavefunction
    pub grid: FieldState,

    pub integrator: SplitOperatorIntegrator,

    /// This has the simulation parameters
    pub parameters: SimulationParameters,
}

impl SimulationObject {
    /// Builds the grid, sets the initial condition and prepares the integrator
    pub fn new_from_params(parameters: SimulationParameters) -> Result<Self, RuntimeError> {
        let mesh = parameters.mesh()?;
        let initial = initial_function(&parameters.ics, mesh.dims())?;
        let potential = external_potential(&parameters.potential);

        let integrator = SplitOperatorIntegrator::new(
            &mesh,
            potential.as_ref(),
            parameters.gravity,
            parameters.dt,
            parameters.scheme,
        );

        let mut grid = FieldState::new(parameters.time_steps, mesh)?;
        grid.label = integrator.label().to_string();
        grid.set_initial_condition(initial.as_ref(), parameters.normalize);
        log::debug!("Simulation Parameters\n{parameters}");

        Ok(SimulationObject {
            grid,
            integrator,
            parameters,
        })
    }

    pub fn new_from_toml(path: &str) -> Result<Self, RuntimeError> {
        let toml = read_toml(path)?;
        SimulationObject::new_from_params(SimulationParameters::from_toml(toml)?)
    }

    pub fn not_finished(&self) -> bool {
        self.integrator.not_finished(&self.grid)
    }

    /// Advances the simulation by one time step
    pub fn update(&mut self) -> Result<(), RuntimeError> {
        self.integrator.step(&mut self.grid)
    }

    pub fn run_to_completion(&mut self) -> Result<(), RuntimeError> {
        self.integrator.run_to_completion(&mut self.grid)
    }

    /// Writes the time series to `output_root/sim_name` and returns that directory
    pub fn dump(&self, output_root: &Path) -> anyhow::Result<PathBuf> {
        let dir = output_root.join(&self.parameters.sim_name);
        io::dump(&self.grid, &self.parameters, &dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
fn free_gauss_parameters(space_steps: Vec<usize>, space_step_size: Vec<f64>) -> SimulationParameters {
    let dims = space_steps.len();
    SimulationParameters::new(
        "free-gauss".to_string(),
        10,
        0.1,
        space_steps,
        space_step_size,
        0.0,
        SplittingScheme::LieTrotter,
        true,
        InitialConditions::ColdGauss {
            mean: vec![0.0; dims],
            std: vec![1.0; dims],
        },
        Potential::default(),
    )
    .unwrap()
}

#[test]
fn test_new_sim_parameters() {
    let params = free_gauss_parameters(vec![16, 8], vec![0.5, 0.25]);
    assert_eq!(params.dims, Dimensions::Two);
    println!("{}", params);
}

#[test]
fn test_invalid_sim_parameters() {
    let mut toml = spsim_common::parse_toml(
        r#"
        sim_name = "bad"
        time_steps = 10
        time_step_size = 0.1
        space_steps = [8]
        space_step_size = [0.5]
        gravity = 1.0

        [ics]
        type = "ColdGauss"
        mean = [0.0]
        std = [1.0]
        "#,
    )
    .unwrap();
    assert!(SimulationParameters::from_toml(toml.clone()).is_ok());

    toml.time_step_size = 0.0;
    assert!(matches!(
        SimulationParameters::from_toml(toml.clone()),
        Err(ParameterError::NonPositiveSize {
            name: "time_step_size",
            ..
        })
    ));

    toml.time_step_size = 0.1;
    toml.space_steps = vec![8, 8, 8];
    toml.space_step_size = vec![0.5, 0.5, 0.5];
    assert_eq!(
        SimulationParameters::from_toml(toml.clone()),
        Err(ParameterError::InvalidNumDimensions(3))
    );

    toml.space_steps = vec![0];
    toml.space_step_size = vec![0.5];
    assert!(matches!(
        SimulationParameters::from_toml(toml.clone()),
        Err(ParameterError::NonPositiveCount {
            name: "space_steps",
            ..
        })
    ));

    toml.space_steps = vec![8];
    toml.gravity = f64::INFINITY;
    assert!(matches!(
        SimulationParameters::from_toml(toml),
        Err(ParameterError::NonFinite { name: "gravity", .. })
    ));
}

#[test]
fn test_step_requires_initial_condition() {
    let mesh = Mesh::from_steps(&[8], &[0.5]).unwrap();
    let mut state = FieldState::new(4, mesh.clone()).unwrap();
    let mut integrator = SplitOperatorIntegrator::new(
        &mesh,
        &|_: &[f64]| 0.0,
        1.0,
        0.1,
        SplittingScheme::LieTrotter,
    );

    assert!(matches!(
        integrator.step(&mut state),
        Err(RuntimeError::MissingInitialCondition)
    ));
    assert!(matches!(
        integrator.run_to_completion(&mut state),
        Err(RuntimeError::MissingInitialCondition)
    ));
}

#[test]
fn test_step_past_end() {
    let mut sim = SimulationObject::new_from_params(free_gauss_parameters(vec![8], vec![0.5]))
        .unwrap();

    let mut steps = 0;
    while sim.not_finished() {
        sim.update().unwrap();
        steps += 1;
    }
    assert_eq!(steps, 9);
    assert!(matches!(
        sim.update(),
        Err(RuntimeError::TimeSeriesComplete { time_steps: 10 })
    ));
    assert_eq!(sim.grid.label, "Split-Operator Poisson (Lie-Trotter)");
}

#[test]
fn test_single_row_time_series() {
    use approx::assert_abs_diff_eq;

    let mut params = free_gauss_parameters(vec![8], vec![0.5]);
    params.time_steps = 1;
    let mut sim = SimulationObject::new_from_params(params).unwrap();

    assert!(!sim.not_finished());
    sim.run_to_completion().unwrap();
    assert_abs_diff_eq!(sim.grid.diagnostic_at(0), 1.0, epsilon = 1e-12);
}

#[test]
fn test_self_potential_of_uniform_density() {
    use approx::assert_abs_diff_eq;
    use ndarray::IxDyn;

    // A uniform density only has a zero mode, so Φ is the constant -ρ̂₀/(N sentinel²)
    let mesh = Mesh::from_steps(&[8], &[0.5]).unwrap();
    let mut integrator = SplitOperatorIntegrator::new(
        &mesh,
        &|_: &[f64]| 0.0,
        1.0,
        0.1,
        SplittingScheme::LieTrotter,
    );
    let ψ = ArrayD::from_elem(IxDyn(&[8]), Complex::new(0.5, 0.0));

    let φ = integrator.self_potential(&ψ);
    for &φ in φ.iter() {
        assert_abs_diff_eq!(φ, -0.25 * 1e8, epsilon = 1e-3);
    }
}

#[test]
fn test_step_rejects_field_on_other_mesh() {
    let mesh = Mesh::from_steps(&[8, 4], &[0.5, 0.5]).unwrap();
    let other = Mesh::from_steps(&[4, 8], &[0.5, 0.5]).unwrap();
    let mut state = FieldState::new(3, other).unwrap();
    state.set_initial_condition(&|x: &[f64]| Complex::new((-x[0] * x[0]).exp(), 0.0), true);

    let mut integrator = SplitOperatorIntegrator::new(
        &mesh,
        &|_: &[f64]| 0.0,
        1.0,
        0.1,
        SplittingScheme::LieTrotter,
    );

    for result in [
        integrator.step(&mut state),
        integrator.run_to_completion(&mut state),
    ] {
        match result {
            Err(RuntimeError::MismatchedMesh { expected, got }) => {
                assert_eq!(expected, vec![8, 4]);
                assert_eq!(got, vec![4, 8]);
            }
            other => panic!("expected a mesh mismatch, got {other:?}"),
        }
    }
    assert_eq!(state.filled(), 1);
}

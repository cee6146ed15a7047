use ndarray::{Array1, ArrayD, ArrayViewD, Axis, IxDyn};
use ndrustfft::Complex;

use crate::{
    ics::InitialFunction,
    utils::{
        error::ParameterError,
        grid::{check_norm, norm_squared, normalize, Dimensions, Mesh, SpatialAxis},
    },
};

/// The time series of the wavefunction over the mesh and its per-step diagnostic.
///
/// Row 0 of `values` is the initial condition. Rows `1..time_steps` are written,
/// in order, by the integrator. `diagnostic[t]` is the squared norm `Σ|ψ_t|²`.
pub struct FieldState {
    /// Wavefunction, shaped `(time_steps, space...)`
    values: ArrayD<Complex<f64>>,

    /// Squared norm of each row
    diagnostic: Array1<f64>,

    /// The spatial axes the wavefunction lives on
    mesh: Mesh,

    /// Integration method that produced the data
    pub label: String,

    /// Number of rows written so far (0 until an initial condition is set)
    filled: usize,
}

impl FieldState {
    /// Allocates a zero-filled time series over `mesh`
    pub fn new(time_steps: usize, mesh: Mesh) -> Result<FieldState, ParameterError> {
        if time_steps == 0 {
            return Err(ParameterError::NonPositiveCount {
                name: "time_steps",
                value: time_steps,
            });
        }

        let mut shape = vec![time_steps];
        shape.extend(mesh.shape());

        Ok(FieldState {
            values: ArrayD::from_elem(IxDyn(&shape), Complex::new(0.0, 0.0)),
            diagnostic: Array1::zeros(time_steps),
            mesh,
            label: String::new(),
            filled: 0,
        })
    }

    /// Evaluates `f` over the mesh and stores it as row 0, optionally scaled to unit norm.
    ///
    /// Calling this after integrating overwrites row 0 but leaves the later rows as they are.
    pub fn set_initial_condition<F>(&mut self, f: &F, normalize_field: bool)
    where
        F: InitialFunction + ?Sized,
    {
        let mut ψ = self.mesh.evaluate(|x| f.evaluate(x));
        if normalize_field {
            let norm = normalize(&mut ψ);
            if norm == 0.0 {
                log::warn!("initial condition is zero everywhere; it was not normalized");
            }
        }
        log::debug!(
            "initial condition set with norm² {:.6e} (unit norm: {})",
            norm_squared(&ψ),
            check_norm(&ψ, 1e-10)
        );

        self.values.index_axis_mut(Axis(0), 0).assign(&ψ);
        self.filled = self.filled.max(1);
    }

    /// The wavefunction at time step `t`.
    ///
    /// Panics if `t >= time_steps`.
    pub fn slice_at(&self, t: usize) -> ArrayViewD<Complex<f64>> {
        self.values.index_axis(Axis(0), t)
    }

    /// The recorded squared norm at time step `t`.
    ///
    /// Panics if `t >= time_steps`.
    pub fn diagnostic_at(&self, t: usize) -> f64 {
        self.diagnostic[t]
    }

    pub fn values(&self) -> &ArrayD<Complex<f64>> {
        &self.values
    }

    pub fn diagnostic(&self) -> &Array1<f64> {
        &self.diagnostic
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn axes(&self) -> &[SpatialAxis] {
        self.mesh.axes()
    }

    pub fn dims(&self) -> Dimensions {
        self.mesh.dims()
    }

    pub fn time_steps(&self) -> usize {
        self.diagnostic.len()
    }

    /// Number of rows populated so far
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_initialized(&self) -> bool {
        self.filled > 0
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.time_steps()
    }

    /// Stores `ψ` as row `t` and records its squared norm
    pub(crate) fn write_row(&mut self, t: usize, ψ: &ArrayD<Complex<f64>>) {
        self.values.index_axis_mut(Axis(0), t).assign(ψ);
        self.filled = self.filled.max(t + 1);
        self.record_diagnostic(t);
    }

    pub(crate) fn record_diagnostic(&mut self, t: usize) {
        let norm = norm_squared(&self.slice_at(t));
        self.diagnostic[t] = norm;
    }
}

#[test]
fn test_new_field_state() {
    let mesh = Mesh::from_steps(&[8, 4], &[0.5, 0.5]).unwrap();
    let state = FieldState::new(10, mesh).unwrap();

    assert_eq!(state.values().shape(), &[10, 8, 4]);
    assert_eq!(state.diagnostic().len(), 10);
    assert_eq!(state.dims(), Dimensions::Two);
    assert!(!state.is_initialized());
    assert!(state.values().iter().all(|z| z.norm() == 0.0));
}

#[test]
fn test_zero_time_steps() {
    let mesh = Mesh::from_steps(&[8], &[0.5]).unwrap();
    assert!(matches!(
        FieldState::new(0, mesh),
        Err(ParameterError::NonPositiveCount {
            name: "time_steps",
            ..
        })
    ));
}

#[test]
fn test_set_initial_condition_normalized() {
    use approx::assert_abs_diff_eq;

    let mesh = Mesh::from_steps(&[16, 12], &[0.3, 0.4]).unwrap();
    let mut state = FieldState::new(3, mesh).unwrap();
    state.set_initial_condition(
        &|x: &[f64]| Complex::new((-x[0] * x[0] - x[1] * x[1]).exp(), x[0]),
        true,
    );

    assert!(state.is_initialized());
    assert_eq!(state.filled(), 1);
    assert_abs_diff_eq!(norm_squared(&state.slice_at(0)), 1.0, epsilon = 1e-12);

    // Later rows are untouched
    assert_eq!(norm_squared(&state.slice_at(1)), 0.0);
}

#[test]
fn test_set_initial_condition_raw() {
    let mesh = Mesh::from_steps(&[5], &[1.0]).unwrap();
    let mut state = FieldState::new(2, mesh).unwrap();
    state.set_initial_condition(&|x: &[f64]| Complex::new(x[0], 0.0), false);

    let row: Vec<f64> = state.slice_at(0).iter().map(|z| z.re).collect();
    assert_eq!(row, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
}

#[test]
fn test_write_row_records_diagnostic() {
    use approx::assert_abs_diff_eq;

    let mesh = Mesh::from_steps(&[4], &[1.0]).unwrap();
    let mut state = FieldState::new(2, mesh).unwrap();
    let ψ = ArrayD::from_elem(IxDyn(&[4]), Complex::new(1.0, 1.0));

    state.write_row(1, &ψ);

    assert_eq!(state.filled(), 2);
    assert!(state.is_complete());
    assert_abs_diff_eq!(state.diagnostic_at(1), 8.0, epsilon = 1e-12);
}

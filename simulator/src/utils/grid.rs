use ndarray::{ArrayBase, ArrayD, Data, DataMut, Dimension, IxDyn};
use ndrustfft::Complex;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use spsim_common::ZERO_MODE_SENTINEL;
use std::f64::consts::PI;
use std::ops::Index;

use super::error::ParameterError;

#[derive(
    Copy, Clone, Debug, Serialize, Deserialize, FromPrimitive, PartialEq, PartialOrd,
)]
pub enum Dimensions {
    One = 1,
    Two = 2,
}

impl Dimensions {
    /// Maps a number of spatial axes onto a supported dimensionality
    pub fn from_count(count: usize) -> Result<Dimensions, ParameterError> {
        <Dimensions as num::FromPrimitive>::from_usize(count)
            .ok_or(ParameterError::InvalidNumDimensions(count))
    }
}

/// A centered, uniformly spaced coordinate axis.
///
/// For an odd number of points the middle point sits exactly at zero. For an even
/// number the axis is shifted by half a cell so that it stays symmetric about zero.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialAxis {
    values: Vec<f64>,
    step_size: f64,
}

impl SpatialAxis {
    pub fn new(steps: usize, step_size: f64) -> Result<SpatialAxis, ParameterError> {
        if steps == 0 {
            return Err(ParameterError::NonPositiveCount {
                name: "space_steps",
                value: steps,
            });
        }
        if !(step_size > 0.0 && step_size.is_finite()) {
            return Err(ParameterError::NonPositiveSize {
                name: "space_step_size",
                value: step_size,
            });
        }

        let mut offset = -((steps / 2) as f64) * step_size;
        if steps % 2 == 0 {
            offset += step_size / 2.0;
        }
        let values = (0..steps)
            .map(|i| offset + i as f64 * step_size)
            .collect();

        Ok(SpatialAxis { values, step_size })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Coordinate of the last grid point
    pub fn last(&self) -> f64 {
        // Never empty, see `new`
        self.values[self.values.len() - 1]
    }
}

impl Index<usize> for SpatialAxis {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        &self.values[i]
    }
}

/// Angular wavenumbers conjugate to a [`SpatialAxis`], in discrete Fourier transform order.
///
/// The frequencies are scaled by `steps/2 * pi / axis.last()`. The entry at the
/// zero-frequency index holds [`ZERO_MODE_SENTINEL`] instead of zero.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralAxis {
    values: Vec<f64>,
}

impl SpectralAxis {
    pub fn new(axis: &SpatialAxis) -> SpectralAxis {
        let steps = axis.len();
        let scale = (steps as f64 / 2.0) * PI / axis.last();
        let values = (0..steps)
            .map(|i| {
                if i == 0 {
                    ZERO_MODE_SENTINEL
                } else {
                    fft_frequency(i, steps) * scale
                }
            })
            .collect();

        SpectralAxis { values }
    }

    /// Wavenumbers with the zero mode regularized
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// The wavenumber at index `i`, without the zero-mode regularization
    pub fn wavenumber(&self, i: usize) -> f64 {
        if i == 0 {
            0.0
        } else {
            self.values[i]
        }
    }
}

/// Sample frequency (cycles per sample) of bin `i` of an `n`-point DFT.
/// Follows the usual ordering: zero, the positive frequencies, then the negative ones.
pub fn fft_frequency(i: usize, n: usize) -> f64 {
    let (i, n) = (i as i64, n as i64);
    let j = if i <= (n - 1) / 2 { i } else { i - n };
    j as f64 / n as f64
}

/// The Cartesian product of one [`SpatialAxis`] per dimension.
///
/// Arrays over the mesh use `ij` indexing: element `[i, j]` sits at `(x[i], y[j])`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    axes: Vec<SpatialAxis>,
    dims: Dimensions,
}

impl Mesh {
    pub fn new(axes: Vec<SpatialAxis>) -> Result<Mesh, ParameterError> {
        let dims = Dimensions::from_count(axes.len())?;
        Ok(Mesh { axes, dims })
    }

    /// Builds one axis per `(steps, step_size)` pair
    pub fn from_steps(steps: &[usize], step_sizes: &[f64]) -> Result<Mesh, ParameterError> {
        if steps.len() != step_sizes.len() {
            return Err(ParameterError::MismatchedLength {
                name: "space_step_size",
                expected: steps.len(),
                got: step_sizes.len(),
            });
        }
        let axes = steps
            .iter()
            .zip(step_sizes)
            .map(|(&n, &dx)| SpatialAxis::new(n, dx))
            .collect::<Result<Vec<_>, _>>()?;
        Mesh::new(axes)
    }

    pub fn axes(&self) -> &[SpatialAxis] {
        &self.axes
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(SpatialAxis::len).collect()
    }

    pub fn spectral_axes(&self) -> Vec<SpectralAxis> {
        self.axes.iter().map(SpectralAxis::new).collect()
    }

    /// Evaluates `f` at the coordinates of every mesh point
    pub fn evaluate<A, F>(&self, mut f: F) -> ArrayD<A>
    where
        F: FnMut(&[f64]) -> A,
    {
        let mut coordinates = vec![0.0; self.axes.len()];
        ArrayD::from_shape_fn(IxDyn(&self.shape()), |index| {
            for (d, (x, axis)) in coordinates.iter_mut().zip(&self.axes).enumerate() {
                *x = axis[index[d]];
            }
            f(&coordinates)
        })
    }
}

/// Sum of |ψ|² over every grid point
pub fn norm_squared<S, D>(grid: &ArrayBase<S, D>) -> f64
where
    S: Data<Elem = Complex<f64>>,
    D: Dimension,
{
    grid.iter().map(Complex::norm_sqr).sum()
}

/// Scales `grid` to unit Euclidean norm and returns the norm it had before.
/// A grid that is identically zero is left untouched.
pub fn normalize<S, D>(grid: &mut ArrayBase<S, D>) -> f64
where
    S: DataMut<Elem = Complex<f64>>,
    D: Dimension,
{
    let norm = norm_squared(grid).sqrt();
    if norm > 0.0 {
        grid.mapv_inplace(|ψ| ψ / norm);
    }
    norm
}

pub fn check_norm<S, D>(grid: &ArrayBase<S, D>, epsilon: f64) -> bool
where
    S: Data<Elem = Complex<f64>>,
    D: Dimension,
{
    (norm_squared(grid) - 1.0).abs() < epsilon
}

/// Returns `true` when every entry is finite
pub fn check_complex_for_nans<S, D>(array: &ArrayBase<S, D>) -> bool
where
    S: Data<Elem = Complex<f64>>,
    D: Dimension,
{
    array.iter().all(|z| z.re.is_finite() && z.im.is_finite())
}

#[test]
fn test_spatial_axis_odd() {
    use approx::assert_abs_diff_eq;

    let axis = SpatialAxis::new(5, 0.5).unwrap();

    assert_eq!(axis.len(), 5);
    assert_eq!(axis.values(), &[-1.0, -0.5, 0.0, 0.5, 1.0]);
    assert_abs_diff_eq!(axis[0] + axis.last(), 0.0, epsilon = 1e-12);
}

#[test]
fn test_spatial_axis_even() {
    use approx::assert_abs_diff_eq;

    let axis = SpatialAxis::new(4, 1.0).unwrap();
    assert_eq!(axis.values(), &[-1.5, -0.5, 0.5, 1.5]);

    // Constant spacing and symmetry for a less friendly step size
    let axis = SpatialAxis::new(500, 0.05).unwrap();
    assert_eq!(axis.len(), 500);
    for pair in axis.values().windows(2) {
        assert_abs_diff_eq!(pair[1] - pair[0], 0.05, epsilon = 1e-12);
    }
    assert_abs_diff_eq!(axis[0] + axis.last(), 0.0, epsilon = 1e-12);
}

#[test]
fn test_single_point_axis() {
    let axis = SpatialAxis::new(1, 0.3).unwrap();
    assert_eq!(axis.values(), &[0.0]);

    let spectral = SpectralAxis::new(&axis);
    assert_eq!(spectral.values(), &[ZERO_MODE_SENTINEL]);
    assert_eq!(spectral.wavenumber(0), 0.0);
}

#[test]
fn test_invalid_axis() {
    assert_eq!(
        SpatialAxis::new(0, 1.0),
        Err(ParameterError::NonPositiveCount {
            name: "space_steps",
            value: 0
        })
    );
    assert!(matches!(
        SpatialAxis::new(8, -0.5),
        Err(ParameterError::NonPositiveSize { .. })
    ));
    assert!(matches!(
        SpatialAxis::new(8, f64::NAN),
        Err(ParameterError::NonPositiveSize { .. })
    ));
}

#[test]
fn test_fft_frequency_ordering() {
    let even: Vec<f64> = (0..4).map(|i| fft_frequency(i, 4)).collect();
    assert_eq!(even, vec![0.0, 0.25, -0.5, -0.25]);

    let odd: Vec<f64> = (0..5).map(|i| fft_frequency(i, 5)).collect();
    assert_eq!(odd, vec![0.0, 0.2, 0.4, -0.4, -0.2]);
}

#[test]
fn test_spectral_axis_sentinel() {
    use approx::assert_abs_diff_eq;

    let axis = SpatialAxis::new(4, 1.0).unwrap();
    let spectral = SpectralAxis::new(&axis);

    assert_eq!(spectral.len(), 4);
    assert_eq!(spectral.values()[0], ZERO_MODE_SENTINEL);
    assert_eq!(spectral.wavenumber(0), 0.0);
    for &k in &spectral.values()[1..] {
        assert!(k.is_finite());
        assert!(k != 0.0);
    }

    // fftfreq * (4/2) * pi / 1.5
    assert_abs_diff_eq!(spectral.values()[1], PI / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(spectral.values()[2], -2.0 * PI / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(spectral.values()[3], -PI / 3.0, epsilon = 1e-12);
}

#[test]
fn test_mesh_ij_indexing() {
    let mesh = Mesh::from_steps(&[3, 2], &[1.0, 0.5]).unwrap();
    assert_eq!(mesh.dims(), Dimensions::Two);
    assert_eq!(mesh.shape(), vec![3, 2]);

    let x = mesh.evaluate(|c| c[0]);
    let y = mesh.evaluate(|c| c[1]);
    assert_eq!(x[[0, 1]], -1.0);
    assert_eq!(x[[2, 0]], 1.0);
    assert_eq!(y[[0, 0]], -0.25);
    assert_eq!(y[[1, 1]], 0.25);
}

#[test]
fn test_mesh_dimension_errors() {
    assert_eq!(
        Mesh::new(vec![]),
        Err(ParameterError::InvalidNumDimensions(0))
    );
    assert_eq!(
        Mesh::from_steps(&[4, 4, 4], &[1.0, 1.0, 1.0]),
        Err(ParameterError::InvalidNumDimensions(3))
    );
    assert!(matches!(
        Mesh::from_steps(&[4, 4], &[1.0]),
        Err(ParameterError::MismatchedLength { .. })
    ));
}

#[test]
fn test_normalize_1d_and_2d() {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    let mut line = Array1::from_elem(8, Complex::new(1.0, 1.0));
    let norm = normalize(&mut line);
    assert_abs_diff_eq!(norm, 4.0, epsilon = 1e-12);
    assert!(check_norm(&line, 1e-12));

    let mut plane = Array2::from_elem((8, 8), Complex::new(1.0, 1.0));
    normalize(&mut plane);
    assert_abs_diff_eq!(norm_squared(&plane), 1.0, epsilon = 1e-12);

    let mut zeros = Array1::from_elem(4, Complex::new(0.0, 0.0));
    assert_eq!(normalize(&mut zeros), 0.0);
    assert!(check_complex_for_nans(&zeros));
}

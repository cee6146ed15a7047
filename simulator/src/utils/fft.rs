use ndarray::{ArrayD, IxDyn};
use ndrustfft::{ndfft, ndifft, Complex, FftHandler};
use spsim_common::ZERO_MODE_SENTINEL;

use super::grid::SpectralAxis;

/// N-dimensional discrete Fourier transform over arrays shaped like a mesh.
///
/// The forward transform is unnormalized and the inverse carries the full `1/N`,
/// so `inverse(forward(ψ)) == ψ`.
pub struct SpectralTransform {
    /// One handler per axis
    handlers: Vec<FftHandler<f64>>,
    shape: Vec<usize>,
}

impl SpectralTransform {
    pub fn new(shape: &[usize]) -> SpectralTransform {
        SpectralTransform {
            handlers: shape.iter().map(|&n| FftHandler::new(n)).collect(),
            shape: shape.to_vec(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn forward(&mut self, array: &ArrayD<Complex<f64>>) -> ArrayD<Complex<f64>> {
        let mut output = array.clone();
        self.forward_inplace(&mut output);
        output
    }

    pub fn inverse(&mut self, array: &ArrayD<Complex<f64>>) -> ArrayD<Complex<f64>> {
        let mut output = array.clone();
        self.inverse_inplace(&mut output);
        output
    }

    pub fn forward_inplace(&mut self, array: &mut ArrayD<Complex<f64>>) {
        debug_assert_eq!(array.shape(), self.shape.as_slice());
        for (dim, handler) in self.handlers.iter_mut().enumerate() {
            let buffer = array.clone();
            ndfft(&buffer, array, handler, dim);
        }
    }

    /// Each axis pass carries its own `1/n`
    pub fn inverse_inplace(&mut self, array: &mut ArrayD<Complex<f64>>) {
        debug_assert_eq!(array.shape(), self.shape.as_slice());
        for (dim, handler) in self.handlers.iter_mut().enumerate() {
            let buffer = array.clone();
            ndifft(&buffer, array, handler, dim);
        }
    }
}

/// |k|² at every point of the frequency-domain grid, from the unregularized wavenumbers
pub fn wavevector_magnitude_squared(spectral: &[SpectralAxis]) -> ArrayD<f64> {
    let shape: Vec<usize> = spectral.iter().map(SpectralAxis::len).collect();
    ArrayD::from_shape_fn(IxDyn(&shape), |index| {
        spectral
            .iter()
            .enumerate()
            .map(|(d, axis)| axis.wavenumber(index[d]).powi(2))
            .sum::<f64>()
    })
}

/// The frequency-space inverse Laplacian, `-1/|k|²`.
/// At the zero mode |k| is replaced by [`ZERO_MODE_SENTINEL`].
pub fn inverse_laplacian(spectral: &[SpectralAxis]) -> ArrayD<f64> {
    let mut k2 = wavevector_magnitude_squared(spectral);
    if let Some(zero_mode) = k2.iter_mut().next() {
        *zero_mode = ZERO_MODE_SENTINEL.powi(2);
    }
    k2.mapv_into(|k2| -k2.recip())
}

#[test]
fn test_constant_and_delta_1d() {
    use approx::assert_abs_diff_eq;

    let mut transform = SpectralTransform::new(&[4]);

    // A constant only has a zero mode
    let constant = ArrayD::from_elem(IxDyn(&[4]), Complex::new(1.0, 0.0));
    let constant_k = transform.forward(&constant);
    assert_abs_diff_eq!(constant_k[[0]].re, 4.0, epsilon = 1e-12);
    for z in constant_k.iter().skip(1) {
        assert_abs_diff_eq!(z.norm(), 0.0, epsilon = 1e-12);
    }

    // A delta at the origin has a flat spectrum
    let mut delta = ArrayD::from_elem(IxDyn(&[4]), Complex::new(0.0, 0.0));
    delta[[0]] = Complex::new(1.0, 0.0);
    for z in transform.forward(&delta).iter() {
        assert_abs_diff_eq!(z.re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z.im, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn test_single_mode_2d() {
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    // exp(2πi (x/4 + 2y/8)) lands entirely in bin [1, 2]
    let (nx, ny) = (4, 8);
    let wave = ArrayD::from_shape_fn(IxDyn(&[nx, ny]), |index| {
        let phase = 2.0 * PI * (index[0] as f64 / nx as f64 + 2.0 * index[1] as f64 / ny as f64);
        Complex::new(0.0, phase).exp()
    });

    let mut transform = SpectralTransform::new(&[nx, ny]);
    let wave_k = transform.forward(&wave);
    for ((i, j), z) in wave_k
        .indexed_iter()
        .map(|(index, z)| ((index[0], index[1]), z))
    {
        let expected = if (i, j) == (1, 2) { (nx * ny) as f64 } else { 0.0 };
        assert_abs_diff_eq!(z.norm(), expected, epsilon = 1e-9);
    }
}

#[test]
fn test_forward_inverse_2d() {
    use approx::assert_abs_diff_eq;

    let values = ArrayD::from_shape_fn(IxDyn(&[6, 4]), |index| {
        Complex::new(index[0] as f64 - 2.0, (index[1] * index[0]) as f64)
    });

    let mut transform = SpectralTransform::new(&[6, 4]);
    let values_k = transform.forward(&values);
    let roundtrip = transform.inverse(&values_k);

    assert_abs_diff_eq!(
        roundtrip
            .iter()
            .zip(&values)
            .fold(0.0, |acc: f64, (x, y)| acc + (x - y).norm()),
        0.0,
        epsilon = 1e-10
    );
}

#[test]
fn test_inverse_laplacian() {
    use super::grid::SpatialAxis;
    use approx::assert_abs_diff_eq;

    let x = SpectralAxis::new(&SpatialAxis::new(4, 1.0).unwrap());
    let y = SpectralAxis::new(&SpatialAxis::new(3, 0.5).unwrap());

    let k2 = wavevector_magnitude_squared(&[x.clone(), y.clone()]);
    assert_eq!(k2.shape(), &[4, 3]);
    assert_eq!(k2[[0, 0]], 0.0);
    assert_abs_diff_eq!(k2[[0, 1]], y.values()[1].powi(2), epsilon = 1e-12);
    assert_abs_diff_eq!(
        k2[[2, 2]],
        x.values()[2].powi(2) + y.values()[2].powi(2),
        epsilon = 1e-12
    );

    let laplacian = inverse_laplacian(&[x.clone(), y]);
    assert_abs_diff_eq!(laplacian[[0, 0]], -1e8, epsilon = 1e-4);
    assert_abs_diff_eq!(
        laplacian[[1, 0]],
        -1.0 / x.values()[1].powi(2),
        epsilon = 1e-12
    );
}

#[test]
fn test_inverse_is_normalized_2d() {
    use approx::assert_abs_diff_eq;

    // A flat spectrum comes back as a unit delta at the origin
    let mut transform = SpectralTransform::new(&[4, 3]);
    let flat = ArrayD::from_elem(IxDyn(&[4, 3]), Complex::new(1.0, 0.0));
    let delta = transform.inverse(&flat);

    assert_eq!(transform.shape(), &[4, 3]);
    for (index, z) in delta.indexed_iter() {
        let expected = if index[0] == 0 && index[1] == 0 { 1.0 } else { 0.0 };
        assert_abs_diff_eq!(z.re, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(z.im, 0.0, epsilon = 1e-12);
    }
}

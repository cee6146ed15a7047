use ndrustfft::Complex;
use spsim_common::{InitialConditions, Potential};
use std::f64::consts::PI;

use crate::utils::{error::ParameterError, grid::Dimensions};

/// The wavefunction at t = 0, evaluated once at every mesh point
pub trait InitialFunction {
    fn evaluate(&self, coordinates: &[f64]) -> Complex<f64>;
}

impl<F> InitialFunction for F
where
    F: Fn(&[f64]) -> Complex<f64>,
{
    fn evaluate(&self, coordinates: &[f64]) -> Complex<f64> {
        self(coordinates)
    }
}

/// A time-independent external potential
pub trait PotentialFunction {
    fn evaluate(&self, coordinates: &[f64]) -> f64;
}

impl<F> PotentialFunction for F
where
    F: Fn(&[f64]) -> f64,
{
    fn evaluate(&self, coordinates: &[f64]) -> f64 {
        self(coordinates)
    }
}

/// Normal probability density with mean `mean` and standard deviation `std`
pub fn normal_pdf(x: f64, mean: f64, std: f64) -> f64 {
    (-0.5 * ((x - mean) / std).powi(2)).exp() / (std * (2.0 * PI).sqrt())
}

/// Product of one normal density per dimension
fn separable_gauss(coordinates: &[f64], mean: &[f64], std: &[f64]) -> f64 {
    coordinates
        .iter()
        .zip(mean.iter().zip(std))
        .map(|(&x, (&m, &s))| normal_pdf(x, m, s))
        .product()
}

fn check_length(name: &'static str, values: &[f64], dims: Dimensions) -> Result<(), ParameterError> {
    if values.len() != dims as usize {
        return Err(ParameterError::MismatchedLength {
            name,
            expected: dims as usize,
            got: values.len(),
        });
    }
    Ok(())
}

fn check_widths(std: &[f64]) -> Result<(), ParameterError> {
    match std.iter().find(|&&s| !(s > 0.0 && s.is_finite())) {
        Some(&value) => Err(ParameterError::NonPositiveSize { name: "std", value }),
        None => Ok(()),
    }
}

/// Builds the initial wavefunction described by `ics` for a `dims`-dimensional mesh
pub fn initial_function(
    ics: &InitialConditions,
    dims: Dimensions,
) -> Result<Box<dyn InitialFunction>, ParameterError> {
    match ics {
        InitialConditions::ColdGauss { mean, std } => {
            check_length("mean", mean, dims)?;
            check_length("std", std, dims)?;
            check_widths(std)?;

            let (mean, std) = (mean.clone(), std.clone());
            Ok(Box::new(move |x: &[f64]| {
                Complex::new(separable_gauss(x, &mean, &std), 0.0)
            }))
        }

        InitialConditions::GaussianSum { means, std } => {
            if means.is_empty() {
                return Err(ParameterError::NonPositiveCount {
                    name: "means",
                    value: 0,
                });
            }
            for mean in means {
                check_length("means", mean, dims)?;
            }
            check_length("std", std, dims)?;
            check_widths(std)?;

            let (means, std) = (means.clone(), std.clone());
            Ok(Box::new(move |x: &[f64]| {
                let value = means
                    .iter()
                    .map(|mean| separable_gauss(x, mean, &std))
                    .sum::<f64>();
                Complex::new(value, 0.0)
            }))
        }
    }
}

/// Builds the external potential described by `potential`
pub fn external_potential(potential: &Potential) -> Box<dyn PotentialFunction> {
    match *potential {
        Potential::Free { perturbation } => Box::new(move |_: &[f64]| perturbation),
        Potential::Harmonic {
            strength,
            perturbation,
        } => Box::new(move |x: &[f64]| {
            strength * x.iter().map(|xi| xi * xi).sum::<f64>() + perturbation
        }),
    }
}

#[test]
fn test_cold_gauss_2d_is_separable() {
    use approx::assert_abs_diff_eq;

    let ics = InitialConditions::ColdGauss {
        mean: vec![1.0, -1.0],
        std: vec![0.5, 2.0],
    };
    let f = initial_function(&ics, Dimensions::Two).unwrap();

    let value = f.evaluate(&[0.5, 0.0]);
    assert_abs_diff_eq!(
        value.re,
        normal_pdf(0.5, 1.0, 0.5) * normal_pdf(0.0, -1.0, 2.0),
        epsilon = 1e-14
    );
    assert_eq!(value.im, 0.0);
}

#[test]
fn test_two_bump_sum() {
    use approx::assert_abs_diff_eq;

    let ics = InitialConditions::GaussianSum {
        means: vec![vec![-5.0], vec![5.0]],
        std: vec![1.0],
    };
    let f = initial_function(&ics, Dimensions::One).unwrap();

    // Symmetric about the origin, peaked at the bump centers
    assert_abs_diff_eq!(f.evaluate(&[-3.0]).re, f.evaluate(&[3.0]).re, epsilon = 1e-15);
    assert!(f.evaluate(&[5.0]).re > f.evaluate(&[0.0]).re);
    assert_abs_diff_eq!(f.evaluate(&[5.0]).re, normal_pdf(0.0, 0.0, 1.0), epsilon = 1e-5);
}

#[test]
fn test_initial_function_validation() {
    let wrong_dims = InitialConditions::ColdGauss {
        mean: vec![0.0],
        std: vec![1.0],
    };
    assert_eq!(
        initial_function(&wrong_dims, Dimensions::Two).err(),
        Some(ParameterError::MismatchedLength {
            name: "mean",
            expected: 2,
            got: 1
        })
    );

    let flat = InitialConditions::ColdGauss {
        mean: vec![0.0],
        std: vec![0.0],
    };
    assert!(matches!(
        initial_function(&flat, Dimensions::One),
        Err(ParameterError::NonPositiveSize { name: "std", .. })
    ));

    let empty = InitialConditions::GaussianSum {
        means: vec![],
        std: vec![1.0],
    };
    assert!(initial_function(&empty, Dimensions::One).is_err());
}

#[test]
fn test_external_potentials() {
    let free = external_potential(&Potential::Free { perturbation: 0.25 });
    assert_eq!(free.evaluate(&[3.0, 4.0]), 0.25);

    let harmonic = external_potential(&Potential::Harmonic {
        strength: 0.05,
        perturbation: 1.0,
    });
    assert_eq!(harmonic.evaluate(&[0.0]), 1.0);
    assert!((harmonic.evaluate(&[3.0, 4.0]) - (0.05 * 25.0 + 1.0)).abs() < 1e-12);
}

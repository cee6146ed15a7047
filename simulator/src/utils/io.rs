use anyhow::{anyhow, Context, Result};
use ndarray::{ArrayBase, ArrayD, Data, Dimension};
use ndarray_npy::{write_npy, WritableElement};
use ndrustfft::Complex;
use serde::Serialize;
use spsim_common::{InitialConditions, Potential, SplittingScheme};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::{field::FieldState, simulation_object::SimulationParameters};

/// This function writes a complex array to disk in .npy format, as two real arrays
/// `{path}_real.npy` and `{path}_imag.npy`. The two halves are written on separate threads.
pub fn complex_array_to_disk(path: &Path, array: &ArrayD<Complex<f64>>) -> Result<u128> {
    let timer = Instant::now();

    // Construct paths
    let real_path = with_suffix(path, "_real.npy");
    let imag_path = with_suffix(path, "_imag.npy");

    std::thread::scope(|scope| -> Result<()> {
        let real_handle = scope.spawn(|| array_to_disk(&real_path, &array.mapv(|x| x.re)));
        let imag_handle = scope.spawn(|| array_to_disk(&imag_path, &array.mapv(|x| x.im)));

        real_handle
            .join()
            .map_err(|_| anyhow!("thread writing {} panicked", real_path.display()))??;
        imag_handle
            .join()
            .map_err(|_| anyhow!("thread writing {} panicked", imag_path.display()))??;
        Ok(())
    })?;

    Ok(timer.elapsed().as_millis())
}

pub fn array_to_disk<S, D>(path: &Path, array: &ArrayBase<S, D>) -> Result<()>
where
    S: Data,
    S::Elem: WritableElement,
    D: Dimension,
{
    write_npy(path, array).with_context(|| format!("failed to write {}", path.display()))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut path = path.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}

/// Everything needed to interpret a dump, written next to the arrays as `metadata.toml`
#[derive(Serialize, Debug)]
pub struct DumpMetadata {
    pub sim_name: String,
    pub label: String,
    pub time_steps: usize,
    pub time_step_size: f64,
    pub space_steps: Vec<usize>,
    pub space_step_size: Vec<f64>,
    pub gravity: f64,
    pub scheme: SplittingScheme,
    pub normalize: bool,
    /// Squared norm of the first and last rows
    pub initial_norm: f64,
    pub final_norm: f64,
    pub ics: InitialConditions,
    pub potential: Potential,
}

impl DumpMetadata {
    pub fn new(state: &FieldState, parameters: &SimulationParameters) -> DumpMetadata {
        let diagnostic = state.diagnostic();
        DumpMetadata {
            sim_name: parameters.sim_name.clone(),
            label: state.label.clone(),
            time_steps: state.time_steps(),
            time_step_size: parameters.dt,
            space_steps: parameters.space_steps.clone(),
            space_step_size: parameters.space_step_size.clone(),
            gravity: parameters.gravity,
            scheme: parameters.scheme,
            normalize: parameters.normalize,
            initial_norm: diagnostic[0],
            final_norm: diagnostic[diagnostic.len() - 1],
            ics: parameters.ics.clone(),
            potential: parameters.potential.clone(),
        }
    }
}

/// Writes the wavefunction time series, diagnostic, spatial axes, and metadata into `dir`
pub fn dump(state: &FieldState, parameters: &SimulationParameters, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let psi_time = complex_array_to_disk(&dir.join("psi"), state.values())?;
    log::debug!("wrote psi in {psi_time} ms");

    array_to_disk(&dir.join("diagnostic.npy"), state.diagnostic())?;

    for (d, axis) in state.axes().iter().enumerate() {
        let values = ndarray::Array1::from_vec(axis.values().to_vec());
        array_to_disk(&dir.join(format!("axis_{d}.npy")), &values)?;
    }

    let metadata = toml::to_string(&DumpMetadata::new(state, parameters))
        .context("failed to serialize metadata")?;
    std::fs::write(dir.join("metadata.toml"), metadata)
        .with_context(|| format!("failed to write metadata in {}", dir.display()))?;

    log::info!("dumped {} to {}", parameters.sim_name, dir.display());
    Ok(())
}

#[test]
fn test_complex_array_to_disk() {
    use ndarray::IxDyn;
    use ndarray_npy::read_npy;

    let dir = std::env::temp_dir().join(format!("spsim-io-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let array = ArrayD::from_shape_fn(IxDyn(&[3, 4]), |index| {
        Complex::new(index[0] as f64, -(index[1] as f64))
    });
    complex_array_to_disk(&dir.join("field"), &array).unwrap();

    let real: ArrayD<f64> = read_npy(dir.join("field_real.npy")).unwrap();
    let imag: ArrayD<f64> = read_npy(dir.join("field_imag.npy")).unwrap();
    assert_eq!(real.shape(), &[3, 4]);
    assert_eq!(real, array.mapv(|x| x.re));
    assert_eq!(imag, array.mapv(|x| x.im));

    std::fs::remove_dir_all(&dir).unwrap();
}

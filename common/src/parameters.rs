use serde::{Deserialize, Serialize};

use crate::{
    error::CommonError,
    ics::{InitialConditions, Potential, SplittingScheme},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TomlParameters {
    /// Name of simulation (used for directories)
    pub sim_name: String,
    /// Number of rows in the time series. Row 0 holds the initial condition
    pub time_steps: usize,
    /// Timestep
    pub time_step_size: f64,
    /// Number of grid cells, one entry per spatial dimension
    pub space_steps: Vec<usize>,
    /// Spatial cell size, one entry per spatial dimension
    pub space_step_size: Vec<f64>,
    /// Strength of the self-consistent (Poisson) potential
    #[serde(alias = "gravity_coefficient")]
    pub gravity: f64,
    /// Operator splitting used by the integrator
    #[serde(default)]
    pub scheme: SplittingScheme,
    /// Whether the initial condition is scaled to unit norm
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    /// Initial Conditions
    pub ics: InitialConditions,
    /// External potential
    #[serde(default)]
    pub potential: Potential,
}

fn default_normalize() -> bool {
    true
}

/// This function reads toml files
pub fn read_toml(path: &str) -> Result<TomlParameters, CommonError> {
    // Read toml config file
    let toml_contents: &str =
        &std::fs::read_to_string(path).map_err(|_| CommonError::TomlReadError {
            path: path.to_string(),
        })?;

    parse_toml(toml_contents)
}

/// Parses the contents of a toml file
pub fn parse_toml(toml_contents: &str) -> Result<TomlParameters, CommonError> {
    toml::from_str(toml_contents).map_err(|e| CommonError::TomlParseError {
        msg: format!("{e:?}"),
    })
}

#[test]
fn test_parse_two_bump_1d() {
    let contents = r#"
        sim_name = "two-bump"
        time_steps = 400
        time_step_size = 0.5
        space_steps = [500]
        space_step_size = [0.05]
        gravity = 5.0

        [ics]
        type = "GaussianSum"
        means = [[-5.0], [5.0]]
        std = [1.0]
    "#;
    let toml = parse_toml(contents).unwrap();

    assert_eq!(toml.space_steps, vec![500]);
    assert_eq!(toml.scheme, SplittingScheme::LieTrotter);
    assert!(toml.normalize);
    assert_eq!(toml.potential, Potential::Free { perturbation: 0.0 });
    assert_eq!(
        toml.ics,
        InitialConditions::GaussianSum {
            means: vec![vec![-5.0], vec![5.0]],
            std: vec![1.0],
        }
    );
}

#[test]
fn test_parse_harmonic_strang_2d() {
    let contents = r#"
        sim_name = "harmonic"
        time_steps = 10
        time_step_size = 0.1
        space_steps = [16, 8]
        space_step_size = [0.3, 0.3]
        gravity = 0.0
        scheme = "Strang"
        normalize = false

        [ics]
        type = "ColdGauss"
        mean = [0.0, 0.0]
        std = [1.0, 2.0]

        [potential]
        type = "Harmonic"
        strength = 0.05
    "#;
    let toml = parse_toml(contents).unwrap();

    assert_eq!(toml.scheme, SplittingScheme::Strang);
    assert!(!toml.normalize);
    assert_eq!(
        toml.potential,
        Potential::Harmonic {
            strength: 0.05,
            perturbation: 0.0
        }
    );
}

#[test]
fn test_missing_gravity_is_rejected() {
    let contents = r#"
        sim_name = "no-gravity"
        time_steps = 10
        time_step_size = 0.1
        space_steps = [8]
        space_step_size = [0.5]

        [ics]
        type = "ColdGauss"
        mean = [0.0]
        std = [1.0]
    "#;

    assert!(matches!(
        parse_toml(contents),
        Err(CommonError::TomlParseError { .. })
    ));
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        read_toml("./definitely/not/a/config.toml"),
        Err(CommonError::TomlReadError { .. })
    ));
}

#[test]
fn test_gravity_coefficient_alias() {
    let contents = r#"
        sim_name = "aliased"
        time_steps = 10
        time_step_size = 0.1
        space_steps = [8]
        space_step_size = [0.5]
        gravity_coefficient = 2.5

        [ics]
        type = "ColdGauss"
        mean = [0.0]
        std = [1.0]
    "#;

    assert_eq!(parse_toml(contents).unwrap().gravity, 2.5);
}

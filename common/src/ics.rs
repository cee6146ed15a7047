use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum InitialConditions {
    /// A real (phases = 0) gaussian in real space, built as a product of
    /// normal densities, one per dimension
    ColdGauss { mean: Vec<f64>, std: Vec<f64> },

    /// A sum of real gaussians sharing the same widths, one centered at each entry of `means`
    GaussianSum { means: Vec<Vec<f64>>, std: Vec<f64> },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum Potential {
    /// No external force; `perturbation` shifts the potential uniformly
    Free {
        #[serde(default)]
        perturbation: f64,
    },

    /// `strength * |x|^2 + perturbation`, centered at the origin
    Harmonic {
        strength: f64,
        #[serde(default)]
        perturbation: f64,
    },
}

impl Default for Potential {
    fn default() -> Self {
        Potential::Free { perturbation: 0.0 }
    }
}

/// Operator ordering used by the integrator
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SplittingScheme {
    /// First order: kinetic step, then potential step
    #[default]
    LieTrotter,
    /// Second order: half potential step, kinetic step, half potential step
    Strang,
}

/// Stand-in for the zero wavenumber when it is used as a divisor in the Poisson solve
pub const ZERO_MODE_SENTINEL: f64 = 1e-4;

/// Self-interaction coefficient of the reference 1D setup
pub const REFERENCE_GRAVITY_1D: f64 = 5.0;

/// Self-interaction coefficient of the reference 2D setup
pub const REFERENCE_GRAVITY_2D: f64 = 10.0;

pub mod field;
pub mod ics;
pub mod simulation_object;
pub mod utils;

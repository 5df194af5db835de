//! Running plan-step commands and shaping what they print.

mod runner;
mod shaper;

pub use runner::{CommandRun, CommandRunner};
pub use shaper::{ShapeLimits, Shaped, shape};

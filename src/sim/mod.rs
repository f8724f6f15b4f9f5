/// Battery parameters and per-run state.
pub mod battery;
pub mod dispatch;
/// Dispatch trace and aggregate metrics.
pub mod result;

pub use battery::{BatteryConfig, BatteryState, BatteryTemplate, LossSplit};
pub use dispatch::simulate;
pub use result::SimulationResult;

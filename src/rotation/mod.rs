/// Rotation module
///
/// - The live/drain state machine (controller.rs)
/// - Record-window compensation (timing.rs)
/// - Cooperative shutdown between cycles (shutdown.rs)

pub mod controller;
pub mod shutdown;
pub mod timing;

pub use controller::RotationController;

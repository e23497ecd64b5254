//! Role-gated operations over the repositories. Every call authorizes the
//! acting user before touching storage.

pub mod cancellation;
pub mod movement;

pub use cancellation::CancellationWorkflow;
pub use movement::MovementService;

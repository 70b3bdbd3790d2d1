pub mod cleanup;
pub mod deploy;
pub mod plan;

pub use cleanup::cmd_cleanup;
pub use deploy::cmd_deploy;
pub use plan::{PlanFormat, cmd_plan};

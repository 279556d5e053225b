pub mod command_guard;
pub mod limits;
pub mod path_guard;
pub mod shell_approval;

pub use command_guard::CommandGuard;
pub use limits::ResourceLimits;
pub use path_guard::{resolve, PathGuard};
pub use shell_approval::ShellApproval;

mod project;
mod run;

pub use project::cmd_project;
pub use run::cmd_run;

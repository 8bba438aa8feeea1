pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, DeployArgs, ServeArgs, StacksArgs, WhoamiArgs};
pub use output::{OutputFormat, OutputFormatter};

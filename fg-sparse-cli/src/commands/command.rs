use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// A subcommand of the `sparse` binary.
#[enum_dispatch]
pub trait Command {
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self) -> Result<()>;
}

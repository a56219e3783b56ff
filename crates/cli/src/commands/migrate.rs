use drivethru_core::config::LoadOptions;

use crate::bootstrap::{self, Failure};
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    match execute() {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

fn execute() -> Result<(), Failure> {
    let config = bootstrap::load_config(LoadOptions::default())?;
    let runtime = bootstrap::async_runtime()?;

    runtime.block_on(async {
        let pool = bootstrap::open_database(&config).await?;
        pool.close().await;
        Ok::<(), Failure>(())
    })
}

use drivethru_core::config::LoadOptions;
use drivethru_db::DatasetSeed;

use crate::bootstrap::{self, Failure, EXIT_PERSISTENCE, EXIT_SEED_VERIFICATION};
use crate::commands::CommandResult;

struct SeedOutput {
    dataset_name: String,
    items_seeded: usize,
}

pub fn run() -> CommandResult {
    match execute() {
        Ok(output) => CommandResult::success(
            "seed",
            format!(
                "dataset {} seeded with {} labeled items",
                output.dataset_name, output.items_seeded
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn execute() -> Result<SeedOutput, Failure> {
    let config = bootstrap::load_config(LoadOptions::default())?;
    let runtime = bootstrap::async_runtime()?;

    runtime.block_on(async {
        let pool = bootstrap::open_database(&config).await?;

        let seeded = DatasetSeed::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_PERSISTENCE))?;
        let verification = DatasetSeed::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED_VERIFICATION))?;
        pool.close().await;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_message(&failed_checks), EXIT_SEED_VERIFICATION));
        }

        Ok::<_, Failure>(SeedOutput { dataset_name: seeded.dataset_name, items_seeded: seeded.items_seeded })
    })
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some dataset items failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

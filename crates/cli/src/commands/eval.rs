use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use drivethru_agent::EvaluationRunner;
use drivethru_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use drivethru_core::domain::dataset::Dataset;
use drivethru_core::scoring::{EvaluationReport, NO_HALLUCINATED_ITEMS, TOOL_CALL_ACCURACY};
use drivethru_db::repositories::{
    DatasetRepository, EvaluationRepository, SqlDatasetRepository, SqlEvaluationRepository,
};
use drivethru_db::{DatasetSeed, DbPool};
use tracing::info;

use crate::bootstrap::{self, Failure, EXIT_ASSET, EXIT_PERSISTENCE};
use crate::commands::CommandResult;

#[derive(Debug, Clone, Default)]
pub struct EvalArgs {
    pub run_name: Option<String>,
    pub dataset_file: Option<PathBuf>,
    pub concurrency: Option<usize>,
}

pub fn run(args: EvalArgs) -> CommandResult {
    match execute(args) {
        Ok(report) => CommandResult::success("eval", summarize(&report)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("eval", error_class, message, exit_code)
        }
    }
}

fn execute(args: EvalArgs) -> Result<EvaluationReport, Failure> {
    let options = LoadOptions {
        overrides: ConfigOverrides { eval_max_concurrency: args.concurrency, ..ConfigOverrides::default() },
        ..LoadOptions::default()
    };
    let config = bootstrap::load_config(options)?;
    crate::logging::init(&config);
    let runtime = bootstrap::async_runtime()?;

    let menu = bootstrap::load_menu(&config)?;
    let agent = Arc::new(bootstrap::agent_runtime(&config)?);
    let run_name = args.run_name.unwrap_or_else(|| EvaluationReport::default_run_name(Utc::now()));

    runtime.block_on(async {
        let pool = bootstrap::open_database(&config).await?;
        let dataset = resolve_dataset(&config, args.dataset_file.as_deref(), &pool).await?;

        let report = EvaluationRunner::new(agent, menu)
            .with_max_concurrency(config.eval.max_concurrency)
            .run(&run_name, &dataset)
            .await;

        SqlEvaluationRepository::new(pool.clone())
            .save_report(&report)
            .await
            .map_err(|error| ("report_persistence", error.to_string(), EXIT_PERSISTENCE))?;
        pool.close().await;
        Ok::<_, Failure>(report)
    })
}

/// Picks the dataset to run: an explicit file, then the seeded rows for the
/// configured dataset name, then the configured dataset file, then the
/// bundled copy.
pub async fn resolve_dataset(
    config: &AppConfig,
    dataset_file: Option<&Path>,
    pool: &DbPool,
) -> Result<Dataset, Failure> {
    if let Some(path) = dataset_file {
        return read_dataset_file(path);
    }

    let items = SqlDatasetRepository::new(pool.clone())
        .list_items(&config.eval.dataset_name)
        .await
        .map_err(|error| ("dataset_load", error.to_string(), EXIT_ASSET))?;
    if !items.is_empty() {
        info!(
            event_name = "eval.dataset.loaded",
            dataset_name = %config.eval.dataset_name,
            source = "database",
            items = items.len(),
            "dataset loaded"
        );
        return Ok(Dataset {
            name: config.eval.dataset_name.clone(),
            description: String::new(),
            items,
        });
    }

    if config.eval.dataset_path.exists() {
        return read_dataset_file(&config.eval.dataset_path);
    }

    DatasetSeed::dataset().map_err(|error| ("dataset_load", error.to_string(), EXIT_ASSET))
}

fn read_dataset_file(path: &Path) -> Result<Dataset, Failure> {
    let raw = fs::read_to_string(path).map_err(|error| {
        ("dataset_load", format!("could not read `{}`: {error}", path.display()), EXIT_ASSET)
    })?;
    let dataset = Dataset::from_json_str(&raw).map_err(|error| {
        ("dataset_load", format!("could not parse `{}`: {error}", path.display()), EXIT_ASSET)
    })?;
    info!(
        event_name = "eval.dataset.loaded",
        dataset_name = %dataset.name,
        source = %path.display(),
        items = dataset.items.len(),
        "dataset loaded"
    );
    Ok(dataset)
}

fn summarize(report: &EvaluationReport) -> String {
    let metric = |value: Option<f64>| value.map_or_else(|| "n/a".to_string(), |value| format!("{value:.3}"));
    format!(
        "run {} on {}: {}; tool_call_accuracy {}; no_hallucinated_items {}; {} of {} items failed",
        report.run_name,
        report.dataset_name,
        report.aggregate.comment,
        metric(report.mean_of(TOOL_CALL_ACCURACY)),
        metric(report.mean_of(NO_HALLUCINATED_ITEMS)),
        report.aggregate.failed_count,
        report.aggregate.item_count,
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{TimeZone, Utc};
    use drivethru_core::config::AppConfig;
    use drivethru_core::scoring::EvaluationReport;
    use drivethru_db::{connect_with_settings, migrations, DatasetSeed};

    use super::{resolve_dataset, summarize};
    use crate::bootstrap;

    #[test]
    fn explicit_file_wins_and_bad_files_are_asset_failures() {
        let runtime = bootstrap::async_runtime().expect("runtime");
        let dir = tempfile::tempdir().expect("temp dir");
        let good = dir.path().join("mini.json");
        fs::write(
            &good,
            r#"{"name":"mini","items":[{"id":"mini-0","utterance":"hi","metadata":{"category":"greeting","difficulty":"easy","index":0}}]}"#,
        )
        .expect("write dataset");
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ nope").expect("write dataset");

        runtime.block_on(async {
            let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool");
            migrations::run_pending(&pool).await.expect("migrations");
            let config = AppConfig::default();

            let dataset = resolve_dataset(&config, Some(good.as_path()), &pool).await.expect("dataset");
            assert_eq!(dataset.name, "mini");
            assert_eq!(dataset.items.len(), 1);

            let (class, _, code) = resolve_dataset(&config, Some(bad.as_path()), &pool).await.expect_err("bad");
            assert_eq!(class, "dataset_load");
            assert_eq!(code, 7);
        });
    }

    #[test]
    fn seeded_rows_are_used_before_files() {
        let runtime = bootstrap::async_runtime().expect("runtime");
        runtime.block_on(async {
            let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool");
            migrations::run_pending(&pool).await.expect("migrations");
            DatasetSeed::load(&pool).await.expect("seed");

            let mut config = AppConfig::default();
            config.eval.dataset_path = "does/not/exist.json".into();

            let dataset = resolve_dataset(&config, None, &pool).await.expect("dataset");
            assert_eq!(dataset.name, config.eval.dataset_name);
            assert_eq!(dataset.items.len(), 25);
            assert_eq!(dataset.items[0].id, "order-correctness-000");
        });
    }

    #[test]
    fn summary_names_the_run_and_its_failures() {
        let report = EvaluationReport::new(
            "eval-20250101-000000",
            "drive-thru/order-correctness-v1",
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("timestamp"),
            Vec::new(),
        );

        let summary = summarize(&report);
        assert!(summary.starts_with("run eval-20250101-000000 on drive-thru/order-correctness-v1"));
        assert!(summary.contains("No scores"));
        assert!(summary.contains("tool_call_accuracy n/a"));
        assert!(summary.ends_with("0 of 0 items failed"));
    }
}

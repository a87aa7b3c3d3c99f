use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use rollguard_core::{WorkloadId, parse_duration};
use rollguard_rollout::{RolloutConfig, RolloutController, RolloutOutcome};

use super::{Context, OutputFormat};
use crate::local_store::LocalStore;

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILED: u8 = 1;
/// A clean rollback still needs attention, but left the workload healthy.
const EXIT_ROLLED_BACK: u8 = 2;

/// Command-line values that take precedence over rollguard.toml.
#[derive(Debug, Default)]
pub struct Overrides {
    pub threshold: Option<String>,
    pub poll_interval: Option<String>,
}

pub async fn rollout(
    ctx: &Context,
    workload: &WorkloadId,
    image: &str,
    overrides: Overrides,
    format: OutputFormat,
) -> anyhow::Result<RolloutOutcome> {
    let config = resolve_config(ctx, &overrides)?;
    // Fail fast on a bad path; the rollout itself reopens the file per call.
    drop(ctx.open_store()?);
    let store = Arc::new(LocalStore::new(ctx.store_path.clone()));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling rollout");
            on_interrupt.cancel();
        }
    });

    // The store file doubles as the instance observer.
    let controller =
        RolloutController::new(store.clone(), store, config).with_cancellation(cancel);
    let outcome = controller.rollout(workload, image).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => println!("{}", describe(workload, &outcome)),
    }
    Ok(outcome)
}

fn resolve_config(ctx: &Context, overrides: &Overrides) -> anyhow::Result<RolloutConfig> {
    let mut config = RolloutConfig::from(&ctx.config);
    if let Some(value) = &overrides.threshold {
        config.threshold = duration_flag("--threshold", value)?;
    }
    if let Some(value) = &overrides.poll_interval {
        config.poll_interval = duration_flag("--poll-interval", value)?;
        if config.poll_interval.is_zero() {
            anyhow::bail!("--poll-interval must be greater than zero");
        }
    }
    Ok(config)
}

fn duration_flag(flag: &str, value: &str) -> anyhow::Result<Duration> {
    parse_duration(value).ok_or_else(|| anyhow!("{flag}: invalid duration {value:?}"))
}

pub fn exit_status(outcome: &RolloutOutcome) -> u8 {
    match outcome {
        RolloutOutcome::Success { .. } => EXIT_SUCCESS,
        RolloutOutcome::RolledBack { .. } => EXIT_ROLLED_BACK,
        RolloutOutcome::RollbackFailed { .. } => EXIT_FAILED,
    }
}

fn describe(workload: &WorkloadId, outcome: &RolloutOutcome) -> String {
    match outcome {
        RolloutOutcome::Success { image } => format!("✓ {workload} is running {image}"),
        RolloutOutcome::RolledBack {
            attempted_image,
            restored_image,
            reason,
        } => format!(
            "↺ {workload} rolled back to {restored_image}\n  {attempted_image} failed: {reason}"
        ),
        RolloutOutcome::RollbackFailed {
            attempted_image,
            restored_image,
            reason,
            rollback_reason,
        } => format!(
            "✗ ROLLBACK FAILED for {workload}: operator action required\n  \
             {attempted_image} failed: {reason}\n  \
             {restored_image} failed: {rollback_reason}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{mark, status};
    use rollguard_core::RollguardConfig;
    use rollguard_state::{Instance, StateStore, WorkloadSpec};

    fn context(dir: &tempfile::TempDir) -> Context {
        Context {
            config: RollguardConfig::default(),
            store_path: dir.path().join("state.redb"),
        }
    }

    fn seed(ctx: &Context, id: &WorkloadId, ready: bool) {
        let store = ctx.open_store().unwrap();
        let spec = WorkloadSpec::single_container(id.clone(), "redis:7", 2);
        store.register_workload(&spec).unwrap();
        for i in 0..2 {
            store
                .put_instance(&Instance::for_workload(&spec, &format!("redis-{i}"), ready))
                .unwrap();
        }
    }

    #[test]
    fn overrides_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let config = resolve_config(
            &ctx,
            &Overrides {
                threshold: Some("30s".into()),
                poll_interval: Some("500ms".into()),
            },
        )
        .unwrap();
        assert_eq!(config.threshold, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(500));

        let defaults = resolve_config(&ctx, &Overrides::default()).unwrap();
        assert_eq!(defaults.threshold, Duration::from_secs(10));
    }

    #[test]
    fn rejects_bad_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let bad = Overrides {
            threshold: Some("soon".into()),
            ..Default::default()
        };
        assert!(resolve_config(&ctx, &bad).is_err());

        let zero = Overrides {
            poll_interval: Some("0s".into()),
            ..Default::default()
        };
        assert!(resolve_config(&ctx, &zero).is_err());
    }

    #[test]
    fn exit_codes_follow_outcome() {
        let rolled_back = RolloutOutcome::RolledBack {
            attempted_image: "redis:8".into(),
            restored_image: "redis:7".into(),
            reason: "timeout".into(),
        };
        let failed = RolloutOutcome::RollbackFailed {
            attempted_image: "redis:8".into(),
            restored_image: "redis:7".into(),
            reason: "timeout".into(),
            rollback_reason: "timeout".into(),
        };
        let success = RolloutOutcome::Success {
            image: "redis:8".into(),
        };
        assert_eq!(exit_status(&success), 0);
        assert_eq!(exit_status(&rolled_back), 2);
        assert_eq!(exit_status(&failed), 1);
    }

    fn spawn_rollout(
        ctx: &Context,
        id: &WorkloadId,
        image: &str,
    ) -> tokio::task::JoinHandle<anyhow::Result<RolloutOutcome>> {
        let (ctx, id, image) = (ctx.clone(), id.clone(), image.to_string());
        tokio::spawn(async move {
            rollout(&ctx, &id, &image, Overrides::default(), OutputFormat::Json).await
        })
    }

    #[tokio::test(start_paused = true)]
    async fn mark_and_status_run_while_rollout_waits() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let id = WorkloadId::new("default", "redis");
        seed(&ctx, &id, true);

        let handle = spawn_rollout(&ctx, &id, "redis:8");

        // Polls at 0s and 2s see the restarted instances unready.
        tokio::time::sleep(Duration::from_secs(3)).await;
        let report = status::collect(&ctx.open_store().unwrap(), &id).unwrap();
        assert_eq!(report.image.as_deref(), Some("redis:8"));
        assert!(!report.readiness.is_converged());
        mark::mark(&ctx, &id, "redis-0", true).unwrap();
        mark::mark(&ctx, &id, "redis-1", true).unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.is_success());
        assert_eq!(exit_status(&outcome), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unmarked_rollout_rolls_back_once_old_image_is_marked() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let id = WorkloadId::new("default", "redis");
        seed(&ctx, &id, true);

        let handle = spawn_rollout(&ctx, &id, "redis:8");

        // The forward check gives up at 10s and the rollback restarts
        // instances on redis:7; marking them at 11s lets the 12s poll pass.
        tokio::time::sleep(Duration::from_secs(11)).await;
        mark::mark(&ctx, &id, "redis-0", true).unwrap();
        mark::mark(&ctx, &id, "redis-1", true).unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(outcome, RolloutOutcome::RolledBack { .. }));
        assert_eq!(exit_status(&outcome), 2);

        let store = StateStore::open(&ctx.store_path).unwrap();
        let record = store.get_workload(&id).unwrap().unwrap();
        assert_eq!(record.value.managed_image(), Some("redis:7"));
    }

    #[tokio::test(start_paused = true)]
    async fn unready_baseline_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let id = WorkloadId::new("default", "redis");
        seed(&ctx, &id, false);

        let err = rollout(&ctx, &id, "redis:8", Overrides::default(), OutputFormat::Text)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("precondition failed"));
    }
}

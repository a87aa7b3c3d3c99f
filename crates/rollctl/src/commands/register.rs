use rollguard_core::{ImageRef, WorkloadId};
use rollguard_state::{Instance, WorkloadSpec};
use tracing::info;

use super::Context;

pub fn register(
    ctx: &Context,
    workload: &WorkloadId,
    image: &str,
    replicas: u32,
    seed_instances: bool,
) -> anyhow::Result<()> {
    ImageRef::parse(image)?;

    let store = ctx.open_store()?;
    let spec = WorkloadSpec::single_container(workload.clone(), image, replicas);
    let version = store.register_workload(&spec)?;
    info!(%workload, %image, replicas, %version, "workload registered");

    if seed_instances {
        for i in 0..replicas {
            let instance = Instance::for_workload(&spec, &format!("{}-{i}", workload.name), true);
            store.put_instance(&instance)?;
        }
    }

    println!("✓ Registered {workload} ({image}, {replicas} replicas) at {version}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollguard_core::RollguardConfig;
    use rollguard_state::{StateStore, VersionToken};

    fn context(dir: &tempfile::TempDir) -> Context {
        Context {
            config: RollguardConfig::default(),
            store_path: dir.path().join("state.redb"),
        }
    }

    #[test]
    fn registers_workload_with_ready_instances() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let id = WorkloadId::new("default", "redis");

        register(&ctx, &id, "redis:7", 3, true).unwrap();

        let store = StateStore::open(&ctx.store_path).unwrap();
        let record = store.get_workload(&id).unwrap().unwrap();
        assert_eq!(record.version, VersionToken::INITIAL);
        assert_eq!(record.value.managed_image(), Some("redis:7"));

        let instances = store.list_instances_for_workload(&id).unwrap();
        assert_eq!(instances.len(), 3);
        assert!(instances.iter().all(Instance::is_ready));
    }

    #[test]
    fn rejects_invalid_image() {
        let dir = tempfile::tempdir().unwrap();
        let err = register(&context(&dir), &WorkloadId::new("default", "redis"), "", 1, false);
        assert!(err.is_err());
    }
}

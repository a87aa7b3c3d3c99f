use anyhow::anyhow;
use rollguard_core::WorkloadId;
use rollguard_state::Instance;
use tracing::info;

use super::Context;

/// Set an instance's readiness, creating the instance if it is new.
pub fn mark(ctx: &Context, workload: &WorkloadId, name: &str, ready: bool) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let key = format!("{}/{name}", workload.namespace);

    let mut instance = match store.get_instance(&key)? {
        Some(existing) => existing,
        None => {
            let spec = store
                .get_workload(workload)?
                .ok_or_else(|| anyhow!("workload {workload} not found"))?
                .value;
            Instance::for_workload(&spec, name, ready)
        }
    };
    instance.set_ready(ready);
    store.put_instance(&instance)?;

    info!(%workload, instance = name, ready, "instance readiness recorded");
    println!("✓ {key} ready={ready}");
    Ok(())
}

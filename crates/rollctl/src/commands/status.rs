use anyhow::anyhow;
use serde::Serialize;

use rollguard_core::WorkloadId;
use rollguard_health::Readiness;
use rollguard_state::StateStore;

use super::{Context, OutputFormat};

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub workload: String,
    pub image: Option<String>,
    pub version: u64,
    pub replicas: u32,
    pub readiness: Readiness,
    pub instances: Vec<InstanceLine>,
}

#[derive(Debug, Serialize)]
pub struct InstanceLine {
    pub name: String,
    pub image: String,
    pub ready: bool,
}

pub fn status(ctx: &Context, workload: &WorkloadId, format: OutputFormat) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let report = collect(&store, workload)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", format_report(&report)),
    }
    Ok(())
}

pub fn collect(store: &StateStore, workload: &WorkloadId) -> anyhow::Result<StatusReport> {
    let record = store
        .get_workload(workload)?
        .ok_or_else(|| anyhow!("workload {workload} not found"))?;
    let instances = store.list_instances_for_workload(workload)?;

    Ok(StatusReport {
        workload: workload.key(),
        image: record.value.managed_image().map(str::to_string),
        version: record.version.0,
        replicas: record.value.replicas,
        readiness: Readiness::assess(&instances),
        instances: instances
            .iter()
            .map(|i| InstanceLine {
                name: i.name.clone(),
                image: i.image.clone(),
                ready: i.is_ready(),
            })
            .collect(),
    })
}

fn format_report(report: &StatusReport) -> String {
    let mut out = format!(
        "{}\n  image:     {}\n  version:   v{}\n  replicas:  {}\n  readiness: {}\n",
        report.workload,
        report.image.as_deref().unwrap_or("<none>"),
        report.version,
        report.replicas,
        report.readiness,
    );
    for instance in &report.instances {
        let mark = if instance.ready { "✓" } else { "✗" };
        out.push_str(&format!("    {mark} {} ({})\n", instance.name, instance.image));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollguard_state::{Instance, WorkloadSpec};

    #[test]
    fn reports_partial_readiness() {
        let store = StateStore::open_in_memory().unwrap();
        let id = WorkloadId::new("default", "redis");
        let spec = WorkloadSpec::single_container(id.clone(), "redis:7", 2);
        store.register_workload(&spec).unwrap();
        store.put_instance(&Instance::for_workload(&spec, "redis-0", true)).unwrap();
        store.put_instance(&Instance::for_workload(&spec, "redis-1", false)).unwrap();

        let report = collect(&store, &id).unwrap();
        assert_eq!(report.image.as_deref(), Some("redis:7"));
        assert_eq!(report.readiness, Readiness::Partial { ready: 1, total: 2 });

        let text = format_report(&report);
        assert!(text.contains("1/2 ready"));
        assert!(text.contains("✗ redis-1"));
    }

    #[test]
    fn missing_workload_is_an_error() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(collect(&store, &WorkloadId::new("default", "ghost")).is_err());
    }
}

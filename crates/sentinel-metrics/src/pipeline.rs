// crates/sentinel-metrics/src/pipeline.rs
// ============================================================================
// Module: Metrics Pipeline Orchestration
// Description: Fans the seven stages out per partition key on a bounded
// tokio task set, with a barrier between stages.
// Purpose: Implement spec.md §4.9's concurrency model: "stages fan out per
// tenant/customer on a bounded worker pool; a stage blocks on the barrier of
// the previous stage for its partition key."
// Dependencies: tokio, futures, sentinel-core, every stage module in this
// crate
// ============================================================================

//! ## Overview
//! [`run_pipeline`] drives stages 1 through 7 as a sequence of pure
//! `stage(in) -> out` calls (Design Notes §9), grouping each stage's
//! output into the next stage's input. Every stage's fan-out runs on a
//! bounded [`tokio`] task set via [`futures::future::join_all`]; the next
//! stage does not start until the previous stage's `join_all` resolves,
//! which is the barrier the spec calls for.

use std::collections::HashMap;
use std::sync::Arc;

use sentinel_core::CustomerId;
use sentinel_core::JobStatistics;
use sentinel_core::Rule;
use sentinel_core::RuleId;
use sentinel_core::Shard;
use sentinel_core::Timestamp;
use tokio::sync::Semaphore;

use crate::clevel::CLevelReport;
use crate::clevel::compute_clevel;
use crate::delta::DeltaReport;
use crate::delta::compute_delta;
use crate::delta::to_metric_record;
use crate::department::DepartmentReport;
use crate::department::compute_department;
use crate::finops::compute_finops;
use crate::kubernetes::compute_kubernetes;
use crate::operational::OperationalReport;
use crate::operational::compute_operational;
use crate::project::ProjectReport;
use crate::project::compute_project;

/// Upper bound on concurrently running stage tasks, regardless of how many
/// partitions a caller submits in one pipeline run.
const MAX_CONCURRENT_TASKS: usize = 32;

/// One tenant's raw inputs to stage 1.
#[derive(Debug, Clone)]
pub struct TenantInput {
    /// Partition (customer, tenant, region) this input covers.
    pub partition: sentinel_core::PartitionKey,
    /// Project (tenant group) this tenant rolls up into.
    pub project: String,
    /// Department this tenant's project rolls up into.
    pub department: String,
    /// This tenant's live shards.
    pub shards: Vec<Shard>,
    /// Resources scanned this run, across every rule.
    pub resources_scanned: u64,
    /// This tenant's prior completed week's metric record, if any.
    pub previous_metric_record: Option<sentinel_core::MetricRecord>,
    /// This tenant's prior completed week's compliant-resource count, used
    /// by the delta stage's combined-denominator recomputation.
    pub previous_resources_compliant: u64,
}

/// Everything one pipeline run needs beyond the per-tenant inputs.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    /// Customer this run covers.
    pub customer_id: CustomerId,
    /// Every tenant in scope for this run.
    pub tenants: Vec<TenantInput>,
    /// Every rule referenced by any tenant's shards, keyed by id.
    pub rules_by_id: HashMap<RuleId, Rule>,
    /// This customer's completed jobs for the week, for the C-level stage.
    pub weekly_job_statistics: Vec<JobStatistics>,
    /// Number of top entries each department ranking keeps.
    pub department_top_n: usize,
    /// Timestamp this run is computed at.
    pub now: Timestamp,
}

/// Full output of one pipeline run: every stage's report, keyed where a
/// caller needs to look one up by tenant/project.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Stage 1 output, keyed by tenant.
    pub operational: HashMap<sentinel_core::TenantId, OperationalReport>,
    /// Stage 2 output, keyed by project name.
    pub project: HashMap<String, ProjectReport>,
    /// Stage 3 output, keyed by department name.
    pub department: HashMap<String, DepartmentReport>,
    /// Stage 4 output.
    pub clevel: CLevelReport,
    /// Stage 5 output, keyed by tenant.
    pub delta: HashMap<sentinel_core::TenantId, DeltaReport>,
    /// Stage 6 output, keyed by tenant.
    pub finops: HashMap<sentinel_core::TenantId, Vec<sentinel_core::FinOpsView>>,
    /// Stage 7 output, keyed by tenant.
    pub kubernetes: HashMap<sentinel_core::TenantId, sentinel_core::KubernetesView>,
}

/// Runs every stage of the metrics pipeline for one customer, fanning each
/// stage's per-partition work out across a bounded task set and barrier
/// between stages.
pub async fn run_pipeline(input: PipelineInput) -> PipelineOutput {
    let PipelineInput { customer_id, tenants, rules_by_id, weekly_job_statistics, department_top_n, now } = input;

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_TASKS));
    let rules_by_id = Arc::new(rules_by_id);

    let operational_reports = run_bounded(&semaphore, tenants.iter().cloned(), {
        let rules_by_id = Arc::clone(&rules_by_id);
        move |tenant: TenantInput| {
            let rules_by_id = Arc::clone(&rules_by_id);
            async move { (tenant.clone(), compute_operational(tenant.partition.clone(), &tenant.shards, &rules_by_id, tenant.resources_scanned, now)) }
        }
    })
    .await;
    tracing::debug!(tenants = operational_reports.len(), "stage 1 (operational) complete");

    let mut by_project: HashMap<String, Vec<OperationalReport>> = HashMap::new();
    let mut project_to_department: HashMap<String, String> = HashMap::new();
    let mut operational_by_tenant: HashMap<sentinel_core::TenantId, OperationalReport> = HashMap::new();
    for (tenant, report) in &operational_reports {
        by_project.entry(tenant.project.clone()).or_default().push(report.clone());
        project_to_department.insert(tenant.project.clone(), tenant.department.clone());
        operational_by_tenant.insert(tenant.partition.tenant_id.clone(), report.clone());
    }

    let project_reports = run_bounded(&semaphore, by_project.into_iter(), {
        let customer_id = customer_id.clone();
        move |(project, reports): (String, Vec<OperationalReport>)| {
            let customer_id = customer_id.clone();
            async move { (project.clone(), compute_project(customer_id, project, &reports, now)) }
        }
    })
    .await;
    let project_by_name: HashMap<String, ProjectReport> = project_reports.into_iter().collect();

    let mut by_department: HashMap<String, Vec<ProjectReport>> = HashMap::new();
    for (project, department) in &project_to_department {
        if let Some(report) = project_by_name.get(project) {
            by_department.entry(department.clone()).or_default().push(report.clone());
        }
    }

    let department_reports = run_bounded(&semaphore, by_department.into_iter(), move |(department, projects): (String, Vec<ProjectReport>)| {
        async move { (department.clone(), compute_department(department, &projects, department_top_n, now)) }
    })
    .await;
    let department_by_name: HashMap<String, DepartmentReport> = department_reports.into_iter().collect();

    let clevel = compute_clevel(customer_id, &weekly_job_statistics, department_by_name.values().cloned().collect(), now);

    let delta_reports = run_bounded(&semaphore, operational_reports.iter().cloned(), move |(tenant, report): (TenantInput, OperationalReport)| {
        async move {
            let current = to_metric_record(&report, now);
            let current_compliant = report.compliance.iter().map(|c| c.resources_compliant).sum();
            let delta = compute_delta(current, tenant.previous_metric_record, current_compliant, tenant.previous_resources_compliant);
            (tenant.partition.tenant_id.clone(), delta)
        }
    })
    .await;
    let delta_by_tenant: HashMap<sentinel_core::TenantId, DeltaReport> = delta_reports.into_iter().collect();

    let finops_reports = run_bounded(&semaphore, tenants.iter().cloned(), {
        let rules_by_id = Arc::clone(&rules_by_id);
        move |tenant: TenantInput| {
            let rules_by_id = Arc::clone(&rules_by_id);
            async move {
                let is_new = tenant.previous_metric_record.is_none();
                let views = compute_finops(tenant.partition.clone(), &tenant.shards, &rules_by_id, is_new);
                (tenant.partition.tenant_id.clone(), views)
            }
        }
    })
    .await;
    let finops_by_tenant: HashMap<sentinel_core::TenantId, Vec<sentinel_core::FinOpsView>> = finops_reports.into_iter().collect();

    let kubernetes_reports = run_bounded(&semaphore, tenants.iter().cloned(), {
        let rules_by_id = Arc::clone(&rules_by_id);
        move |tenant: TenantInput| {
            let rules_by_id = Arc::clone(&rules_by_id);
            async move {
                let view = compute_kubernetes(tenant.partition.clone(), &tenant.shards, &rules_by_id);
                (tenant.partition.tenant_id.clone(), view)
            }
        }
    })
    .await;
    let kubernetes_by_tenant: HashMap<sentinel_core::TenantId, sentinel_core::KubernetesView> = kubernetes_reports.into_iter().collect();
    tracing::debug!(customer_id = %clevel.customer_id, "metrics pipeline run complete");

    PipelineOutput {
        operational: operational_by_tenant,
        project: project_by_name,
        department: department_by_name,
        clevel,
        delta: delta_by_tenant,
        finops: finops_by_tenant,
        kubernetes: kubernetes_by_tenant,
    }
}

/// Runs `f` over every item in `items` concurrently, bounded by `semaphore`,
/// and awaits the whole batch before returning — the barrier between one
/// pipeline stage and the next.
async fn run_bounded<I, F, Fut, O>(semaphore: &Arc<Semaphore>, items: I, f: F) -> Vec<O>
where
    I: Iterator,
    F: Fn(I::Item) -> Fut,
    Fut: std::future::Future<Output = O> + Send + 'static,
    O: Send + 'static,
{
    let tasks: Vec<_> = items
        .map(|item| {
            let semaphore = Arc::clone(semaphore);
            let future = f(item);
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                future.await
            })
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    results.into_iter().filter_map(Result::ok).collect()
}

#[cfg(test)]
mod tests {
    use sentinel_core::PartitionKey;
    use sentinel_core::TenantId;

    use super::*;

    fn tenant_input(tenant: &str, project: &str, department: &str) -> TenantInput {
        TenantInput {
            partition: PartitionKey { customer_id: CustomerId::new("cust-1"), tenant_id: TenantId::new(tenant), region: "*".to_string() },
            project: project.to_string(),
            department: department.to_string(),
            shards: vec![],
            resources_scanned: 5,
            previous_metric_record: None,
            previous_resources_compliant: 0,
        }
    }

    #[tokio::test]
    async fn pipeline_produces_a_report_per_tenant_and_rollup() {
        let input = PipelineInput {
            customer_id: CustomerId::new("cust-1"),
            tenants: vec![tenant_input("tenant-a", "project-x", "platform"), tenant_input("tenant-b", "project-x", "platform")],
            rules_by_id: HashMap::new(),
            weekly_job_statistics: vec![],
            department_top_n: 5,
            now: Timestamp::from_epoch_millis(0),
        };

        let output = run_pipeline(input).await;

        assert_eq!(output.operational.len(), 2);
        assert_eq!(output.project.len(), 1);
        assert_eq!(output.department.len(), 1);
        assert_eq!(output.delta.len(), 2);
        let project = output.project.get("project-x").expect("project report");
        assert_eq!(project.tenant_count, 2);
    }
}

//! Read-only preview of gate decisions for a node

use anyhow::Result;
use colored::Colorize;
use disruption_lib::{
    Action, BatchGate, Decision, InMemoryMetrics, KubeWorkloadLookup, SkipReason, WorkloadLookup,
};
use tabled::Tabled;

use crate::commands::window::state_label;
use crate::output::{
    color_status, format_duration, format_instant, print_info, print_json, print_table,
    print_warning, OutputFormat,
};

/// Row for decisions table
#[derive(Tabled)]
struct DecisionRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Schedule")]
    schedule: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Window")]
    window: String,
    #[tabled(rename = "Anchor")]
    anchor: String,
    #[tabled(rename = "Decision")]
    decision: String,
}

impl From<&Decision> for DecisionRow {
    fn from(decision: &Decision) -> Self {
        let window = decision.window.as_ref();
        Self {
            namespace: decision.workload.reference.namespace.clone(),
            pod: decision.workload.reference.name.clone(),
            schedule: or_dash(decision.workload.window_schedule()),
            duration: window
                .map(|w| format_duration(w.duration))
                .unwrap_or_else(|| "-".to_string()),
            window: window
                .map(|w| color_status(state_label(w.state)))
                .unwrap_or_else(|| "-".to_string()),
            anchor: format_instant(window.and_then(|w| w.anchor)),
            decision: color_status(action_label(decision.action)),
        }
    }
}

fn or_dash(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

pub fn action_label(action: Action) -> &'static str {
    match action {
        Action::Patch => "patch",
        Action::Skip(SkipReason::Unprotected) => "unprotected",
        Action::Skip(SkipReason::WindowClosed) => "window_closed",
    }
}

/// Show the decision each pod on `node` would receive right now
pub async fn show_node(node: &str, kubeconfig: Option<&str>, format: OutputFormat) -> Result<()> {
    let client = crate::client::connect(kubeconfig).await?;
    let workloads = KubeWorkloadLookup::new(client).workloads_on_node(node).await?;

    let metrics = InMemoryMetrics::new();
    let decisions = BatchGate::new(&metrics).decide(workloads);

    match format {
        OutputFormat::Json => print_json(&decisions)?,
        OutputFormat::Table => {
            println!("{}", "Disruption Decisions".bold());
            println!("{}", "=".repeat(60));
            println!("Node: {}", node.cyan());
            println!();

            let patches = decisions.iter().filter(|d| d.is_patch()).count();
            let protected = decisions
                .iter()
                .filter(|d| d.action != Action::Skip(SkipReason::Unprotected))
                .count();
            print_table(decisions.iter().map(DecisionRow::from).collect());
            println!();

            for (annotation, subject, _) in metrics.parse_failures() {
                print_warning(&format!("{}: {} failed to parse", subject, annotation));
            }
            print_info(&format!(
                "{} of {} protected pods would have do-not-disrupt removed",
                patches, protected
            ));
        }
    }
    Ok(())
}

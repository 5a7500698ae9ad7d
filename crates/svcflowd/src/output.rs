//! Terminal rendering

use colored::{ColoredString, Colorize};
use svcflow_cloud::{CanonicalResource, MappingTable, ParsedState, count_by_kind};
use svcflow_deployer::{DeployOutcome, FailureReason};
use svcflow_lifecycle::{DeploymentState, LifecycleOrder, OrderStatus, ServiceInstance};

pub fn state(state: DeploymentState) -> ColoredString {
    let text = state.as_str();
    if state.needs_operator() {
        text.red().bold()
    } else if state.is_failure() {
        text.red()
    } else if state.is_in_progress() {
        text.yellow()
    } else {
        text.green()
    }
}

/// What the operator can do about the last failure
fn next_step(state: DeploymentState, reason: &FailureReason) -> &'static str {
    if state.needs_operator() {
        "clean up by hand, then purge"
    } else if reason.kind.is_retry_safe() {
        "resubmit the order unchanged"
    } else {
        "fix scripts or variables before resubmitting"
    }
}

fn status(status: OrderStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        OrderStatus::Completed => text.green(),
        OrderStatus::Failed => text.red(),
        OrderStatus::Pending | OrderStatus::InFlight => text.yellow(),
    }
}

pub fn mapping_table(table: &MappingTable) {
    println!("{} {}", "Mapping table".bold(), table.csp().to_string().cyan());
    for rule in table.rules() {
        println!("  {} -> {}", rule.provider_type(), rule.kind().to_string().green());
        for (canonical, provider_attr) in rule.fields() {
            println!("      {} <- {}", canonical, provider_attr.dimmed());
        }
    }
}

pub fn inventory(resources: &[CanonicalResource]) {
    if resources.is_empty() {
        println!("  {}", "(no resources)".dimmed());
        return;
    }
    for resource in resources {
        println!(
            "  {:<20} {:<40} {} {}",
            resource.kind.to_string().cyan(),
            resource.resource_id,
            resource.name,
            format!("[{}.{}]", resource.group_type, resource.group_name).dimmed()
        );
        for (key, value) in &resource.properties {
            println!("      {}: {}", key, value);
        }
    }
    let counts: Vec<String> = count_by_kind(resources)
        .into_iter()
        .map(|(kind, count)| format!("{kind}={count}"))
        .collect();
    println!("  {}", counts.join(" ").dimmed());
}

pub fn parsed(parsed: &ParsedState) {
    println!("{}", "Resources".bold());
    inventory(&parsed.resources);
    println!("{}", "Outputs".bold());
    for (key, value) in &parsed.outputs {
        let sensitive = if parsed.sensitive_outputs.contains(key) {
            " (sensitive)".yellow().to_string()
        } else {
            String::new()
        };
        println!("  {} = {}{}", key, value, sensitive);
    }
}

pub fn instance(instance: &ServiceInstance, orders: &[LifecycleOrder]) {
    println!(
        "{} {} {}",
        instance.service_id.bold(),
        state(instance.state),
        format!(
            "({} {}, {} via {})",
            instance.template.name, instance.template.version, instance.csp, instance.deployer
        )
        .dimmed()
    );
    if let Some(reason) = &instance.last_failure {
        println!("  {} {}", "last failure:".red(), reason);
        println!("  {} {}", "next step:".dimmed(), next_step(instance.state, reason));
    }
    if let Some(active) = instance.active_order {
        println!("  {} {}", "active order:".yellow(), active);
    }

    println!("{}", "Inventory".bold());
    inventory(&instance.inventory);

    let outputs = instance.visible_outputs();
    if !outputs.is_empty() {
        println!("{}", "Outputs".bold());
        for (key, value) in outputs {
            println!("  {} = {}", key, value);
        }
    }

    println!("{}", "Orders".bold());
    for order in orders {
        let phase = order
            .phase
            .map(|p| format!(" phase={p:?}").to_lowercase())
            .unwrap_or_default();
        println!(
            "  {} {:<8} {}{} {}",
            order.order_id,
            order.task_type.to_string(),
            status(order.status),
            phase,
            order.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
        if let Some(reason) = &order.failure {
            println!("      {}", reason.to_string().red());
        }
    }
}

pub fn outcome(outcome: &DeployOutcome) {
    match outcome {
        DeployOutcome::Completed { document } => {
            let pretty = serde_json::from_str::<serde_json::Value>(document)
                .and_then(|value| serde_json::to_string_pretty(&value))
                .unwrap_or_else(|_| document.clone());
            println!("{}", pretty);
        }
        DeployOutcome::Failed { reason, .. } => {
            eprintln!("{} {}", "✗".red().bold(), reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcflow_deployer::ErrorKind;

    #[test]
    fn test_next_step_follows_failure() {
        let transport = FailureReason::new(ErrorKind::Transport, "connection reset");
        let script = FailureReason::new(ErrorKind::ScriptInvalid, "Unsupported argument");

        assert_eq!(
            next_step(DeploymentState::DeployFailed, &transport),
            "resubmit the order unchanged"
        );
        assert_eq!(
            next_step(DeploymentState::ModificationFailed, &script),
            "fix scripts or variables before resubmitting"
        );
        assert_eq!(
            next_step(DeploymentState::ManualCleanupRequired, &transport),
            "clean up by hand, then purge"
        );
    }
}

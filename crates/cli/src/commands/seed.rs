use serde_json::json;

use decalops_core::config::LoadOptions;
use decalops_db::DemoDataset;

use crate::commands::{
    execute, CommandFailure, CommandOutput, CommandResult, EXIT_MIGRATION,
    EXIT_SEED_VERIFICATION,
};

pub fn run(options: LoadOptions) -> CommandResult {
    execute("seed", options, "operator", |context| async move {
        let seeded = DemoDataset::load(&context.pool).await.map_err(|error| {
            CommandFailure::new("seed_execution", error.to_string(), EXIT_MIGRATION)
        })?;

        let verification = DemoDataset::verify(&context.pool).await.map_err(|error| {
            CommandFailure::new("seed_verification", error.to_string(), EXIT_SEED_VERIFICATION)
        })?;
        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err(CommandFailure::new(
                "seed_verification",
                verification_message(&failed_checks),
                EXIT_SEED_VERIFICATION,
            ));
        }

        let order_lines = seeded
            .orders_seeded
            .iter()
            .map(|order| format!("  - {} ({}): {}", order.order_id, order.stage, order.description))
            .collect::<Vec<_>>();
        let data = json!({
            "orders": seeded
                .orders_seeded
                .iter()
                .map(|order| json!({
                    "order_id": order.order_id,
                    "stage": order.stage,
                    "description": order.description,
                }))
                .collect::<Vec<_>>(),
            "rules_seeded": seeded.rules_seeded,
            "requests_seeded": seeded.requests_seeded,
        });

        Ok(CommandOutput {
            message: format!("demo dataset loaded:\n{}", order_lines.join("\n")),
            data: Some(data),
        })
    })
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

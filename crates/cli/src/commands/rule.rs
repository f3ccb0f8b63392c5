use clap::{Args, Subcommand};
use rust_decimal::Decimal;

use decalops_core::config::LoadOptions;
use decalops_core::{OrderPricingService, PricingRule, PricingRuleId, ServiceId};
use decalops_db::{SqlOrderRepository, SqlPricingRuleRepository};

use crate::commands::{execute, CommandOutput, CommandResult};

#[derive(Debug, Subcommand)]
pub enum RuleCommand {
    #[command(about = "Validate and create or replace a usage pricing rule")]
    Save(SaveArgs),
    #[command(about = "List the active pricing rules of a service")]
    List {
        #[arg(long)]
        service: String,
    },
}

#[derive(Debug, Args)]
pub struct SaveArgs {
    #[arg(long)]
    pub id: String,
    #[arg(long)]
    pub service: String,
    #[arg(long, help = "Base price per square meter")]
    pub base_price: Decimal,
    #[arg(long)]
    pub min_area: Option<Decimal>,
    #[arg(long)]
    pub max_area: Option<Decimal>,
    #[arg(long)]
    pub min_length: Option<Decimal>,
    #[arg(long)]
    pub max_length: Option<Decimal>,
    #[arg(long, help = "Multiplier applied for colour work")]
    pub color_factor: Option<Decimal>,
    #[arg(long, help = "Store the rule without activating it")]
    pub inactive: bool,
    #[arg(long)]
    pub description: Option<String>,
}

impl From<SaveArgs> for PricingRule {
    fn from(args: SaveArgs) -> Self {
        Self {
            id: PricingRuleId(args.id),
            service_id: ServiceId(args.service),
            base_price_per_sq_meter: args.base_price,
            min_area: args.min_area,
            max_area: args.max_area,
            min_length: args.min_length,
            max_length: args.max_length,
            color_pricing_factor: args.color_factor,
            is_active: !args.inactive,
            formula_description: args.description,
        }
    }
}

pub fn run(command: RuleCommand, options: LoadOptions, actor: &str) -> CommandResult {
    match command {
        RuleCommand::Save(args) => save(args, options, actor),
        RuleCommand::List { service } => list(service, options, actor),
    }
}

fn pricing(
    pool: decalops_db::DbPool,
    runtime: decalops_core::CoreRuntime,
) -> OrderPricingService<SqlOrderRepository, SqlPricingRuleRepository> {
    OrderPricingService::new(
        SqlOrderRepository::new(pool.clone()),
        SqlPricingRuleRepository::new(pool),
        runtime,
    )
}

fn save(args: SaveArgs, options: LoadOptions, actor: &str) -> CommandResult {
    execute("rule save", options, actor, |context| async move {
        let service = pricing(context.pool, context.runtime);
        let rule = service.save_rule(PricingRule::from(args), &context.audit).await?;
        CommandOutput::with_data(
            format!(
                "saved rule {} for {} ({})",
                rule.id.0,
                rule.service_id.0,
                if rule.is_active { "active" } else { "inactive" }
            ),
            &rule,
        )
    })
}

fn list(service_id: String, options: LoadOptions, actor: &str) -> CommandResult {
    execute("rule list", options, actor, |context| async move {
        let service = pricing(context.pool, context.runtime);
        let rules = service.list_active_rules(&ServiceId(service_id.clone())).await?;
        CommandOutput::with_data(
            format!("{} active rule(s) for {service_id}", rules.len()),
            &rules,
        )
    })
}

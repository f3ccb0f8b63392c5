use clap::{Args, Subcommand};
use rust_decimal::Decimal;

use decalops_core::config::LoadOptions;
use decalops_core::{OrderId, OrderLineId, OrderPricingService, UsageMeasurements};
use decalops_db::{SqlOrderRepository, SqlPricingRuleRepository};

use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult};

#[derive(Debug, Subcommand)]
pub enum LineCommand {
    #[command(about = "Record measured usage on a line, re-price it and update the order total")]
    Measure(MeasureArgs),
}

#[derive(Debug, Args)]
pub struct MeasureArgs {
    pub order_id: String,
    pub line_id: String,
    #[arg(long, help = "Covered area in square meters")]
    pub area: Option<Decimal>,
    #[arg(long, help = "Measured length in meters")]
    pub length: Option<Decimal>,
    #[arg(long, help = "Measured width in meters")]
    pub width: Option<Decimal>,
}

pub fn run(command: LineCommand, options: LoadOptions, actor: &str) -> CommandResult {
    match command {
        LineCommand::Measure(args) => measure(args, options, actor),
    }
}

fn measure(args: MeasureArgs, options: LoadOptions, actor: &str) -> CommandResult {
    execute("line measure", options, actor, |context| async move {
        let usage = UsageMeasurements { area: args.area, length: args.length, width: args.width };
        if usage.is_empty() {
            return Err(CommandFailure::bad_input(
                "at least one of --area, --length or --width is required",
            ));
        }

        let pricing = OrderPricingService::new(
            SqlOrderRepository::new(context.pool.clone()),
            SqlPricingRuleRepository::new(context.pool),
            context.runtime,
        )
        .with_currency(context.config.workflow.currency);
        let priced = pricing
            .record_line_usage(
                &OrderId(args.order_id),
                &OrderLineId(args.line_id),
                usage,
                &context.audit,
            )
            .await?;

        let message = match priced.lines.first() {
            Some(line) => format!(
                "line {} priced at {} ({}); order total {} {}",
                line.line.id.0,
                line.line.final_calculated_price,
                line.outcome.as_str(),
                priced.total_amount,
                priced.currency
            ),
            None => format!("order total {} {}", priced.total_amount, priced.currency),
        };
        CommandOutput::with_data(message, &priced)
    })
}

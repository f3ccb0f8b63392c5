use clap::{Args, Subcommand};
use rust_decimal::Decimal;
use serde_json::json;

use decalops_core::config::LoadOptions;
use decalops_core::{
    CustomerId, EmployeeId, NewOrder, NewOrderLine, OrderId, OrderPricingService, OrderService,
    ServiceId, Stage, StageChange, StageLedger,
};
use decalops_db::{SqlOrderRepository, SqlPricingRuleRepository};

use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult};

#[derive(Debug, Subcommand)]
pub enum OrderCommand {
    #[command(about = "Open an order at Survey with one or more catalog lines")]
    Open(OpenArgs),
    #[command(about = "Move an order one stage forward or back")]
    Stage(StageArgs),
    #[command(about = "Show the stage history and completion of an order")]
    Timeline { order_id: String },
    #[command(about = "Show an order with its lines")]
    Show { order_id: String },
    #[command(about = "Set the free-text status label of an order")]
    Status { order_id: String, label: String },
    #[command(about = "Re-price every line of an order and recompute its total")]
    Reprice { order_id: String },
}

#[derive(Debug, Args)]
pub struct OpenArgs {
    #[arg(long)]
    pub customer: String,
    #[arg(long)]
    pub employee: Option<String>,
    #[arg(
        long = "line",
        required = true,
        value_parser = parse_line,
        help = "Catalog line as SERVICE_ID:QUANTITY:QUOTED_PRICE (repeatable)"
    )]
    pub lines: Vec<LineArg>,
    #[arg(long)]
    pub opened_by: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct StageArgs {
    pub order_id: String,
    #[arg(value_parser = parse_stage)]
    pub target: Stage,
    #[arg(long)]
    pub by: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineArg {
    pub service_id: String,
    pub quantity: u32,
    pub quoted_price: Decimal,
}

pub fn parse_line(value: &str) -> Result<LineArg, String> {
    let mut parts = value.splitn(3, ':');
    let (Some(service_id), Some(quantity), Some(quoted_price)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected SERVICE_ID:QUANTITY:QUOTED_PRICE, got `{value}`"));
    };
    if service_id.trim().is_empty() {
        return Err("service id must not be empty".to_string());
    }
    let quantity = quantity
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("quantity `{quantity}` is not a whole number"))?;
    let quoted_price = quoted_price
        .trim()
        .parse::<Decimal>()
        .map_err(|_| format!("quoted price `{quoted_price}` is not a decimal amount"))?;
    Ok(LineArg { service_id: service_id.trim().to_string(), quantity, quoted_price })
}

pub fn parse_stage(value: &str) -> Result<Stage, String> {
    Stage::parse(value).ok_or_else(|| {
        format!(
            "unknown stage `{value}` (expected survey|designing|production_and_installation|\
             acceptance_and_delivery)"
        )
    })
}

pub fn run(command: OrderCommand, options: LoadOptions, actor: &str) -> CommandResult {
    match command {
        OrderCommand::Open(args) => open(args, options, actor),
        OrderCommand::Stage(args) => stage(args, options, actor),
        OrderCommand::Timeline { order_id } => timeline(order_id, options, actor),
        OrderCommand::Show { order_id } => show(order_id, options, actor),
        OrderCommand::Status { order_id, label } => status(order_id, label, options, actor),
        OrderCommand::Reprice { order_id } => reprice(order_id, options, actor),
    }
}

fn open(args: OpenArgs, options: LoadOptions, actor: &str) -> CommandResult {
    execute("order open", options, actor, |context| async move {
        if args.lines.iter().any(|line| line.quantity == 0) {
            return Err(CommandFailure::bad_input("line quantity must be at least 1"));
        }
        let service = OrderService::new(SqlOrderRepository::new(context.pool), context.runtime);
        let opened = service
            .open_order(
                NewOrder {
                    customer_id: CustomerId(args.customer),
                    assigned_employee_id: args.employee.map(EmployeeId),
                    lines: args
                        .lines
                        .into_iter()
                        .map(|line| NewOrderLine {
                            service_id: ServiceId(line.service_id),
                            quantity: line.quantity,
                            quoted_price: line.quoted_price,
                        })
                        .collect(),
                    opened_by: args.opened_by.map(EmployeeId),
                    notes: args.notes,
                },
                &context.audit,
            )
            .await?;

        CommandOutput::with_data(
            format!(
                "opened order {} with {} line(s), total {}",
                opened.order.id.0,
                opened.lines.len(),
                opened.order.total_amount
            ),
            &opened,
        )
    })
}

fn stage(args: StageArgs, options: LoadOptions, actor: &str) -> CommandResult {
    execute("order stage", options, actor, |context| async move {
        let ledger = StageLedger::new(SqlOrderRepository::new(context.pool), context.runtime);
        let order_id = OrderId(args.order_id);
        let entry = ledger
            .record_transition(
                StageChange {
                    order_id: order_id.clone(),
                    target: args.target,
                    changed_by: args.by.map(EmployeeId),
                    notes: args.notes,
                },
                &context.audit,
            )
            .await?;
        let completion_percentage = ledger.completion_percentage(&order_id).await?;

        Ok(CommandOutput {
            message: format!(
                "order {} moved to {} ({completion_percentage}% complete)",
                order_id.0, entry.stage
            ),
            data: Some(json!({
                "entry": entry,
                "completion_percentage": completion_percentage,
            })),
        })
    })
}

fn timeline(order_id: String, options: LoadOptions, actor: &str) -> CommandResult {
    execute("order timeline", options, actor, |context| async move {
        let ledger = StageLedger::new(SqlOrderRepository::new(context.pool), context.runtime);
        let timeline = ledger.timeline(&OrderId(order_id)).await?;
        CommandOutput::with_data(
            format!(
                "order {} is at {} ({}% complete, {} entries)",
                timeline.order_id.0,
                timeline.current_stage,
                timeline.completion_percentage,
                timeline.entries.len()
            ),
            &timeline,
        )
    })
}

fn show(order_id: String, options: LoadOptions, actor: &str) -> CommandResult {
    execute("order show", options, actor, |context| async move {
        let service = OrderService::new(SqlOrderRepository::new(context.pool), context.runtime);
        let details = service.order_details(&OrderId(order_id)).await?;
        CommandOutput::with_data(
            format!(
                "order {} ({}) at {}, total {}",
                details.order.id.0,
                details.order.order_status,
                details.order.current_stage,
                details.order.total_amount
            ),
            &details,
        )
    })
}

fn status(order_id: String, label: String, options: LoadOptions, actor: &str) -> CommandResult {
    execute("order status", options, actor, |context| async move {
        let service = OrderService::new(SqlOrderRepository::new(context.pool), context.runtime);
        let order = service.set_order_status(&OrderId(order_id), &label, &context.audit).await?;
        CommandOutput::with_data(
            format!("order {} status set to {}", order.id.0, order.order_status),
            &order,
        )
    })
}

fn reprice(order_id: String, options: LoadOptions, actor: &str) -> CommandResult {
    execute("order reprice", options, actor, |context| async move {
        let pricing = OrderPricingService::new(
            SqlOrderRepository::new(context.pool.clone()),
            SqlPricingRuleRepository::new(context.pool),
            context.runtime,
        )
        .with_currency(context.config.workflow.currency);
        let repriced = pricing.reprice_order(&OrderId(order_id), &context.audit).await?;
        CommandOutput::with_data(
            format!(
                "order {} repriced: total {} {}, {} line(s) kept their quoted price",
                repriced.order_id.0,
                repriced.total_amount,
                repriced.currency,
                repriced.fallback_lines().count()
            ),
            &repriced,
        )
    })
}

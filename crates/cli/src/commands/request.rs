use chrono::NaiveDate;
use clap::{Args, Subcommand};
use rust_decimal::Decimal;

use decalops_core::config::LoadOptions;
use decalops_core::{
    ConversionInput, CustomerId, EmployeeId, EstimateRefinement, NewServiceRequest,
    RequestConversionWorkflow, RequestId, RequestIntake, ServiceId,
};
use decalops_db::SqlServiceRequestRepository;

use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult};

#[derive(Debug, Subcommand)]
pub enum RequestCommand {
    #[command(about = "Submit a custom service request")]
    Submit(SubmitArgs),
    #[command(about = "Start sales review of a new request")]
    Review {
        request_id: String,
        #[arg(long)]
        sales: String,
    },
    #[command(about = "Record a sales estimate and mark the request quoted")]
    Quote(QuoteArgs),
    #[command(about = "Reject a request")]
    Reject {
        request_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    #[command(about = "Convert a request into an order in one atomic write")]
    Convert(ConvertArgs),
    #[command(about = "Show a request")]
    Show { request_id: String },
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub customer: String,
    #[arg(long)]
    pub description: String,
    #[arg(long)]
    pub image_url: Option<String>,
    #[arg(long, help = "Desired completion date (YYYY-MM-DD)")]
    pub desired_date: Option<NaiveDate>,
}

#[derive(Debug, Args)]
pub struct QuoteArgs {
    pub request_id: String,
    #[arg(long)]
    pub sales: String,
    #[arg(long)]
    pub cost: Option<Decimal>,
    #[arg(long)]
    pub work_units: Option<Decimal>,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    pub request_id: String,
    #[arg(long)]
    pub employee: String,
    #[arg(long)]
    pub cost: Decimal,
    #[arg(long)]
    pub work_units: Decimal,
    #[arg(long, help = "Order line service; defaults to workflow.custom_service_id")]
    pub service: Option<String>,
}

pub fn run(command: RequestCommand, options: LoadOptions, actor: &str) -> CommandResult {
    match command {
        RequestCommand::Submit(args) => submit(args, options, actor),
        RequestCommand::Review { request_id, sales } => review(request_id, sales, options, actor),
        RequestCommand::Quote(args) => quote(args, options, actor),
        RequestCommand::Reject { request_id, reason } => {
            reject(request_id, reason, options, actor)
        }
        RequestCommand::Convert(args) => convert(args, options, actor),
        RequestCommand::Show { request_id } => show(request_id, options, actor),
    }
}

fn submit(args: SubmitArgs, options: LoadOptions, actor: &str) -> CommandResult {
    execute("request submit", options, actor, |context| async move {
        let intake =
            RequestIntake::new(SqlServiceRequestRepository::new(context.pool), context.runtime);
        let request = intake
            .submit(
                NewServiceRequest {
                    customer_id: CustomerId(args.customer),
                    description: args.description,
                    reference_image_url: args.image_url,
                    desired_completion_date: args.desired_date,
                },
                &context.audit,
            )
            .await?;
        CommandOutput::with_data(format!("submitted request {}", request.id.0), &request)
    })
}

fn review(request_id: String, sales: String, options: LoadOptions, actor: &str) -> CommandResult {
    execute("request review", options, actor, |context| async move {
        let intake =
            RequestIntake::new(SqlServiceRequestRepository::new(context.pool), context.runtime);
        let request = intake
            .start_review(&RequestId(request_id), EmployeeId(sales), &context.audit)
            .await?;
        CommandOutput::with_data(format!("request {} under review", request.id.0), &request)
    })
}

fn quote(args: QuoteArgs, options: LoadOptions, actor: &str) -> CommandResult {
    execute("request quote", options, actor, |context| async move {
        let intake =
            RequestIntake::new(SqlServiceRequestRepository::new(context.pool), context.runtime);
        let request = intake
            .refine_estimate(
                &RequestId(args.request_id),
                EstimateRefinement {
                    sales_employee_id: EmployeeId(args.sales),
                    estimated_cost: args.cost,
                    estimated_work_units: args.work_units,
                },
                &context.audit,
            )
            .await?;
        CommandOutput::with_data(format!("request {} quoted", request.id.0), &request)
    })
}

fn reject(
    request_id: String,
    reason: Option<String>,
    options: LoadOptions,
    actor: &str,
) -> CommandResult {
    execute("request reject", options, actor, |context| async move {
        let intake =
            RequestIntake::new(SqlServiceRequestRepository::new(context.pool), context.runtime);
        let request = intake.reject(&RequestId(request_id), reason, &context.audit).await?;
        CommandOutput::with_data(format!("request {} rejected", request.id.0), &request)
    })
}

fn convert(args: ConvertArgs, options: LoadOptions, actor: &str) -> CommandResult {
    execute("request convert", options, actor, |context| async move {
        let custom_service_id =
            args.service.unwrap_or_else(|| context.config.workflow.custom_service_id.clone());
        if custom_service_id.trim().is_empty() {
            return Err(CommandFailure::bad_input("custom service id must not be empty"));
        }

        let workflow = RequestConversionWorkflow::new(
            SqlServiceRequestRepository::new(context.pool),
            context.runtime,
        );
        let converted = workflow
            .convert_to_order(
                ConversionInput {
                    request_id: RequestId(args.request_id),
                    assigned_employee_id: EmployeeId(args.employee),
                    final_estimated_cost: args.cost,
                    final_estimated_work_units: args.work_units,
                    custom_service_id: ServiceId(custom_service_id),
                },
                &context.audit,
            )
            .await?;
        CommandOutput::with_data(
            format!(
                "request {} converted to order {} ({} {})",
                converted.request.id.0,
                converted.order.id.0,
                converted.order.total_amount,
                context.config.workflow.currency
            ),
            &converted,
        )
    })
}

fn show(request_id: String, options: LoadOptions, actor: &str) -> CommandResult {
    execute("request show", options, actor, |context| async move {
        let intake =
            RequestIntake::new(SqlServiceRequestRepository::new(context.pool), context.runtime);
        let request = intake.find(&RequestId(request_id)).await?;
        CommandOutput::with_data(
            format!("request {} is {}", request.id.0, request.status.as_str()),
            &request,
        )
    })
}

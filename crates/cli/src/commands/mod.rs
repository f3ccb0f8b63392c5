pub mod config;
pub mod line;
pub mod migrate;
pub mod order;
pub mod request;
pub mod rule;
pub mod seed;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use decalops_core::config::{AppConfig, LoadOptions};
use decalops_core::{
    ApplicationError, AuditContext, CoreRuntime, IdGenerator, InterfaceError, UuidGenerator,
};
use decalops_db::{connect_with_config, migrations, DbPool};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_SEED_VERIFICATION: u8 = 6;
pub const EXIT_BAD_REQUEST: u8 = 7;
pub const EXIT_NOT_FOUND: u8 = 8;
pub const EXIT_CONFLICT: u8 = 9;
pub const EXIT_UNAVAILABLE: u8 = 10;
pub const EXIT_INTERNAL: u8 = 11;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\
             \"message\":\"{}\",\"data\":null}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Why a command stopped: stable class, operator message and process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl CommandFailure {
    pub fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new("invalid_input", message, EXIT_BAD_REQUEST)
    }
}

impl From<ApplicationError> for CommandFailure {
    fn from(error: ApplicationError) -> Self {
        let error_class = error.error_class();
        let message = error.to_string();
        let exit_code = match InterfaceError::from(error) {
            InterfaceError::BadRequest { .. } => EXIT_BAD_REQUEST,
            InterfaceError::NotFound { .. } => EXIT_NOT_FOUND,
            InterfaceError::Conflict { .. } => EXIT_CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => EXIT_UNAVAILABLE,
            InterfaceError::Internal { .. } => EXIT_INTERNAL,
        };
        Self { error_class, message, exit_code }
    }
}

/// Successful command payload: a one-line summary plus structured data.
#[derive(Debug)]
pub struct CommandOutput {
    pub message: String,
    pub data: Option<Value>,
}

impl CommandOutput {
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: message.into(), data: None }
    }

    pub fn with_data<T: Serialize>(
        message: impl Into<String>,
        data: &T,
    ) -> Result<Self, CommandFailure> {
        let data = serde_json::to_value(data).map_err(|error| {
            CommandFailure::new("serialization", error.to_string(), EXIT_INTERNAL)
        })?;
        Ok(Self { message: message.into(), data: Some(data) })
    }
}

/// Everything a database-backed command needs once setup succeeded.
#[derive(Clone)]
pub struct CommandContext {
    pub config: AppConfig,
    pub pool: DbPool,
    pub runtime: CoreRuntime,
    pub audit: AuditContext,
}

/// Loads configuration, connects, applies pending migrations and runs `work`
/// on a current-thread runtime. Setup failures map to the fixed operator
/// exit codes; `work` failures carry their own.
pub fn execute<F, Fut>(
    command: &str,
    options: LoadOptions,
    actor: &str,
    work: F,
) -> CommandResult
where
    F: FnOnce(CommandContext) -> Fut,
    Fut: Future<Output = Result<CommandOutput, CommandFailure>>,
{
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let correlation_id = UuidGenerator.next_id("cli");
    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database).await.map_err(|error| {
            CommandFailure::new("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY)
        })?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| CommandFailure::new("migration", error.to_string(), EXIT_MIGRATION))?;

        let context = CommandContext {
            config,
            pool: pool.clone(),
            runtime: CoreRuntime::default(),
            audit: AuditContext::new(correlation_id.clone(), actor),
        };
        let outcome = work(context).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(output) => CommandResult::success_with_data(command, output.message, output.data),
        Err(failure) => {
            tracing::warn!(
                event_name = "cli.command_failed",
                command,
                correlation_id = %correlation_id,
                error_class = failure.error_class,
                exit_code = failure.exit_code,
                "{}",
                failure.message
            );
            CommandResult::failure(command, failure.error_class, failure.message, failure.exit_code)
        }
    }
}

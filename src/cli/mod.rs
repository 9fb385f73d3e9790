//! Command-line interface.

pub mod commands;
pub mod output;
pub mod runtime;
pub mod types;

pub use types::{Cli, Commands, PolicyArg};

use anyhow::Result;

use crate::domain::errors::DomainError;
use crate::domain::models::Config;
use commands::{decision, model, system};

/// Run a parsed command against the configured store.
pub async fn execute(cli: Cli, config: Config) -> Result<()> {
    let json = cli.json;
    if matches!(cli.command, Commands::Config) {
        system::show_config(&config, json);
        return Ok(());
    }

    let service = runtime::build_service(&config).await?;
    match cli.command {
        Commands::Create { name, variants, policy, epsilon } => {
            model::create(&service, &name, &variants, policy, epsilon, json).await
        }
        Commands::List => model::list(&service, json).await,
        Commands::Show { model_id } => model::show(&service, &model_id, json).await,
        Commands::Details { model_id } => model::details(&service, &model_id, json).await,
        Commands::Recommend { model_id, context, request_id } => {
            decision::recommend(&service, &model_id, context.as_deref(), request_id, json).await
        }
        Commands::Update { model_id, decision, reward, context, request_id, file } => {
            let args = decision::UpdateArgs {
                decision: decision.as_deref(),
                reward,
                context: context.as_deref(),
                request_id,
                file: file.as_deref(),
            };
            decision::update(&service, &model_id, args, json).await
        }
        Commands::Rollout { model_id, arm } => model::rollout(&service, &model_id, &arm, json).await,
        Commands::ClearRollout { model_id } => model::clear_rollout(&service, &model_id, json).await,
        Commands::Delete { model_id } => model::delete(&service, &model_id, json).await,
        Commands::Health => system::health(&service, json).await,
        Commands::Config => Ok(()),
    }
}

/// Print an error the way the output mode expects and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let retryable = err
            .downcast_ref::<DomainError>()
            .is_some_and(DomainError::is_retryable);
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
            "retryable": retryable,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}

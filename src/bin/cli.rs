use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use work_tree::prelude::*;

#[derive(Parser)]
#[command(name = "work-tree")]
#[command(about = "Run sample work trees", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print the full run result as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send notifications over the enabled channels
    Notifications {
        #[arg(long, default_value = "user-1")]
        user: String,

        #[arg(long)]
        email: bool,

        #[arg(long)]
        sms: bool,

        #[arg(long)]
        push: bool,
    },
    /// Process a request unless maintenance mode is on
    Maintenance {
        /// Turn maintenance mode on
        #[arg(long)]
        enabled: bool,
    },
    /// Validate and fetch a user through a sealed workflow
    Sealed {
        #[arg(long, default_value = "user-123")]
        user: String,
    },
    /// Fan out to several simulated services and wait for all of them
    FanOut {
        #[arg(short, long, default_value_t = 3)]
        members: usize,

        /// Simulated latency of each member
        #[arg(long, default_value_t = 50)]
        delay_ms: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRequest {
    user_id: String,
    send_email: bool,
    send_sms: bool,
    send_push: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct MaintenanceRequest {
    maintenance_mode: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRequest {
    user_id: String,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "work_tree=debug"
    } else {
        "work_tree=info"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = match &cli.config {
        Some(path) => {
            if !cli.json {
                println!("Using config: {}\n", path.display());
            }
            EngineConfig::load(path)?
        }
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Notifications {
            user,
            email,
            sms,
            push,
        } => {
            let request = NotificationRequest {
                user_id: user,
                send_email: email,
                send_sms: sms,
                send_push: push,
            };
            let result = notifications_tree()?.with_config(config).run(request).await;
            report(&result, "logNotifications", cli.json)
        }
        Commands::Maintenance { enabled } => {
            let tree = maintenance_tree()?.with_config(config);
            let request = MaintenanceRequest {
                maintenance_mode: enabled,
            };
            let skipped = tree.is_skipped(request.clone()).await;
            if !cli.json {
                println!("isSkipped: {}", skipped);
            }
            let result = tree.run(request).await;
            report(&result, "maintenanceMode", cli.json)
        }
        Commands::Sealed { user } => {
            let sealed = user_workflow(config)?;
            if !cli.json {
                println!("Name: {}", sealed.name());
                println!("Is sealed: {}\n", sealed.is_sealed());
            }
            let result = sealed.run(UserRequest { user_id: user }).await;
            report(&result, "fetchUser", cli.json)
        }
        Commands::FanOut { members, delay_ms } => {
            let result = fan_out(members, Duration::from_millis(delay_ms))?
                .with_config(config)
                .run(())
                .await;
            report(&result, "summary", cli.json)
        }
    }
}

fn notifications_tree() -> Result<Tree<NotificationRequest>, CompositionError> {
    Tree::new("notifications")
        .serial(Step::new(
            "fetchUserPreferences",
            |ctx: Context<NotificationRequest>| async move {
                tracing::info!("Fetching preferences for user: {}", ctx.data().user_id);
                Ok(json!({
                    "email": "user@example.com",
                    "phone": "+1234567890",
                    "deviceToken": "abc123",
                }))
            },
        ))?
        .serial(channel("sendEmailNotification", "email", "email", |r| r.send_email))?
        .serial(channel("sendSmsNotification", "sms", "phone", |r| r.send_sms))?
        .serial(channel("sendPushNotification", "push", "deviceToken", |r| r.send_push))?
        .serial(Step::new(
            "logNotifications",
            |ctx: Context<NotificationRequest>| async move {
                let sent: Vec<&str> = [
                    ("sendEmailNotification", "email"),
                    ("sendSmsNotification", "sms"),
                    ("sendPushNotification", "push"),
                ]
                .into_iter()
                .filter(|(step, _)| ctx.result(step).is_some())
                .map(|(_, kind)| kind)
                .collect();
                Ok(json!({ "notificationsSent": sent }))
            },
        ))
}

fn channel(
    name: &'static str,
    kind: &'static str,
    address_field: &'static str,
    enabled: fn(&NotificationRequest) -> bool,
) -> Step<NotificationRequest> {
    Step::new(name, move |ctx: Context<NotificationRequest>| async move {
        let Some(address) = ctx
            .result("fetchUserPreferences")
            .and_then(|prefs| prefs.get(address_field))
            .and_then(|v| v.as_str())
        else {
            anyhow::bail!("no {} address in preferences", kind);
        };
        tracing::info!("Sending {} to: {}", kind, address);
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(json!({ "type": kind, "sent": true }))
    })
    .should_run(move |ctx: &Context<NotificationRequest>| enabled(ctx.data()))
    .on_skipped(move |ctx: &Context<NotificationRequest>| {
        tracing::info!("{} notification skipped for user: {}", kind, ctx.data().user_id);
        Ok(())
    })
}

fn maintenance_tree() -> Result<Tree<MaintenanceRequest>, CompositionError> {
    Tree::new("maintenanceMode")
        .should_run(|ctx: &Context<MaintenanceRequest>| !ctx.data().maintenance_mode)
        .on_skipped(|_ctx: &Context<MaintenanceRequest>| {
            tracing::warn!("System is in maintenance mode, skipping all operations");
            Ok(())
        })
        .serial(Step::new(
            "processRequest",
            |_ctx: Context<MaintenanceRequest>| async {
                tracing::info!("Processing request...");
                Ok(json!({ "processed": true }))
            },
        ))
}

fn user_workflow(config: EngineConfig) -> Result<Sealed<UserRequest>, CompositionError> {
    let workflow = Workflow::new()
        .with_config(config)
        .serial(Step::new("validate", |ctx: Context<UserRequest>| async move {
            tracing::info!("Validating user ID: {}", ctx.data().user_id);
            Ok(!ctx.data().user_id.is_empty())
        }))?
        .serial(Step::new("fetchUser", |ctx: Context<UserRequest>| async move {
            if ctx.result_as::<bool>("validate") != Some(true) {
                anyhow::bail!("Invalid user ID");
            }
            tracing::info!("Fetching user: {}", ctx.data().user_id);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!({
                "id": ctx.data().user_id,
                "name": "John Doe",
                "email": "john@example.com",
            }))
        }))?;

    Ok(workflow.seal_with(SealOptions::new().execute(
        |ctx: Context<UserRequest>, next| async move {
            tracing::info!(">>> Before workflow execution");
            let result = next.execute(ctx).await;
            tracing::info!("<<< After workflow execution");
            result
        },
    )))
}

fn fan_out(members: usize, delay: Duration) -> Result<Workflow<()>, CompositionError> {
    let services: Vec<Step<()>> = (1..=members)
        .map(|i| {
            Step::new(format!("service-{}", i), move |_ctx: Context<()>| async move {
                let latency = delay * i as u32;
                tokio::time::sleep(latency).await;
                Ok(json!({ "service": i, "latencyMs": latency.as_millis() as u64 }))
            })
        })
        .collect();

    Workflow::new()
        .parallel_named("services", services)?
        .serial(Step::new("summary", move |ctx: Context<()>| async move {
            let responded = (1..=members)
                .filter(|i| ctx.result(&format!("service-{}", i)).is_some())
                .count();
            Ok(json!({ "responded": responded }))
        }))
}

fn report<D: Serialize>(result: &RunResult<D>, focus: &str, as_json: bool) -> anyhow::Result<bool> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(result.is_completed());
    }

    println!("\n=== Run Result ===\n");
    println!("Status: {}", if result.is_completed() { "COMPLETED" } else { "FAILED" });
    println!("Run ID: {}", result.context.run_id());
    println!("Duration: {:?}\n", result.total_duration);

    for (name, work) in result.work_results().iter() {
        let status = match work.status {
            WorkStatus::Completed => "✓",
            WorkStatus::Skipped => "-",
            WorkStatus::Failed => "✗",
        };
        println!("{} {}", status, name);
        if let Some(err) = &work.error {
            println!("      Error: {}", err);
        }
    }

    match result.result(focus) {
        Some(value) => println!("\n{}: {}", focus, value),
        None => println!("\n{}: (no result)", focus),
    }

    if let Some(err) = &result.error {
        println!("\nError: {}", err);
    }

    Ok(result.is_completed())
}

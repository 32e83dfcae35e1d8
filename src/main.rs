use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::{sync::Arc, time::Duration};
use toggle_keeper::{
    admin::AdminApi,
    config::{self, database},
    context::ToggleContext,
    core::{
        category::CategoryRegistry,
        hooks::{HookDispatcher, LogHook},
    },
    errors::{Error, Result},
    models::User,
    store::{SqliteStore, TimedStore},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const HOOK_DRAIN_LIMIT: Duration = Duration::from_secs(5);

/// Administer applications, features and toggles in the configured store.
#[derive(Debug, Parser)]
#[command(name = "toggle-keeper", version)]
struct Cli {
    /// Attribute the action to this user (needed when `requires_auth` is set)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered applications
    Apps,
    /// Register an application
    AddApp { name: String },
    /// Delete an application and every key it owns
    DeleteApp { name: String },
    /// Show the category table filled with an application's features
    Categories { application: String },
    /// Show one feature
    Get { application: String, feature: String },
    /// Create a feature; category 0 makes a simple on/off feature
    Add {
        application: String,
        feature: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 0)]
        category: u32,
    },
    /// Delete a feature
    Delete { application: String, feature: String },
    /// Switch a simple feature on or off
    Set {
        application: String,
        feature: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
    /// Add a named toggle to a multi feature
    AddToggle {
        application: String,
        feature: String,
        toggle: String,
    },
    /// Switch one named toggle of a multi feature
    SetToggle {
        application: String,
        feature: String,
        toggle: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
    /// Replace a feature's description
    Describe {
        application: String,
        feature: String,
        description: String,
    },
    /// Print a feature's audit trail, newest first
    Audit { application: String, feature: String },
    /// Print an application's audit trail, newest first
    AppAudit { application: String },
    /// Rewrite hash-encoded toggles of an application into the JSON encoding
    Migrate { application: String },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(api: &AdminApi, session: Option<&User>, command: Command) -> Result<()> {
    match command {
        Command::Apps => print_json(&api.list_applications().await?),
        Command::AddApp { name } => api.add_application(session, &name).await,
        Command::DeleteApp { name } => api.delete_application(session, &name).await,
        Command::Categories { application } => {
            let categories = api.get_feature_categories(&application).await?;
            print_json(&categories.into_values().collect::<Vec<_>>())
        }
        Command::Get {
            application,
            feature,
        } => print_json(&api.get_feature(&application, &feature).await?),
        Command::Add {
            application,
            feature,
            description,
            category,
        } => {
            api.add_feature(session, &application, &feature, &description, category)
                .await
        }
        Command::Delete {
            application,
            feature,
        } => api.delete_feature(session, &application, &feature).await,
        Command::Set {
            application,
            feature,
            value,
        } => {
            api.update_toggle(session, &application, &feature, value)
                .await
        }
        Command::AddToggle {
            application,
            feature,
            toggle,
        } => {
            api.add_multi_toggle(session, &application, &feature, &toggle)
                .await
        }
        Command::SetToggle {
            application,
            feature,
            toggle,
            value,
        } => {
            api.update_multi_toggle(session, &application, &feature, &toggle, value)
                .await
        }
        Command::Describe {
            application,
            feature,
            description,
        } => {
            api.update_description(session, &application, &feature, &description)
                .await
        }
        Command::Audit {
            application,
            feature,
        } => print_json(&api.get_audit_trail(&application, &feature).await?),
        Command::AppAudit { application } => {
            print_json(&api.get_application_audit_trail(&application).await?)
        }
        Command::Migrate { application } => {
            let migrated = api.migrate_application(&application).await?;
            info!("Migrated {} toggle keys of {}", migrated, application);
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    let cli = Cli::parse();

    // 3. Load the configuration; a malformed category table is fatal
    let app_config = config::load_default_config()
        .inspect_err(|e| error!("Critical error loading configuration: {}", e))?;
    let categories = CategoryRegistry::from_config(&app_config.categories)
        .inspect_err(|e| error!("Invalid category table: {}", e))?;

    // 4. Connect the store
    let url = database::resolve_database_url(&app_config.store.url);
    let db = database::connect(&url)
        .await
        .inspect_err(|e| error!("Failed to open store: {}", e))?;
    let store = TimedStore::new(SqliteStore::new(db), app_config.store.timeout());

    // 5. Wire the context and run the command
    let hooks = HookDispatcher::new().with_handler(Arc::new(LogHook));
    let context = ToggleContext::new(Arc::new(store), categories, hooks);
    let api = AdminApi::new(context, app_config.requires_auth);

    let session = cli.user.map(User::named);
    run(&api, session.as_ref(), cli.command)
        .await
        .inspect_err(|e| match e {
            Error::PartialWrite { .. } => error!("Store left partially updated: {}", e),
            _ => error!("Command failed: {}", e),
        })?;

    // 6. Give hook deliveries a chance to finish before the runtime shuts down
    api.context().hooks.drain(HOOK_DRAIN_LIMIT).await;
    Ok(())
}

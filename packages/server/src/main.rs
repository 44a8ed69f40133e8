use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use backoffice::config::AppConfig;
use backoffice::services::{permissions, settings, translations};
use backoffice::state::AppState;
use backoffice::{build_router, database, seed};

#[derive(Parser)]
#[command(name = "backoffice", version, about = "Admin panel backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Create missing permissions and grant them all to the admin role.
    SyncPermissions,
    /// Insert settings defined in the settings file that have no row yet.
    SyncSettings {
        /// Overrides `admin.settings_file`.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Move translations between the database and `{locale}.json` files.
    Translations {
        #[command(subcommand)]
        action: TranslationsAction,
    },
    /// Create an administrator, or reset its password if the email exists.
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "BACKOFFICE_ADMIN_PASSWORD")]
        password: String,
        #[arg(long, default_value = "Administrator")]
        name: String,
    },
}

#[derive(Subcommand)]
enum TranslationsAction {
    Export {
        #[arg(long, default_value = "lang")]
        dir: PathBuf,
    },
    Import {
        #[arg(long, default_value = "lang")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("backoffice=info,tower_http=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load config")?;
    let db = database::init_db(&config.database)
        .await
        .context("Failed to initialize database")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db).await,
        Command::SyncPermissions => {
            let state = AppState::build(config, db).await?;
            let report = permissions::sync_permissions(&state.db, &state.registry).await?;
            info!(
                created = report.permissions_created,
                granted = report.admin_grants,
                "Permissions synced"
            );
            Ok(())
        }
        Command::SyncSettings { file } => {
            let path = file.unwrap_or_else(|| PathBuf::from(&config.admin.settings_file));
            let definitions = settings::load_definitions(&path)?;
            let state = AppState::build(config, db).await?;
            let inserted = state.settings.sync_definitions(&definitions).await?;
            info!(inserted, file = %path.display(), "Settings synced");
            Ok(())
        }
        Command::Translations { action } => {
            let locales = config.admin.locale_codes();
            match action {
                TranslationsAction::Export { dir } => {
                    let rows = translations::export(&db, &dir, &locales).await?;
                    info!(rows, dir = %dir.display(), "Translations exported");
                }
                TranslationsAction::Import { dir } => {
                    let report = translations::import(&db, &dir, &locales).await?;
                    info!(
                        created = report.created,
                        updated = report.updated,
                        unchanged = report.unchanged,
                        "Translations imported"
                    );
                }
            }
            Ok(())
        }
        Command::CreateAdmin {
            email,
            password,
            name,
        } => {
            seed::create_admin(&db, &name, &email, &password).await?;
            Ok(())
        }
    }
}

async fn serve(config: AppConfig, db: sea_orm::DatabaseConnection) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let settings_file = config.admin.settings_file.clone();

    let state = AppState::build(config, db).await?;
    let report = permissions::sync_permissions(&state.db, &state.registry).await?;
    if report.permissions_created > 0 {
        info!(created = report.permissions_created, "New permissions registered");
    }
    if Path::new(&settings_file).exists() {
        let definitions = settings::load_definitions(Path::new(&settings_file))?;
        state.settings.sync_definitions(&definitions).await?;
    }
    info!(resources = state.registry.len(), "CRUD registry ready");

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use linkforge::auth::SecretHasher;
use linkforge::config::ServerConfig;
use linkforge::links::ClickRecorder;
use linkforge::server::validation::{
    validate_account_password, validate_email, validate_username,
};
use linkforge::server::{AppState, create_router};
use linkforge::store::{SqliteStore, Store};
use linkforge::types::NewUser;

#[derive(Parser)]
#[command(name = "linkforge")]
#[command(about = "A self-hostable URL shortener", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// TOML config file. Flags below override its values.
        #[arg(long, short, env = "LINKFORGE_CONFIG")]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long, env = "LINKFORGE_HOST")]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short, env = "LINKFORGE_PORT")]
        port: Option<u16>,

        /// Data directory for the database
        #[arg(long, env = "LINKFORGE_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Public base URL for short links (e.g., "https://sho.rt").
        /// If not set, URLs are derived from request headers.
        #[arg(long, env = "LINKFORGE_PUBLIC_BASE_URL")]
        public_base_url: Option<String>,
    },

    /// Create the database
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data", env = "LINKFORGE_DATA_DIR")]
        data_dir: PathBuf,
    },

    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user account. Prompts for any value not given.
    Create {
        #[arg(long, default_value = "./data", env = "LINKFORGE_DATA_DIR")]
        data_dir: PathBuf,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Set a new password for an existing user
    ResetPassword {
        #[arg(long, default_value = "./data", env = "LINKFORGE_DATA_DIR")]
        data_dir: PathBuf,

        #[arg(long)]
        username: String,

        #[arg(long)]
        password: Option<String>,
    },
}

fn open_store(data_dir: &Path) -> anyhow::Result<SqliteStore> {
    let config = ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    };
    let db_path = config.db_path();
    if !db_path.exists() {
        bail!(
            "Database not found at {}. Run 'linkforge init' first.",
            db_path.display()
        );
    }
    Ok(SqliteStore::new(db_path)?)
}

fn run_init(data_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let config = ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    };
    let db_path = config.db_path();
    let existed = db_path.exists();

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    if existed {
        println!("Database already initialized at {}", db_path.display());
    } else {
        println!("Created database at {}", db_path.display());
    }

    Ok(())
}

fn prompt_text(label: &str, value: Option<String>) -> anyhow::Result<String> {
    match value {
        Some(v) => Ok(v),
        None => Ok(inquire::Text::new(label).prompt()?),
    }
}

fn prompt_password(value: Option<String>) -> anyhow::Result<String> {
    match value {
        Some(v) => Ok(v),
        None => Ok(inquire::Password::new("Password:").prompt()?),
    }
}

fn run_user_create(
    data_dir: &Path,
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let min_password_len = ServerConfig::default().links.min_account_password_len;

    let username = prompt_text("Username:", username)?.trim().to_string();
    validate_username(&username).map_err(|e| anyhow!(e.message))?;

    let email = prompt_text("Email:", email)?.trim().to_string();
    validate_email(&email).map_err(|e| anyhow!(e.message))?;

    let password = prompt_password(password)?;
    validate_account_password(&password, min_password_len).map_err(|e| anyhow!(e.message))?;

    let password_hash = SecretHasher::new().hash(&password)?;
    let user = store
        .create_user(&NewUser {
            username,
            email,
            password_hash,
        })
        .map_err(|e| match e {
            linkforge::error::Error::AlreadyExists => {
                anyhow!("Username or email already registered")
            }
            other => other.into(),
        })?;

    println!("Created user '{}' (id {})", user.username, user.id);
    Ok(())
}

fn run_reset_password(
    data_dir: &Path,
    username: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let min_password_len = ServerConfig::default().links.min_account_password_len;

    let user = store
        .get_user_by_username(username)?
        .ok_or_else(|| anyhow!("User '{username}' not found"))?;

    let password = prompt_password(password)?;
    validate_account_password(&password, min_password_len).map_err(|e| anyhow!(e.message))?;

    let password_hash = SecretHasher::new().hash(&password)?;
    store.update_user_password(user.id, &password_hash)?;

    println!("Updated password for '{}'", user.username);
    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let store = Arc::new(open_store(&config.data_dir)?);
    store.initialize()?;

    let clicks = ClickRecorder::new(store.clone());
    let addr = config.socket_addr()?;
    let state = Arc::new(AppState::new(store, clicks, config));

    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("linkforge=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            public_base_url,
        } => {
            let mut server_config = match config {
                Some(path) => ServerConfig::from_file(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            if let Some(data_dir) = data_dir {
                server_config.data_dir = data_dir;
            }
            if public_base_url.is_some() {
                server_config.public_base_url = public_base_url;
            }

            run_serve(server_config).await?;
        }
        Commands::Init { data_dir } => run_init(&data_dir)?,
        Commands::User { command } => match command {
            UserCommands::Create {
                data_dir,
                username,
                email,
                password,
            } => run_user_create(&data_dir, username, email, password)?,
            UserCommands::ResetPassword {
                data_dir,
                username,
                password,
            } => run_reset_password(&data_dir, &username, password)?,
        },
    }

    Ok(())
}

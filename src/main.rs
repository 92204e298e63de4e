use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use tribehub::account::store::AccountStore;
use tribehub::config::HubConfig;
use tribehub::dialogue::DialogueController;
use tribehub::error::HubError;
use tribehub::import;
use tribehub::messages::MessageCatalog;
use tribehub::storage::Storage;
use tribehub::transport::{ConsoleTransport, InboundEvent};

#[derive(Parser)]
#[command(name = "tribehub")]
#[command(about = "Registration and account-provisioning service", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "tribehub.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and seed reference data
    Init,
    /// Run the bulk user-file import
    Import {
        /// Override the configured import file
        #[arg(long)]
        file: Option<String>,
    },
    /// Interactive console registration session
    Chat {
        /// External identity to speak as
        #[arg(long, default_value_t = 1000)]
        id: i64,
        /// Platform handle to present on contact
        #[arg(long)]
        handle: Option<String>,
    },
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = HubConfig::load_or_default(&cli.config);
    init_logging(&config.hub.log_level);

    if let Err(e) = run(cli.command, config).await {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Option<Commands>, config: HubConfig) -> Result<(), HubError> {
    config.validate()?;

    let storage = Arc::new(Storage::open(&config.hub.db_path)?);
    let accounts = Arc::new(AccountStore::new(
        storage.clone(),
        config.assignment_policy()?,
        config.locales.default.clone(),
        config.locales.supported.clone(),
    ));
    accounts.seed(&config.seed_tribes())?;
    info!("Database initialized successfully");

    let superusers: HashSet<i64> = config.secrets.superuser_ids.iter().copied().collect();

    match command {
        Some(Commands::Init) => {}
        Some(Commands::Import { file }) => {
            let path = file.unwrap_or_else(|| config.import.path.clone());
            let summary = import::load_accounts_from_file(&path, &accounts, &superusers).await?;
            info!(
                "Import finished: {} created, {} skipped",
                summary.created, summary.skipped
            );
        }
        Some(Commands::Chat { id, handle }) => {
            chat_loop(&config, accounts.clone(), id, handle).await?;
        }
        None => {
            // full bootstrap: optional import, then serve the console
            if config.import.enabled {
                import::load_accounts_from_file(&config.import.path, &accounts, &superusers)
                    .await?;
            }
            chat_loop(&config, accounts.clone(), 1000, None).await?;
        }
    }

    storage.flush()?;
    Ok(())
}

/// Local stand-in for the chat platform: one identity, stdin in, stdout
/// out. Recoverable validation errors stay inside the dialogue; anything
/// else is logged and the loop keeps serving.
async fn chat_loop(
    config: &HubConfig,
    accounts: Arc<AccountStore>,
    id: i64,
    handle: Option<String>,
) -> Result<(), HubError> {
    let catalog = Arc::new(MessageCatalog::load(Path::new(&config.hub.messages_path))?);
    let mut controller = DialogueController::new(
        accounts,
        catalog,
        Arc::new(ConsoleTransport),
        config.secrets.user_key.clone(),
        config.secrets.admin_key.clone(),
        config.locales.default.clone(),
    );

    println!("Speaking as external id {} (ctrl-d to quit)", id);
    let contact = InboundEvent {
        external_id: id,
        handle: handle.clone(),
        locale_hint: None,
        text: "/start".to_string(),
    };
    dispatch(&mut controller, contact).await?;

    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        std::io::stdout()
            .flush()
            .map_err(|e| HubError::Transport(e.to_string()))?;
        line.clear();
        let read = stdin
            .read_line(&mut line)
            .map_err(|e| HubError::Transport(e.to_string()))?;
        if read == 0 {
            break;
        }
        let event = InboundEvent {
            external_id: id,
            handle: handle.clone(),
            locale_hint: None,
            text: line.trim_end_matches(['\n', '\r']).to_string(),
        };
        dispatch(&mut controller, event).await?;
    }
    Ok(())
}

async fn dispatch(
    controller: &mut DialogueController,
    event: InboundEvent,
) -> Result<(), HubError> {
    match controller.handle_event(event).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_recoverable() => Ok(()),
        Err(e @ HubError::StorageUnavailable(_)) => Err(e),
        Err(e) => {
            // provisioning failures leave the identity unregistered; the
            // conversation itself keeps going
            error!("{}", e);
            Ok(())
        }
    }
}

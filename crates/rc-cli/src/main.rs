use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use rc_crypto::{kdf, KeyMaterial};
use rc_proto::StoredMessage;
use rc_session::{
    paths, ConversationKind, EncryptionSession, KeyDistributor, SessionState, Settings,
};
use rc_store::{FileKeyStore, KeyStore, SqliteKeyExchange};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::info;

/// Log filter when `RUST_LOG` is unset. Events from this binary use the
/// target `roomcipher`, the bin name.
const DEFAULT_LOG_FILTER: &str = "roomcipher=info,rc_session=info,rc_store=info";

#[derive(Parser)]
#[command(name = "roomcipher")]
#[command(about = "Encrypt, decrypt and share conversation keys", long_about = None)]
struct Cli {
    /// Data directory (defaults to $ROOMCIPHER_DATA_DIR or the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Participant id used as sender and key publisher
    #[arg(long, global = true, default_value = "local")]
    participant: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Conversation {
    /// Conversation id
    conversation: String,

    /// One-to-one conversation keyed through the exchange record
    #[arg(long)]
    direct: bool,

    /// Create and publish the key if none exists (direct conversations only)
    #[arg(long, requires = "direct")]
    initiator: bool,
}

impl Conversation {
    fn kind(&self) -> ConversationKind {
        if self.direct {
            ConversationKind::Direct {
                initiator: self.initiator,
            }
        } else {
            ConversationKind::Shared
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print metadata of the id-derived key for a conversation
    Derive {
        conversation: String,
    },

    /// Encrypt a message and print it as stored-message JSON
    Encrypt {
        #[command(flatten)]
        target: Conversation,

        /// Message text
        text: String,
    },

    /// Decrypt a stored-message JSON document (file or stdin)
    Decrypt {
        /// Read from this file instead of stdin
        input: Option<PathBuf>,

        /// Treat the conversation as direct
        #[arg(long)]
        direct: bool,
    },

    /// Replace the conversation key with a new random version
    Rotate {
        #[command(flatten)]
        target: Conversation,
    },

    /// Adopt the published key if it is newer than the cached one
    Resync {
        #[command(flatten)]
        target: Conversation,
    },

    /// Print a share link and QR code for the current key
    Share {
        #[command(flatten)]
        target: Conversation,

        /// Also write the QR code as SVG to this path
        #[arg(long)]
        svg: Option<PathBuf>,
    },

    /// Import a key from a share link
    Import {
        uri: String,
    },

    /// Show the cached key for a conversation
    Show {
        conversation: String,
    },

    /// Delete the cached key for a conversation
    Forget {
        conversation: String,
    },
}

struct App {
    store: Arc<FileKeyStore>,
    distributor: Arc<KeyDistributor>,
    settings: Settings,
    participant: String,
}

impl App {
    async fn open(data_dir: Option<PathBuf>, participant: String) -> Result<Self> {
        let base = match data_dir {
            Some(dir) => dir,
            None => paths::data_dir()?,
        };
        tokio::fs::create_dir_all(&base)
            .await
            .with_context(|| format!("create data dir {}", base.display()))?;

        let settings = Settings::load(&paths::settings_path(&base))?;
        let store = Arc::new(FileKeyStore::open(paths::key_dir(&base)).await?);
        let exchange = Arc::new(SqliteKeyExchange::open(&paths::exchange_db_path(&base)).await?);
        let distributor = Arc::new(KeyDistributor::new(exchange, store.clone()));
        info!(data_dir = %base.display(), "opened roomcipher data dir");

        Ok(Self {
            store,
            distributor,
            settings,
            participant,
        })
    }

    async fn session(&self, conversation_id: &str, kind: ConversationKind) -> Result<EncryptionSession> {
        let session = EncryptionSession::new(
            conversation_id,
            self.participant.clone(),
            kind,
            self.store.clone(),
            self.distributor.clone(),
            self.settings.session.clone(),
        );
        let state = session.init().await?;
        if state != SessionState::Ready {
            info!(conversation_id, "no key yet for conversation");
        }
        Ok(session)
    }
}

fn key_summary(key: &KeyMaterial) -> serde_json::Value {
    json!({
        "conversationId": key.conversation_id(),
        "version": key.version(),
        "createdAt": key.created_at(),
        "expiresAt": key.expires_at(),
        "expired": key.is_expired(),
    })
}

async fn read_input(input: Option<PathBuf>) -> Result<String> {
    match input {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read {}", path.display())),
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Derive { conversation } = &cli.command {
        let key = kdf::derive_deterministic(conversation);
        println!("{}", serde_json::to_string_pretty(&key_summary(&key))?);
        return Ok(());
    }

    let app = App::open(cli.data_dir, cli.participant).await?;

    match cli.command {
        Commands::Derive { .. } => {}

        Commands::Encrypt { target, text } => {
            let session = app.session(&target.conversation, target.kind()).await?;
            let envelope = session.encrypt_outbound(&text).await?;
            let message = StoredMessage {
                id: uuid::Uuid::new_v4().to_string(),
                conversation_id: target.conversation,
                sender_id: app.participant.clone(),
                sent_at: Utc::now(),
                envelope,
            };
            println!("{}", serde_json::to_string_pretty(&message)?);
        }

        Commands::Decrypt { input, direct } => {
            let raw = read_input(input).await?;
            let message: StoredMessage =
                serde_json::from_str(&raw).context("parse stored message")?;
            let kind = if direct {
                ConversationKind::Direct { initiator: false }
            } else {
                ConversationKind::Shared
            };
            let session = app.session(&message.conversation_id, kind).await?;
            println!("{}", session.decrypt_inbound(&message.id, &message.envelope).await);
        }

        Commands::Rotate { target } => {
            let session = app.session(&target.conversation, target.kind()).await?;
            let key = session.rotate().await?;
            println!("{}", serde_json::to_string_pretty(&key_summary(&key))?);
        }

        Commands::Resync { target } => {
            let session = app.session(&target.conversation, target.kind()).await?;
            match session.resync().await? {
                Some(key) => println!("{}", serde_json::to_string_pretty(&key_summary(&key))?),
                None => info!(conversation_id = %target.conversation, "cached key is current"),
            }
        }

        Commands::Share { target, svg } => {
            let session = app.session(&target.conversation, target.kind()).await?;
            let payload = session.share().await?;
            let code = KeyDistributor::render_code(&payload)?;
            if let Some(path) = svg {
                tokio::fs::write(&path, code.svg.as_bytes())
                    .await
                    .with_context(|| format!("write {}", path.display()))?;
                info!(path = %path.display(), "wrote QR code");
            }
            println!("{}", code.terminal);
            println!("{}", code.uri);
        }

        Commands::Import { uri } => {
            let payload = KeyDistributor::parse_payload(uri.trim())?;
            let session = EncryptionSession::new(
                payload.conversation_id.clone(),
                app.participant.clone(),
                ConversationKind::Shared,
                app.store.clone(),
                app.distributor.clone(),
                app.settings.session.clone(),
            );
            let key = session.import(uri.trim()).await?;
            println!("{}", serde_json::to_string_pretty(&key_summary(&key))?);
        }

        Commands::Show { conversation } => {
            let key = app
                .store
                .load(&conversation)
                .await?
                .ok_or_else(|| anyhow!("no cached key for {conversation}"))?;
            println!("{}", serde_json::to_string_pretty(&key_summary(&key))?);
        }

        Commands::Forget { conversation } => {
            app.store.clear(&conversation).await?;
            info!(conversation_id = %conversation, "cached key removed");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn default_filter_enables_this_binary() {
        let own = format!("{}=info", module_path!());
        assert!(DEFAULT_LOG_FILTER.split(',').any(|d| d == own), "{own}");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}

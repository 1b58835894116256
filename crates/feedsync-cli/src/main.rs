use clap::{ArgAction, Parser, Subcommand};
use feedsync_cli::{
    prompt_block, prompt_line, render_snapshot, settle, wait_for_status, CliError,
};
use feedsync_core::config::FeedConfig;
use feedsync_core::credential::{SessionCredential, Token};
use feedsync_core::graphql::GraphqlClient;
use feedsync_core::live::LiveChannel;
use feedsync_core::post::{ImageUpload, PostId};
use feedsync_core::reconciler::LoadState;
use feedsync_core::session::{FeedHandle, FeedSession};
use feedsync_core::FeedResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(author, version, about, long_about=None)]
struct Cli {
    #[arg(short, long, value_name = "FILE")]
    /// Path to config file; defaults to ~/.feedsync/feedsync.toml
    config: Option<PathBuf>,

    #[arg(long)]
    /// Backend root, for ex. http://localhost:8080/
    api_url: Option<Url>,

    #[arg(long)]
    /// Websocket endpoint of the live channel
    live_url: Option<Url>,

    #[arg(short, long)]
    /// Bearer token; overrides the one in the config file
    token: Option<String>,

    #[arg(short, long, action = ArgAction::SetTrue)]
    /// Select if the output should be json
    json: bool,

    #[command(subcommand)]
    command: FeedCommand,
}

#[derive(Subcommand, Clone, Debug)]
enum FeedCommand {
    /// Follows the feed, printing it every time it changes, until Ctrl-c
    Watch {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },

    /// Prints one page of the feed
    Page { page: Option<u32> },

    GetPost { id: String },

    /// Creates a new post; missing fields are read from stdin
    NewPost {
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        content: Option<String>,
        #[arg(short, long, value_name = "FILE")]
        image: Option<PathBuf>,
    },

    /// Edits a post of the given page
    EditPost {
        id: String,
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        content: Option<String>,
        #[arg(short, long, value_name = "FILE")]
        image: Option<PathBuf>,
    },

    DeletePost { id: String },

    /// Prints the user status, or replaces it with `set`
    Status { set: Option<String> },

    /// Writes the effective configuration to the config file
    InitConfig {},
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> FeedResult<FeedConfig> {
    let mut config = FeedConfig::load(cli.config.as_deref())?;
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.clone();
    }
    if let Some(live_url) = &cli.live_url {
        config.live_url = live_url.clone();
    }
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }
    config.validate()?;
    Ok(config)
}

fn start_session(config: &FeedConfig) -> FeedResult<FeedHandle> {
    let token = config.token.clone().ok_or(CliError::MissingToken)?;
    let credential = SessionCredential::new(Token::new(token), config.token_ttl());
    credential.start_expiry_timer();
    let api = Arc::new(GraphqlClient::new(&config.api_url, config.request_timeout())?);
    Ok(FeedSession::spawn(api, credential, config.page_size))
}

fn load_image(path: Option<&Path>) -> FeedResult<Option<ImageUpload>> {
    match path {
        Some(path) => Ok(Some(ImageUpload::from_path(path)?)),
        None => Ok(None),
    }
}

async fn watch(handle: FeedHandle, config: &FeedConfig, page: u32, json: bool) -> FeedResult<()> {
    // The feed still works without push updates; it just goes stale.
    let live = match LiveChannel::connect(&config.live_url, handle.live_sink()).await {
        Ok(live) => Some(live),
        Err(err) => {
            tracing::warn!(error = %err, "live channel unavailable");
            None
        }
    };
    if page > 1 {
        handle.jump_to(page).await?;
    }

    let mut rx = handle.subscribe();
    loop {
        let snapshot = rx.borrow_and_update().clone();
        if snapshot.load != LoadState::Loading {
            println!("{}", render_snapshot(&snapshot, json)?);
        }
        if snapshot.expired {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(live) = live {
        live.abort();
    }
    Ok(())
}

async fn run(cli: Cli) -> FeedResult<()> {
    let config = load_config(&cli)?;
    let json = cli.json;

    if let FeedCommand::InitConfig {} = &cli.command {
        let path = cli.config.clone().unwrap_or_else(FeedConfig::default_path);
        config.save(&path)?;
        println!("Config written to {}", path.display());
        return Ok(());
    }

    let handle = start_session(&config)?;
    let timeout = config.request_timeout();

    match cli.command {
        FeedCommand::Watch { page } => watch(handle, &config, page, json).await?,

        FeedCommand::Page { page } => {
            let snapshot = match page {
                Some(page) => handle.jump_to(page).await?,
                None => {
                    let mut rx = handle.subscribe();
                    settle(&mut rx, timeout, |s| s.load != LoadState::Loading).await?
                }
            };
            println!("{}", render_snapshot(&snapshot, json)?);
        }

        FeedCommand::GetPost { id } => {
            let post = handle.fetch_post(PostId::new(id)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&post)?);
            } else {
                println!("{post}");
            }
        }

        FeedCommand::NewPost {
            title,
            content,
            image,
        } => {
            let title = match title {
                Some(title) => title,
                None => prompt_line(&mut std::io::stdin().lock(), "Post title")?,
            };
            let content = match content {
                Some(content) => content,
                None => prompt_block(&mut std::io::stdin().lock(), "Post content")?,
            };
            let image = load_image(image.as_deref())?;

            handle.start_new_post().await?;
            handle
                .edit_draft(move |draft| {
                    draft.title = title;
                    draft.content = content;
                    draft.image = image;
                })
                .await?;
            let post = handle.submit().await?;
            println!("Created post {}", post.id);
        }

        FeedCommand::EditPost {
            id,
            page,
            title,
            content,
            image,
        } => {
            let image = load_image(image.as_deref())?;
            handle.jump_to(page).await?;
            handle.start_edit(PostId::new(id)).await?;
            handle
                .edit_draft(move |draft| {
                    if let Some(title) = title {
                        draft.title = title;
                    }
                    if let Some(content) = content {
                        draft.content = content;
                    }
                    draft.image = image;
                })
                .await?;
            let post = handle.submit().await?;
            println!("Updated post {}", post.id);
        }

        FeedCommand::DeletePost { id } => {
            let id = handle.delete_post(PostId::new(id)).await?;
            println!("Deleted post {id}");
        }

        FeedCommand::Status { set } => {
            let status = match set {
                Some(status) => handle.set_status(status).await?,
                None => wait_for_status(&mut handle.subscribe(), timeout).await?,
            };
            println!("{status}");
        }

        FeedCommand::InitConfig {} => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;

use matchchat::api::client::ApiClient;
use matchchat::app::AppState;
use matchchat::chat::{ChatSession, Notice, NoticeKind};
use matchchat::error::ChatError;
use matchchat::server::config::ServerConfig;
use matchchat::session::Session;
use matchchat::storage::ChatCache;
use matchchat::store::LocalMessage;
use matchchat::transport::WsTransport;
use matchchat::utils::{normalize_url, ws_url};

type AnyResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "matchchat", version, about = "Chat delivery client and relay server")]
struct Cli {
    /// Client profile (TOML). Defaults to the platform config dir.
    #[arg(long, env = "MATCHCHAT_PROFILE", global = true)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the client profile
    Login {
        #[arg(long)]
        base_url: String,
        #[arg(long)]
        user_id: String,
        #[arg(long, env = "MATCHCHAT_TOKEN")]
        token: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Run the relay server
    Serve {
        #[arg(long, env = "MATCHCHAT_SERVER_CONFIG")]
        config: PathBuf,
    },
    /// List conversations
    Chats,
    /// Show the history with one user and acknowledge what is unread
    History { peer: String },
    /// Send a message
    Send {
        peer: String,
        #[arg(required = true, num_args = 1..)]
        content: Vec<String>,
    },
    /// Stay connected and print events as they arrive
    Listen {
        /// Conversation to keep open (incoming messages are marked read)
        #[arg(long)]
        open: Option<String>,
    },
}

fn run_login(path: Option<&PathBuf>, state: AppState) -> AnyResult<()> {
    // rejects a base url the channel could not be derived from
    ws_url(&state.base_url)?;
    match path {
        Some(p) => state.save_to(p)?,
        None => state.save()?,
    }
    println!("profile saved for {}", state.user_id);
    Ok(())
}

fn load_profile(path: Option<&PathBuf>) -> AnyResult<AppState> {
    let state = match path {
        Some(p) => AppState::load_from(p)?,
        None => AppState::load(),
    };
    if !state.is_configured() {
        return Err(ChatError::Config("profile needs base_url, user_id and token".into()).into());
    }
    Ok(state)
}

fn build_session(state: &AppState) -> AnyResult<(ChatSession, UnboundedReceiver<Notice>)> {
    let session = Session::from_state(state).ok_or(ChatError::Unauthenticated)?;
    let api = ApiClient::for_session(&state.base_url, &session);
    let transport = WsTransport::new(ws_url(&state.base_url)?, session.token.clone());
    let (chat, notices) = ChatSession::new(session, Box::new(api), Box::new(transport));
    let mut chat = chat.with_send_timeout(state.send_timeout());
    if state.cache {
        match ChatCache::open_default() {
            Ok(cache) => chat = chat.with_cache(cache),
            Err(e) => log::warn!("chat cache unavailable: {}", e),
        }
    }
    Ok((chat, notices))
}

fn print_notices(rx: &mut UnboundedReceiver<Notice>) {
    while let Ok(n) = rx.try_recv() {
        print_notice(&n);
    }
}

fn print_notice(n: &Notice) {
    match n.kind {
        NoticeKind::Info => println!("* {}", n.text),
        _ => eprintln!("! {}", n.text),
    }
}

fn print_message(m: &LocalMessage) {
    println!(
        "[{}] {} -> {}: {} ({})",
        m.timestamp.format("%Y-%m-%d %H:%M"),
        m.sender_id,
        m.receiver_id,
        m.content,
        m.status.as_str()
    );
}

async fn run_chats(state: &AppState) -> AnyResult<()> {
    let (mut chat, mut notices) = build_session(state)?;
    if chat.fetch_chat_list().await.is_err() {
        let n = chat.load_cached_chats()?;
        if n > 0 {
            eprintln!("showing {} cached conversation(s)", n);
        }
    }
    print_notices(&mut notices);
    for c in chat.chats() {
        println!("{}  {}  [{}] {}", c.user.id, c.user.display_name(), c.timestamp.format("%Y-%m-%d %H:%M"), c.last_message);
    }
    Ok(())
}

async fn run_history(state: &AppState, peer: &str) -> AnyResult<()> {
    let (mut chat, mut notices) = build_session(state)?;
    // receipts go out over the channel, so connect first when we can
    let _ = chat.connect().await;
    let res = chat.open_conversation(peer).await;
    print_notices(&mut notices);
    res?;
    for m in chat.messages(peer) {
        print_message(m);
    }
    chat.disconnect().await;
    Ok(())
}

async fn run_send(state: &AppState, peer: &str, content: &str) -> AnyResult<()> {
    let (mut chat, mut notices) = build_session(state)?;
    let _ = chat.connect().await;
    let res = chat.send(peer, content).await;
    print_notices(&mut notices);
    let msg = res?;
    println!("{} {}", msg.id, msg.timestamp.to_rfc3339());
    chat.disconnect().await;
    Ok(())
}

async fn run_listen(state: &AppState, open: Option<&str>) -> AnyResult<()> {
    let (mut chat, mut notices) = build_session(state)?;
    chat.connect().await?;
    let _ = chat.fetch_chat_list().await;
    if let Some(peer) = open {
        chat.open_conversation(peer).await?;
        for m in chat.messages(peer) {
            print_message(m);
        }
    }
    print_notices(&mut notices);

    loop {
        tokio::select! {
            inbound = chat.next_inbound() => {
                let Some(inbound) = inbound else { break };
                let shown = match &inbound {
                    matchchat::Inbound::Event(matchchat::ChannelEvent::NewMessage(m)) => Some(m.id.clone()),
                    matchchat::Inbound::Event(matchchat::ChannelEvent::MessageRead(r)) => Some(r.message_id.clone()),
                    _ => None,
                };
                let disconnected = matches!(inbound, matchchat::Inbound::Disconnected(_));
                chat.handle_inbound(inbound).await;
                if let Some(m) = shown.as_deref().and_then(|id| chat.store().find(id)) {
                    print_message(m);
                }
                print_notices(&mut notices);
                if disconnected {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    chat.logout().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let res: AnyResult<()> = match &cli.command {
        Command::Serve { config } => match ServerConfig::load(config) {
            Ok(config) => matchchat::server::serve(&config).await.map_err(Into::into),
            Err(e) => Err(e.into()),
        },
        Command::Login { base_url, user_id, token, first_name, last_name } => {
            let existing = match cli.profile.as_ref() {
                Some(p) => AppState::load_from(p).unwrap_or_default(),
                None => AppState::load(),
            };
            let state = AppState {
                base_url: normalize_url(base_url),
                token: Some(token.clone()),
                user_id: user_id.clone(),
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                ..existing
            };
            run_login(cli.profile.as_ref(), state)
        }
        command => match load_profile(cli.profile.as_ref()) {
            Ok(state) => match command {
                Command::Chats => run_chats(&state).await,
                Command::History { peer } => run_history(&state, peer).await,
                Command::Send { peer, content } => run_send(&state, peer, &content.join(" ")).await,
                Command::Listen { open } => run_listen(&state, open.as_deref()).await,
                Command::Serve { .. } | Command::Login { .. } => Ok(()),
            },
            Err(e) => Err(e),
        },
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

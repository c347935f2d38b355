use clap::{Parser, Subcommand};
use color_eyre::{eyre::OptionExt, Result};
use quizhub::{
    codes,
    config::{DbConfig, ImportConfig},
    db::Db,
    pubsub::Broadcaster,
    services::import::ImportService,
    trivia::OpenTdbClient,
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(flatten)]
    db: DbConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Top up the question bank from the trivia feed.
    Import {
        #[command(flatten)]
        import: ImportConfig,
    },
    /// Print the events of a game, past and live, until interrupted.
    Listen {
        /// Public game code.
        code: String,
    },
    /// Publish an event to every process following a game.
    Broadcast {
        /// Public game code.
        code: String,
        /// Event type.
        kind: String,
        /// Event payload as JSON.
        #[arg(default_value = "{}")]
        data: String,
    },
    /// Show the public code for an id.
    Encode { id: u64 },
    /// Show the id behind a public code.
    Decode { code: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "sqlx=warn,quizhub=debug".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Encode { id } => println!("{}", codes::encode(id)),
        Command::Decode { code } => match codes::decode(&codes::clean(&code, codes::DEFAULT_CLEAN_LEN)) {
            Some(id) => println!("{id}"),
            None => color_eyre::eyre::bail!("'{code}' is not a valid code"),
        },
        Command::Import { import } => {
            let db = connect(&args.db).await?;
            let service = ImportService::new(
                db,
                OpenTdbClient::new(import.trivia_url.clone()),
                import.settings(),
            );
            let imported = service.import_questions().await?;
            println!("imported {imported} questions");
        }
        Command::Listen { code } => {
            let db = connect(&args.db).await?;
            listen(&db, game_id(&code)?).await?;
        }
        Command::Broadcast { code, kind, data } => {
            let db = connect(&args.db).await?;
            let data: serde_json::Value = serde_json::from_str(&data)?;
            let event_id = db
                .broadcast(game_id(&code)?, &kind, data)
                .await
                .applied()
                .ok_or_eyre("event could not be recorded")?;
            println!("event {event_id} published");
        }
    }

    Ok(())
}

async fn connect(config: &DbConfig) -> Result<Db> {
    Db::new(config.connect_options(), config.pool_size).await
}

fn game_id(code: &str) -> Result<i32> {
    let id = codes::decode(&codes::clean(code, codes::DEFAULT_CLEAN_LEN))
        .ok_or_eyre("invalid game code")?;
    Ok(i32::try_from(id)?)
}

async fn listen(db: &Db, game_id: i32) -> Result<()> {
    db.fetch_game(game_id).await?.ok_or_eyre("game not found")?;

    let broadcaster = Broadcaster::new(db.pool());
    let (_subscription, mut events) = broadcaster.hub().subscribe(game_id);
    broadcaster.listen().await?;

    for event in db.fetch_events(game_id).await? {
        tracing::info!(id = event.id, kind = %event.kind, data = %event.data, "past event");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => tracing::info!(kind = %event.kind, data = %event.data, "event"),
                None => break,
            },
        }
    }

    Ok(())
}

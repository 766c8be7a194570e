use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxpage::dispatch::Dispatcher;
use voxpage::images::{DisabledImageGenerator, HttpImageGenerator, ImageGenerator};
use voxpage::registry::{render::render_page, shared_registry};
use voxpage::tools::{tool_definitions, ToolContext};
use voxpage::{AssistantBuilder, AssistantCommand, AssistantConfig, AssistantEvent, ToolSet};

#[derive(Parser)]
#[command(name = "voxpage", version, about = "Voice-driven page builder")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL serving the session and image routes
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Realtime model name
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tool catalog sent in the session configuration
    Catalog,

    /// Run function-call frames (one JSON object per line) through the
    /// dispatch loop and print the frames it answers with
    Replay {
        /// Frames file; stdin when omitted
        input: Option<PathBuf>,

        /// Print the resulting page HTML afterwards
        #[arg(long)]
        page: bool,

        /// Call the configured image endpoint instead of failing image requests
        #[arg(long)]
        images: bool,
    },

    /// Connect to the realtime service and serve tool calls.
    /// Type `retry`, `disconnect`, `connect`, `page` or `quit` on stdin.
    Connect {
        /// Text-only session
        #[arg(long)]
        no_audio: bool,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxpage=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AssistantConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?
            .apply_env(),
        None => AssistantConfig::discover()?,
    };
    if let Some(url) = cli.base_url {
        config = config.with_base_url(url);
    }
    if let Some(model) = cli.model {
        config = config.with_model(model);
    }

    match cli.command {
        Commands::Catalog => {
            println!("{}", serde_json::to_string_pretty(&tool_definitions())?);
        }
        Commands::Replay {
            input,
            page,
            images,
        } => replay(&config, input, page, images)?,
        Commands::Connect { no_audio } => {
            if no_audio {
                config = config.without_audio();
            }
            connect(config)?;
        }
    }

    Ok(())
}

fn replay(config: &AssistantConfig, input: Option<PathBuf>, page: bool, images: bool) -> Result<()> {
    let reader: Box<dyn Read> = match &input {
        Some(path) => Box::new(
            std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(std::io::stdin()),
    };
    let frames: Vec<String> = BufReader::new(reader)
        .lines()
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect();
    info!("Replaying {} frames", frames.len());

    let generator: Arc<dyn ImageGenerator> = if images {
        Arc::new(HttpImageGenerator::new(&config.endpoints))
    } else {
        Arc::new(DisabledImageGenerator)
    };
    let registry = shared_registry();
    let ctx = ToolContext::new(Arc::clone(&registry), generator)
        .with_image_timeout(config.endpoints.image_timeout());
    let dispatcher = Dispatcher::new(Arc::new(ToolSet::standard()?), ctx);

    let runtime = tokio::runtime::Runtime::new()?;
    let answered = runtime.block_on(async move {
        let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(frames.len().max(1));
        let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel();
        let loop_task = tokio::spawn(dispatcher.run(inbound_rx, outbound_tx));
        for frame in frames {
            inbound_tx.send(frame).await?;
        }
        drop(inbound_tx);

        let mut answered = Vec::new();
        while let Some(frame) = outbound_rx.recv().await {
            answered.push(frame.to_json()?);
        }
        loop_task.await?;
        anyhow::Ok(answered)
    })?;

    for frame in answered {
        println!("{}", frame);
    }
    if page {
        println!("{}", render_page(&registry.lock()));
    }
    Ok(())
}

fn connect(config: AssistantConfig) -> Result<()> {
    let (assistant, handle) = AssistantBuilder::new().with_config(config).build()?;
    let worker = assistant.start()?;
    handle.send_command(AssistantCommand::Connect)?;

    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(std::io::Result::ok) {
            if line_tx.send(line.trim().to_string()).is_err() {
                break;
            }
        }
    });

    loop {
        if let Some(event) = handle.recv_event_timeout(Duration::from_millis(100)) {
            match event {
                AssistantEvent::Shutdown => break,
                AssistantEvent::ConnectionError { message, .. } => {
                    eprintln!("connection error: {}", message)
                }
                AssistantEvent::Status(status) => eprintln!("status: {}", status),
                other => eprintln!("{:?}", other),
            }
        }

        if let Ok(line) = line_rx.try_recv() {
            let command = match line.as_str() {
                "connect" => Some(AssistantCommand::Connect),
                "retry" => Some(AssistantCommand::Retry),
                "disconnect" => Some(AssistantCommand::Disconnect),
                "quit" | "exit" => Some(AssistantCommand::Shutdown),
                "page" => {
                    println!("{}", handle.page_html());
                    None
                }
                "" => None,
                other => {
                    warn!("Unknown command: {}", other);
                    None
                }
            };
            if let Some(command) = command {
                handle.send_command(command)?;
            }
        }
    }

    if worker.join().is_err() {
        warn!("Assistant worker panicked");
    }
    Ok(())
}

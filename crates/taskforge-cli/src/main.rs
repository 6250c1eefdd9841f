mod config;
mod parse_cmds;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "taskforge",
    about = "Compile requirements documents into task dependency graphs"
)]
struct Cli {
    /// Model identifier (overrides TASKFORGE_MODEL env var and config file)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a taskforge config file
    Init {
        /// Provider API key (defaults to TASKFORGE_API_KEY or ANTHROPIC_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Check whether a document looks parseable (no network)
    Validate {
        /// Path to the requirements document, or `-` for stdin
        file: String,
    },
    /// Print the extraction prompt for a document (no network)
    Prompt {
        #[command(flatten)]
        document: DocumentArgs,
    },
    /// Extract project info and a task graph from a document
    Parse {
        #[command(flatten)]
        document: DocumentArgs,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
        /// Commit the result into an in-memory store and report created rows
        #[arg(long)]
        commit: bool,
    },
}

/// Document input shared by `prompt` and `parse`.
#[derive(Args)]
pub struct DocumentArgs {
    /// Path to the requirements document, or `-` for stdin
    pub file: String,
    /// Background about the project, shown to the model ahead of the document
    #[arg(long)]
    pub context: Option<String>,
    /// Leave the project context out of the prompt
    #[arg(long)]
    pub no_context: bool,
    /// Do not ask for acceptance criteria
    #[arg(long)]
    pub no_criteria: bool,
    /// Do not ask for tags
    #[arg(long)]
    pub no_tags: bool,
    /// Do not ask for hour estimates
    #[arg(long)]
    pub no_hours: bool,
}

fn cmd_init(api_key: Option<String>, model: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let Some(api_key) = api_key.or_else(config::api_key_from_env) else {
        anyhow::bail!("no API key given; pass --api-key or set TASKFORGE_API_KEY");
    };

    let cfg = config::ConfigFile {
        provider: config::ProviderSection {
            api_key: api_key.clone(),
            model: model.clone(),
            base_url: None,
            timeout_secs: None,
        },
        retry: config::RetrySection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  provider.api_key = {}", config::mask_secret(&api_key));
    if let Some(m) = &model {
        println!("  provider.model = {m}");
    }
    println!();
    println!("Next: run `taskforge validate <file>` then `taskforge parse <file>`.");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { api_key, force } => {
            cmd_init(api_key, cli.model, force)?;
        }
        Commands::Validate { file } => {
            parse_cmds::cmd_validate(&file)?;
        }
        Commands::Prompt { document } => {
            parse_cmds::cmd_prompt(&document)?;
        }
        Commands::Parse {
            document,
            json,
            commit,
        } => {
            parse_cmds::cmd_parse(&document, cli.model.as_deref(), json, commit).await?;
        }
    }

    Ok(())
}

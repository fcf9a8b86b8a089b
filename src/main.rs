use anyhow::Result;
use clap::{Parser, Subcommand};
use editloop::data::Grammar;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "editloop")]
#[command(about = "Let a local language model read and edit files in the working tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Compute patches without writing files")]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run an edit session against the model")]
    Edit {
        #[arg(help = "What the model should do")]
        prompt: String,

        #[arg(help = "Files to include in the opening prompt")]
        files: Vec<String>,

        #[arg(long, help = "Model name (defaults to EDITLOOP_MODEL)")]
        model: Option<String>,

        #[arg(long, help = "Reply format: tagged or json")]
        grammar: Option<Grammar>,
    },

    #[command(about = "Parse a saved model reply and print its actions")]
    Parse {
        #[arg(help = "File holding the reply text")]
        reply: PathBuf,

        #[arg(long, help = "Reply format: tagged or json")]
        grammar: Option<Grammar>,
    },

    #[command(about = "Apply the edits in a saved model reply to the working tree")]
    Apply {
        #[arg(help = "File holding the reply text")]
        reply: PathBuf,

        #[arg(long, help = "Reply format: tagged or json")]
        grammar: Option<Grammar>,

        #[arg(long, help = "Fail a file instead of skipping edits outside its lines")]
        strict: bool,
    },
}

fn init_logging(verbose: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if verbose { "debug,hyper=warn,reqwest=warn" } else { "info" })
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli::Config {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Edit {
            prompt,
            files,
            model,
            grammar,
        } => {
            cli::edit(prompt, files, model, grammar, &config).await?;
        }
        Commands::Parse { reply, grammar } => {
            cli::parse_reply(&reply, grammar, &config)?;
        }
        Commands::Apply {
            reply,
            grammar,
            strict,
        } => {
            cli::apply_reply(&reply, grammar, strict, &config)?;
        }
    }

    Ok(())
}

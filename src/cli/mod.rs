use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;

mod progress;

use editloop::contexts::{
    group, strip_reasoning, ActionParser, DirectoryTree, EditSession, FileOutcome, GroupError,
    PatchEngine, SessionOptions, Task, Workspace,
};
use editloop::data::{Grammar, Protocol};
use editloop::llm::OllamaClient;
use editloop::settings::Settings;
use progress::PatchSummary;

#[derive(Clone, Copy)]
pub struct Config {
    pub verbose: bool,
    pub dry_run: bool,
}

fn load_workspace() -> Result<(Workspace, Settings)> {
    let workspace = Workspace::current().context("Failed to determine working directory")?;
    let settings = Settings::load(workspace.root()).context("Failed to load settings")?;
    Ok((workspace, settings))
}

fn read_reply(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read reply file: {}", path.display()))?;
    Ok(strip_reasoning(&raw))
}

/// Prints per-file results and fails when anything went wrong
fn report_outcomes(
    files: &[FileOutcome],
    rejected: &[GroupError],
    config: &Config,
) -> Result<()> {
    let mut summary = PatchSummary::new(files.len() + rejected.len());
    for error in rejected {
        summary.reject(error);
    }
    for outcome in files {
        summary.record(outcome, config.verbose);
    }
    summary.finish();

    if summary.has_failures() {
        anyhow::bail!("Some edits could not be applied");
    }
    Ok(())
}

pub async fn edit(
    prompt: String,
    files: Vec<String>,
    model: Option<String>,
    grammar: Option<Grammar>,
    config: &Config,
) -> Result<()> {
    let (workspace, settings) = load_workspace()?;
    let model = model
        .or_else(|| settings.model.clone())
        .context("No model configured; pass --model or set EDITLOOP_MODEL")?;
    let grammar = grammar.unwrap_or(settings.grammar);

    let tree = DirectoryTree::default()
        .render(workspace.root())
        .context("Failed to list working directory")?;
    let client = OllamaClient::new(
        &settings.ollama_base_url,
        Duration::from_secs(settings.timeout_secs),
    )
    .context("Failed to create Ollama client")?;

    println!(
        "Running edit session with {} at {} ({} format)",
        model,
        client.endpoint(),
        grammar
    );
    if config.dry_run {
        println!("[DRY RUN] Patches will be computed but not written");
    }

    let options = SessionOptions {
        model,
        max_rounds: settings.max_rounds,
        strict_ranges: settings.strict_ranges,
        dry_run: config.dry_run,
        number_lines: settings.number_lines,
        transcript_root: settings
            .transcripts
            .then(|| workspace.root().to_path_buf()),
    };
    let task = Task {
        prompt,
        files,
        working_dir: workspace.root().display().to_string(),
        tree: Some(tree),
    };

    let session = EditSession::new(client, &workspace, Protocol::new(grammar), options);
    let report = session.run(&task).await.context("Edit session failed")?;

    println!(
        "Conversation ended after {} round(s): {}",
        report.rounds, report.stop_reason
    );
    if let Some(dir) = &report.transcript {
        println!("Transcript: {}", dir.display());
    }
    if config.verbose {
        for diagnostic in &report.diagnostics {
            eprintln!("  ! {}", diagnostic);
        }
    }
    if report.files.is_empty() && report.rejected.is_empty() {
        println!("No edits to apply");
        return Ok(());
    }

    report_outcomes(&report.files, &report.rejected, config)
}

pub fn parse_reply(path: &Path, grammar: Option<Grammar>, config: &Config) -> Result<()> {
    let (_, settings) = load_workspace()?;
    let protocol = Protocol::new(grammar.unwrap_or(settings.grammar));
    let reply = read_reply(path)?;

    let outcome = ActionParser::new(protocol).parse(&reply);
    println!(
        "Found {} action(s) in {} ({} format)",
        outcome.actions.len(),
        path.display(),
        protocol.grammar
    );
    for action in &outcome.actions {
        println!("\n{}", protocol.render(action));
    }

    for diagnostic in &outcome.diagnostics {
        eprintln!("✗ {}", diagnostic);
    }

    let grouping = group(&outcome.actions);
    for g in &grouping.groups {
        println!("\n✓ {}: {} edit(s)", g.path, g.edits.len());
        if config.verbose {
            for edit in &g.edits {
                println!(
                    "    {} lines {}..{} ({} content line(s))",
                    edit.operation,
                    edit.start_line,
                    edit.end_line,
                    edit.content_lines().len()
                );
            }
        }
    }
    for error in &grouping.rejected {
        eprintln!("✗ {}", error);
    }

    Ok(())
}

pub fn apply_reply(
    path: &Path,
    grammar: Option<Grammar>,
    strict: bool,
    config: &Config,
) -> Result<()> {
    let (workspace, settings) = load_workspace()?;
    let protocol = Protocol::new(grammar.unwrap_or(settings.grammar));
    let reply = read_reply(path)?;

    let outcome = ActionParser::new(protocol).parse(&reply);
    for diagnostic in &outcome.diagnostics {
        tracing::warn!("{}", diagnostic);
    }

    let grouping = group(&outcome.actions);
    if grouping.is_empty() {
        println!("No edits found in {}", path.display());
        return Ok(());
    }
    if config.dry_run {
        println!("[DRY RUN] Patches will be computed but not written");
    }

    let engine = PatchEngine::new(&workspace)
        .strict_ranges(strict || settings.strict_ranges)
        .dry_run(config.dry_run);
    let files: Vec<FileOutcome> = grouping
        .groups
        .iter()
        .map(|g| FileOutcome {
            path: g.path.clone(),
            result: engine.apply_group(g),
        })
        .collect();

    report_outcomes(&files, &grouping.rejected, config)
}

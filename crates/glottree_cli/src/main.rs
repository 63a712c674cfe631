//! `glottree` command-line entry point.
//!
//! # Responsibility
//! - Map batch subcommands onto `glottree_core` loads, transcodes and checks.
//! - Print human-readable summaries and exit nonzero on any error.

use clap::{Parser, Subcommand};
use glottree_core::model::forest::reparented_identifiers;
use glottree_core::repo::relocation::RelocationPlan;
use glottree_core::service::report_service::{
    ascii_tree, classification_comments, metadata_stats, missing_iso,
};
use glottree_core::{
    default_log_level, init_console_logging, validate, DirectoryTreeRepository, FlatTranscoder,
    Forest, IdentifierRegistry, IsoRegistry, IsoTable, Level, LoadOutcome, RepoConfig, Severity,
    TreeRepository,
};
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "glottree", version, about = "Curate a languoid classification tree")]
struct Cli {
    /// Root of the data repository.
    #[arg(long, global = true, env = "GLOTTREE_REPOS", default_value = ".")]
    repos: PathBuf,

    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = "GLOTTREE_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the tree and print languoid counters.
    Check,
    /// Write the tree as two flat documents.
    Tree2lff,
    /// Rebuild the tree from the two flat documents.
    Lff2tree {
        /// Print the relocation plan without touching the tree.
        #[arg(long)]
        dry_run: bool,
    },
    /// Count filled metadata options per section.
    Stats,
    /// List classification comments.
    Classification,
    /// List living ISO 639-3 codes that no languoid uses.
    MissingIso,
    /// Print the subtree below one languoid.
    Tree {
        identifier: String,
        /// Hide languoids nested deeper than this level.
        #[arg(long)]
        max_level: Option<Level>,
    },
}

/// Command outcome: `Ok(true)` when nothing was reported as an error.
type CommandResult = Result<bool, String>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    if let Err(err) = init_console_logging(level) {
        eprintln!("warning: logging disabled: {err}");
    }

    let result = RepoConfig::load(&cli.repos)
        .map_err(|err| err.to_string())
        .and_then(|config| run(&config, cli.command));
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(message) => {
            error!("event=cli_command module=cli status=error error={message}");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &RepoConfig, command: Command) -> CommandResult {
    match command {
        Command::Check => check(config),
        Command::Tree2lff => tree_to_lff(config),
        Command::Lff2tree { dry_run } => lff_to_tree(config, dry_run),
        Command::Stats => stats(config),
        Command::Classification => classification(config),
        Command::MissingIso => missing_iso_codes(config),
        Command::Tree {
            identifier,
            max_level,
        } => tree(config, &identifier, max_level),
    }
}

fn load_tree(config: &RepoConfig) -> Result<LoadOutcome, String> {
    let outcome = DirectoryTreeRepository::new(config.tree_root())
        .load()
        .map_err(|err| err.to_string())?;
    for failure in &outcome.failures {
        eprintln!("error: malformed languoid directory {failure}");
    }
    Ok(outcome)
}

/// Loads the tree and refuses to continue past malformed directories.
fn load_complete_tree(config: &RepoConfig) -> Result<Forest, String> {
    let outcome = load_tree(config)?;
    if !outcome.is_complete() {
        return Err(format!(
            "{} malformed languoid directories; fix them first",
            outcome.failures.len()
        ));
    }
    Ok(outcome.forest)
}

fn check(config: &RepoConfig) -> CommandResult {
    let outcome = load_tree(config)?;
    let registry =
        IdentifierRegistry::load(config.registry_path()).map_err(|err| err.to_string())?;
    let iso = IsoTable::load(config.iso_path()).map_err(|err| err.to_string())?;
    if iso.is_none() {
        info!(
            "event=tree_check module=cli status=ok iso_check=skipped iso_dir={}",
            config.iso_path().display()
        );
    }

    let report = validate(
        &outcome.forest,
        &registry,
        iso.as_ref().map(|table| table as &dyn IsoRegistry),
    );
    for diagnostic in &report.diagnostics {
        eprintln!("{diagnostic}");
    }
    print!("{}", report.render_counters());

    let errors = report.count(Severity::Error) + outcome.failures.len();
    println!(
        "{} languoids checked: {} errors, {} warnings",
        outcome.forest.len(),
        errors,
        report.count(Severity::Warning)
    );
    Ok(errors == 0)
}

fn tree_to_lff(config: &RepoConfig) -> CommandResult {
    let forest = load_complete_tree(config)?;
    let partition = config.partition;
    let documents = FlatTranscoder::new(config.indent_width)
        .encode(&forest, |forest, key| partition.classify(forest, key));

    let (path_a, path_b) = (config.document_a_path(), config.document_b_path());
    write_document(&path_a, &documents.a)?;
    write_document(&path_b, &documents.b)?;
    println!(
        "{} languoids written to {} and {}",
        forest.len(),
        path_a.display(),
        path_b.display()
    );
    Ok(true)
}

fn lff_to_tree(config: &RepoConfig, dry_run: bool) -> CommandResult {
    let repo = DirectoryTreeRepository::new(config.tree_root());
    let base = load_complete_tree(config)?;
    let text_a = read_document(&config.document_a_path())?;
    let text_b = read_document(&config.document_b_path())?;

    let mut registry =
        IdentifierRegistry::load(config.registry_path()).map_err(|err| err.to_string())?;
    let mut forest = FlatTranscoder::new(config.indent_width)
        .decode_onto(&text_a, &text_b, &base, &mut registry)
        .map_err(|err| err.to_string())?;

    if dry_run {
        let plan = repo.plan(&forest).map_err(|err| err.to_string())?;
        for id in reparented_identifiers(&base, &forest) {
            let parent = forest
                .key_of(id.as_str())
                .and_then(|key| forest.parent(key))
                .and_then(|parent| forest.get(parent))
                .map_or_else(|| "top level".to_string(), |parent| parent.id().to_string());
            println!("reparent {id} -> {parent}");
        }
        print_plan(&plan, registry.pending().len());
        return Ok(true);
    }

    let summary = repo
        .materialize(&mut forest)
        .map_err(|err| err.to_string())?;
    let appended = registry.flush().map_err(|err| err.to_string())?;
    println!(
        "{} created, {} moved, {} removed, {} metadata files written, {} identifiers registered",
        summary.created, summary.moved, summary.removed, summary.written, appended
    );
    Ok(true)
}

fn print_plan(plan: &RelocationPlan, pending: usize) {
    for relocation in &plan.relocations {
        println!(
            "move   {} {} -> {}",
            relocation.id,
            relocation.from.display(),
            relocation.to.display()
        );
    }
    for removal in &plan.removals {
        println!("remove {} {}", removal.id, removal.dir.display());
    }
    println!(
        "dry run: {} to create, {} to move, {} to remove, {} new identifiers",
        plan.created.len(),
        plan.relocations.len(),
        plan.removals.len(),
        pending
    );
}

fn stats(config: &RepoConfig) -> CommandResult {
    let outcome = load_tree(config)?;
    let rows = metadata_stats(&outcome.forest);
    let width = rows
        .iter()
        .map(|row| row.option.len())
        .max()
        .unwrap_or(0)
        .max("option".len());

    println!("{:<width$}  {:>8}", "option", "count");
    let mut current_section: Option<&str> = None;
    for row in &rows {
        if current_section != Some(row.section.as_str()) {
            println!("[{}]", row.section);
            current_section = Some(row.section.as_str());
        }
        println!("{:<width$}  {:>8}", row.option, row.count);
    }
    Ok(outcome.is_complete())
}

fn classification(config: &RepoConfig) -> CommandResult {
    let outcome = load_tree(config)?;
    for row in classification_comments(&outcome.forest) {
        println!("{row}");
    }
    Ok(outcome.is_complete())
}

fn missing_iso_codes(config: &RepoConfig) -> CommandResult {
    let iso = IsoTable::load(config.iso_path())
        .map_err(|err| err.to_string())?
        .ok_or_else(|| format!("no ISO 639-3 tables in {}", config.iso_path().display()))?;
    let outcome = load_tree(config)?;
    let rows = missing_iso(&outcome.forest, &iso);
    for row in &rows {
        println!("{row}");
    }
    println!("{} living ISO codes missing", rows.len());
    Ok(outcome.is_complete())
}

fn tree(config: &RepoConfig, identifier: &str, max_level: Option<Level>) -> CommandResult {
    let outcome = load_tree(config)?;
    let rendered = ascii_tree(&outcome.forest, identifier, max_level)
        .ok_or_else(|| format!("languoid not found: {identifier}"))?;
    print!("{rendered}");
    Ok(outcome.is_complete())
}

fn read_document(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))
}

fn write_document(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| format!("{}: {err}", parent.display()))?;
    }
    fs::write(path, content).map_err(|err| format!("{}: {err}", path.display()))
}

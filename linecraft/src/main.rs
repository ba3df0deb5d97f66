use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use linecraft::diff::{print_diff, DiffStats};
use linecraft::executor::{ExecutorOptions, InstructionExecutor};
use linecraft::state;
use linecraft::validate::{self, ValidationStats};
use linecraft::{instruction, parser};

#[derive(Parser)]
#[command(name = "linecraft")]
#[command(about = "Apply agent-authored edit instructions to real files: parse, locate, modify & undo")]
#[command(long_about = "Line-oriented edit instruction engine for AI agents.

An agent writes instructions like:

  Modify File
      name: src/app.py
      /Changes
          /Replace
              start_context:
              . def handler():
              new_content:
              . def handler(request):
          /
      /

linecraft parses the instructions, locates each anchor (exact match first,
then whitespace-normalized, then context-bounded), applies the edits, and
records a revertible run. Ambiguous anchors are reported with candidate line
numbers instead of being guessed at.")]
#[command(after_help = "Examples:
  linecraft apply changes.txt                  # dry-run: preview diffs
  linecraft apply changes.txt --apply          # write changes, record a run
  linecraft apply - --apply < changes.txt      # read instructions from stdin
  linecraft check changes.txt                  # parse + interpret only
  linecraft validate --paths src               # syntax-check rs/json/yaml files
  linecraft revert a1b2c3d                     # restore a recorded run")]
#[command(version)]
struct Cli {
    /// Use project-local state directory (.linecraft) instead of ~/.linecraft
    #[arg(long, global = true)]
    local_state: bool,

    /// Output format: "default", "diff", or "json"
    #[arg(long, default_value = "default", global = true)]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an instruction file and apply it (dry-run unless --apply)
    Apply {
        /// Instruction file, or "-" for stdin
        file: String,

        /// Directory that instruction paths are resolved against
        #[arg(short, long)]
        target_dir: Option<PathBuf>,

        /// Apply changes (default is dry-run)
        #[arg(long)]
        apply: bool,

        /// Run the syntax validator over modified files afterwards
        #[arg(long)]
        validate: bool,
    },

    /// Parse and interpret an instruction file without touching any file
    Check {
        /// Instruction file, or "-" for stdin
        file: String,
    },

    /// Validate file syntax (Rust, JSON, YAML) across paths
    Validate {
        /// Files, directories, or glob patterns
        #[arg(short, long, num_args = 1..)]
        paths: Vec<String>,

        /// Exclude paths containing these substrings (can be used multiple times)
        #[arg(long, num_args = 0..)]
        exclude: Vec<String>,
    },

    /// Show recent runs
    History {
        /// Maximum number of runs to list
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Revert a previously applied run
    Revert {
        /// Run ID as printed by apply (see also: history)
        run_id: String,

        /// Revert even if files changed since the run
        #[arg(long)]
        force: bool,
    },

    /// Remove state older than the retention window
    Clean {
        /// Days of history to keep
        #[arg(long, default_value_t = 30)]
        keep_days: u32,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            file,
            target_dir,
            apply,
            validate,
        } => cmd_apply(
            &file,
            target_dir,
            apply,
            validate,
            cli.local_state,
            &cli.format,
        ),
        Commands::Check { file } => cmd_check(&file, &cli.format),
        Commands::Validate { paths, exclude } => cmd_validate(&paths, &exclude),
        Commands::History { limit } => {
            let state_dir = state::get_state_dir(cli.local_state)?;
            state::show_history(limit, &state_dir)
        }
        Commands::Revert { run_id, force } => {
            let state_dir = state::get_state_dir(cli.local_state)?;
            state::revert_run(&run_id, force, &state_dir)
        }
        Commands::Clean { keep_days } => {
            let state_dir = state::get_state_dir(cli.local_state)?;
            state::clean_old_state(keep_days, &state_dir)
        }
    }
}

fn cmd_apply(
    file: &str,
    target_dir: Option<PathBuf>,
    apply: bool,
    validate: bool,
    local_state: bool,
    format: &str,
) -> Result<()> {
    let text = read_input(file)?;

    let mut executor = InstructionExecutor::new(ExecutorOptions {
        target_root: target_dir,
        apply,
        validate,
    });
    let report = executor.execute(&text);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for outcome in &report.applied {
            println!(
                "✓ {} {}: {}",
                outcome.operation,
                outcome.path.display(),
                outcome.detail
            );
            if let Some(validation) = &outcome.validation {
                if validation.is_valid {
                    println!("  ✓ syntax valid");
                } else if let Some(message) = &validation.error_message {
                    println!("  ✗ {message}");
                }
            }
        }

        if format == "diff" || !apply {
            let mut total = DiffStats::default();
            for mutation in executor.mutations() {
                let before = mutation.before.as_deref().unwrap_or("");
                let after = mutation.after.as_deref().unwrap_or("");
                total.add(&print_diff(&mutation.path, before, after));
            }
            if total.files_changed > 0 {
                total.print_summary();
            }
        }
    }

    if let Some(error) = &report.error {
        let at = report
            .failed_at
            .map(|i| format!(" at operation {i}"))
            .unwrap_or_default();
        eprintln!("\n✗ Execution failed{at}: {error}");
        if !report.applied.is_empty() {
            eprintln!(
                "  {} operation(s) before the failure were already applied",
                report.applied.len()
            );
        }
        std::process::exit(report.error_kind.map_or(1, |k| k.exit_code()));
    }

    if apply {
        record_run(&executor, &report, local_state)?;
    } else if format != "json" {
        println!("\nDry-run: no files were written (use --apply to write changes)");
    }

    let invalid = report
        .applied
        .iter()
        .filter_map(|o| o.validation.as_ref())
        .filter(|v| !v.is_valid)
        .count();
    if invalid > 0 {
        eprintln!("\n⚠️  {invalid} file(s) failed syntax validation after the edit");
        std::process::exit(1);
    }

    Ok(())
}

/// Persist backups and run metadata so the run can be reverted later.
fn record_run(
    executor: &InstructionExecutor,
    report: &linecraft::ExecutionReport,
    local_state: bool,
) -> Result<()> {
    let mutations = executor.mutations();
    if mutations.is_empty() {
        println!("No changes made");
        return Ok(());
    }

    let run_id = state::generate_run_id();
    let state_dir = state::get_state_dir(local_state)?;
    let command = std::env::args().collect::<Vec<_>>().join(" ");

    let mut files_modified = Vec::new();
    for (seq, mutation) in mutations.iter().enumerate() {
        let backup_file = match &mutation.before {
            Some(previous) => Some(state::save_backup(
                &mutation.path,
                previous,
                seq,
                &run_id,
                &state_dir,
            )?),
            None => None,
        };
        files_modified.push(state::FileModification {
            path: mutation.path.clone(),
            hash_before: mutation.before.as_deref().map(content_hash),
            hash_after: mutation.after.as_deref().map(content_hash),
            backup_file,
        });
    }

    let mut operations: Vec<&str> = report.applied.iter().map(|o| o.operation.as_str()).collect();
    operations.dedup();

    let metadata = state::RunMetadata {
        run_id: run_id.clone(),
        timestamp: chrono::Utc::now(),
        command,
        operation: operations.join(", "),
        files_modified,
        status: state::RunStatus::Applied,
        can_revert: true,
    };
    state::save_run_metadata(&metadata, &state_dir)?;

    println!("\n📝 Run ID: {run_id} (use 'linecraft revert {run_id}' to undo)");
    Ok(())
}

fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

fn cmd_check(file: &str, format: &str) -> Result<()> {
    let text = read_input(file)?;
    let body = linecraft::executor::extract_instructions(&text);

    let doc = match parser::parse(body) {
        Ok(doc) => doc,
        Err(err) => {
            eprintln!("✗ Parse error: {err}");
            std::process::exit(linecraft::ErrorKind::Parse.exit_code());
        }
    };
    let instructions = match instruction::interpret(&doc) {
        Ok(ops) => ops,
        Err(err) => {
            eprintln!("✗ {err}");
            std::process::exit(err.kind().exit_code());
        }
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&instructions)?);
    } else {
        println!("✓ {} operation(s):", instructions.len());
        for (i, op) in instructions.iter().enumerate() {
            println!("  {i}: {} {}", op.label(), op.path().display());
        }
    }
    Ok(())
}

fn cmd_validate(patterns: &[String], exclude: &[String]) -> Result<()> {
    let files = collect_files(patterns, exclude)?;
    if files.is_empty() {
        println!("No files found to validate");
        return Ok(());
    }

    let mut stats = ValidationStats::default();
    for path in &files {
        let result = validate::validate_path(path)
            .with_context(|| format!("Failed to validate {}", path.display()))?;
        match &result {
            Some(r) if r.is_valid => println!("✓ {}", path.display()),
            Some(r) => {
                println!("✗ {}", path.display());
                for err in &r.syntax_errors {
                    println!("    {}:{}: {}", err.line, err.column, err.message);
                    if let (Some(code), Some(pointer)) = (&err.code_line, &err.pointer) {
                        println!("    {code}");
                        println!("    {pointer}");
                    }
                }
            }
            None => {}
        }
        stats.record(result.as_ref());
    }

    println!(
        "\nChecked {} file(s): {} valid, {} invalid, {} skipped",
        stats.files_checked, stats.files_valid, stats.files_invalid, stats.files_skipped
    );
    if stats.files_invalid > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Collect candidate files from plain paths, directories, and glob patterns.
fn collect_files(patterns: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let path = Path::new(pattern);
        if path.is_dir() {
            for entry in WalkDir::new(path) {
                let entry = entry?;
                if entry.file_type().is_file() && validate::is_supported(entry.path()) {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            for entry in
                glob(pattern).with_context(|| format!("Invalid glob pattern: {pattern}"))?
            {
                let p = entry?;
                if p.is_file() {
                    files.push(p);
                }
            }
        } else {
            files.push(path.to_path_buf());
        }
    }

    files.retain(|p| {
        let text = p.to_string_lossy();
        !exclude.iter().any(|pat| text.contains(pat.as_str()))
    });
    files.sort();
    files.dedup();
    Ok(files)
}

fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read instructions from stdin")?;
        Ok(text)
    } else {
        fs::read_to_string(file).with_context(|| format!("Failed to read {file}"))
    }
}

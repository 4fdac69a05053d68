/// Story Linter: checks a story file for dead ends, broken scripts and
/// runaway instant-leaf cascades.
///
/// Usage: story_linter <story.json|story.ron> [--seed <n>]

use branch_engine::core::session::{Issue, StorySession};
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_linter <story.json|story.ron> [--seed <n>]");
        process::exit(0);
    }

    init_tracing();

    let story_path = Path::new(&args[1]);
    let mut seed: u64 = 0;

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--seed" && i + 1 < args.len() {
            i += 1;
            seed = args[i].parse().unwrap_or(0);
        }
        i += 1;
    }

    if !story_path.is_file() {
        eprintln!("ERROR: Path '{}' does not exist", story_path.display());
        process::exit(1);
    }

    let mut session = match StorySession::builder().seed(seed).story_path(story_path).build() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("ERROR: Failed to load story file: {}", e);
            process::exit(1);
        }
    };

    println!(
        "Loaded {} nodes ({} default vars, {} starting items)",
        session.graph().len(),
        session.defaults().vars.len(),
        session.defaults().inventory.len()
    );

    let (errors, warnings) = split_issues(session.validate());

    println!("\n=== Story Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("branch_engine=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Scripts that fail to parse are skipped at play time, so they only warn.
/// A missing start or a cascade that cannot settle stops play outright.
fn split_issues(issues: Vec<Issue>) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for issue in issues {
        match issue {
            Issue::MissingStart(_) | Issue::Cascade { .. } | Issue::DeadEnd(_) => {
                errors.push(issue.to_string())
            }
            Issue::BadAction { .. } | Issue::BadCondition { .. } => {
                warnings.push(issue.to_string())
            }
        }
    }

    (errors, warnings)
}

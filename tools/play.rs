/// Play: walk a story in the terminal the way a reader would.
///
/// Usage: play --story <path> [--seed <n>]
///
/// Commands:
///   <n>       pick the n-th visible choice
///   vars      show the variable store
///   inv       show the inventory
///   path      show the nodes visited so far
///   restart   reset to the defaults and enter the start node
///   help      list commands
///   quit      exit

use branch_engine::core::session::{PlayStatus, PlayView, StorySession};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut story_path = None;
    let mut seed: u64 = 0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--story" if i + 1 < args.len() => {
                i += 1;
                story_path = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(0);
            }
            other if !other.starts_with("--") && story_path.is_none() => {
                story_path = Some(other.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(story_path) = story_path else {
        print_usage();
        std::process::exit(1);
    };

    init_tracing();

    let mut session = match StorySession::builder().seed(seed).story_path(&story_path).build() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("ERROR: Failed to load story: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} nodes from {}", session.graph().len(), story_path);
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    if !restart(&mut session) {
        std::process::exit(1);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("play> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Ok(number) = line.parse::<usize>() {
            if number == 0 {
                println!("Choices are numbered from 1.");
                continue;
            }
            match session.choose(number - 1) {
                Ok(view) => show(&view),
                Err(e) => println!("ERROR: {}", e),
            }
            continue;
        }

        match line.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "vars" => {
                if session.vars().is_empty() {
                    println!("  (no variables)");
                }
                for (name, value) in session.vars().iter() {
                    println!("  {} = {}", name, value);
                }
            }
            "inv" => {
                if session.inventory().is_empty() {
                    println!("  (empty)");
                }
                for item in session.inventory().iter() {
                    println!("  - {}", item);
                }
            }
            "path" => match session.view() {
                Some(view) => {
                    let path: Vec<String> = view.path.iter().map(ToString::to_string).collect();
                    println!("  {}", path.join(" -> "));
                }
                None => println!("Not playing."),
            },
            "restart" => {
                restart(&mut session);
            }
            _ => println!("Unknown command: {}. Type 'help' for commands.", line),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("branch_engine=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn restart(session: &mut StorySession) -> bool {
    match session.start_play() {
        Ok(view) => {
            show(&view);
            true
        }
        Err(e) => {
            println!("ERROR: {}", e);
            false
        }
    }
}

fn show(view: &PlayView) {
    for skipped in &view.skipped {
        println!("  (skipped '{}': {})", skipped.source, skipped.error);
    }

    if let Some(node) = view.node {
        println!("\n--- Node {} ---", node);
    }
    if !view.header.is_empty() {
        println!("{}", view.header);
    }

    match view.status {
        PlayStatus::Active => {
            println!();
            for (n, choice) in view.choices.iter().enumerate() {
                println!("  {}. {}", n + 1, choice.text);
            }
            println!();
        }
        PlayStatus::Ended => println!("\n[THE END]\n"),
        PlayStatus::DeadEnd(node) => println!("\n[DEAD END] node {} not found\n", node),
    }
}

fn print_usage() {
    println!("Usage: play --story <path> [--seed <n>]");
    println!("       play <path> [--seed <n>]");
    println!();
    println!("Story files may be JSON or RON (by extension).");
    println!("Set RUST_LOG=branch_engine=debug to trace actions and jumps.");
}

fn print_help() {
    println!("Commands:");
    println!("  <n>       Pick the n-th visible choice");
    println!("  vars      Show the variable store");
    println!("  inv       Show the inventory");
    println!("  path      Show the nodes visited so far");
    println!("  restart   Reset to the defaults and enter the start node");
    println!("  help      Show this help");
    println!("  quit      Exit");
}

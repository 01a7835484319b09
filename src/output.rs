//! Styled terminal output for operation results (no-op styling when stdout
//! isn't a TTY).

use std::env;
use std::io::IsTerminal;

use colored::Colorize;
use liman_core::{LibraryGroup, OperationResult};

pub fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

pub fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

pub fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

pub fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

pub fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

/// Render per-entry results; returns false when anything failed or was
/// cancelled.
pub fn print_results(results: &[OperationResult]) -> bool {
    let mut all_ok = true;
    for result in results {
        let label = result
            .state
            .as_ref()
            .map(|s| s.library_id.clone())
            .unwrap_or_else(|| "manifest".to_string());
        if result.cancelled {
            all_ok = false;
            dim(&format!("  {} cancelled", label));
        } else if result.success {
            success(&format!("  {} restored", label));
        } else {
            all_ok = false;
            for err in &result.errors {
                error(&format!("  {}: {}", label, err));
            }
        }
    }
    all_ok
}

pub fn print_search_hits(hits: &[LibraryGroup]) {
    if hits.is_empty() {
        dim("No libraries found.");
        return;
    }
    for group in hits {
        let latest = group.versions.first().map(String::as_str).unwrap_or("");
        if latest.is_empty() {
            info(group.display_name.as_str());
        } else {
            info(&format!("{} (latest: {})", group.display_name, latest));
        }
        if let Some(desc) = &group.description {
            dim(&format!("    {}", desc));
        }
    }
}

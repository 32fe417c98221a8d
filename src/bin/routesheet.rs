//! Command-line interface for routesheet
//! This binary parses a pre-extracted route sheet text file and either dumps
//! the timeline as JSON or renders the annotated pages for audit.
//!
//! Usage:
//!   routesheet events `<path>` [--no-partials]  - Dump (state, event) pairs as JSON
//!   routesheet audit `<path>` [--no-partials]   - Render annotated pages and diagnostics

use clap::{Arg, ArgAction, Command};
use routesheet::sheet::{RouteEvent, Timeline, TimelineOptions, TimelineState};
use std::fs;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("routesheet")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A tool for parsing and auditing trekking-race route sheets")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("events")
                .about("Dump the timeline as JSON")
                .arg(
                    Arg::new("path")
                        .help("Path to the extracted sheet text")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("no-partials")
                        .long("no-partials")
                        .help("Do not generate intermediate pacing waypoints")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("audit")
                .about("Render annotated pages and the diagnostic list")
                .arg(
                    Arg::new("path")
                        .help("Path to the extracted sheet text")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("no-partials")
                        .long("no-partials")
                        .help("Do not generate intermediate pacing waypoints")
                        .action(ArgAction::SetTrue),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("events", sub)) => {
            let path = sub.get_one::<String>("path").map(String::as_str).unwrap_or("");
            handle_events_command(path, !sub.get_flag("no-partials"));
        }
        Some(("audit", sub)) => {
            let path = sub.get_one::<String>("path").map(String::as_str).unwrap_or("");
            handle_audit_command(path, !sub.get_flag("no-partials"));
        }
        _ => unreachable!(),
    }
}

fn build_timeline(path: &str, partial_waypoints: bool) -> Timeline {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("Error reading {}: {}", path, err);
            process::exit(1);
        }
    };
    let options = TimelineOptions {
        partial_waypoints,
        ..TimelineOptions::default()
    };
    match Timeline::from_text(&content, options) {
        Ok(timeline) => timeline,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }
}

fn collect_pairs(timeline: &mut Timeline) -> Vec<(TimelineState, RouteEvent)> {
    let mut pairs = Vec::new();
    for item in timeline {
        match item {
            Ok(pair) => pairs.push(pair),
            Err(err) => {
                eprintln!("Error: {}", err);
                process::exit(1);
            }
        }
    }
    pairs
}

/// Handle the events command: the timeline and diagnostics as one JSON
/// document on stdout.
fn handle_events_command(path: &str, partial_waypoints: bool) {
    let mut timeline = build_timeline(path, partial_waypoints);
    let pairs = collect_pairs(&mut timeline);
    let report = timeline.into_report();

    let items: Vec<serde_json::Value> = pairs
        .iter()
        .map(|(state, event)| {
            serde_json::json!({
                "state": state,
                "event": event,
            })
        })
        .collect();
    let document = serde_json::json!({
        "timeline": items,
        "diagnostics": report.diagnostics,
    });
    match serde_json::to_string_pretty(&document) {
        Ok(text) => println!("{}", text),
        Err(err) => {
            eprintln!("Error serializing timeline: {}", err);
            process::exit(1);
        }
    }
}

/// Handle the audit command: annotated pages on stdout, diagnostics after.
fn handle_audit_command(path: &str, partial_waypoints: bool) {
    let mut timeline = build_timeline(path, partial_waypoints);
    let _ = collect_pairs(&mut timeline);
    let report = timeline.into_report();

    print!("{}", report.render());
    if !report.diagnostics.is_empty() {
        println!();
        for diagnostic in &report.diagnostics {
            println!("{}", diagnostic);
        }
    }
}

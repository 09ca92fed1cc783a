//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire feed, reconciler and registry the way a host would.
//! - Print deterministic counts for quick local sanity checks.
//!
//! Usage: `welcome_cli [log_level] [log_dir]`; a blank `log_dir` logs to stderr.

use log::info;
use serde_json::json;
use std::process::ExitCode;
use std::rc::Rc;
use welcome_core::{
    core_version, default_log_level, init_logging, views_welcome_source, ExtensionPoint,
    InMemoryViewsRegistry, ProposedApiPolicy, ReconcilerConfig, ViewsWelcomeContribution,
    WelcomeEntry, VIEWS_WELCOME_EXTENSION_POINT,
};

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let level = args.next().unwrap_or_else(|| default_log_level().to_string());
    let log_dir = args.next().unwrap_or_default();

    if let Err(err) = init_logging(&level, &log_dir) {
        eprintln!("logging init failed: {err}");
        return ExitCode::FAILURE;
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("smoke run failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("welcome_core version={}", core_version());

    let policy = ProposedApiPolicy::from_switch_values(false, ["demo.enabled"]);
    let enabled = views_welcome_source(
        &json!({
            "publisher": "demo",
            "name": "enabled",
            "version": "1.0.0",
            "enableProposedApi": true,
            "contributes": {
                "viewsWelcome": [{ "view": "explorer", "contents": "Open a folder" }]
            }
        }),
        &policy,
        VIEWS_WELCOME_EXTENSION_POINT,
    )?;
    let gated = views_welcome_source(
        &json!({
            "publisher": "demo",
            "name": "gated",
            "version": "1.0.0",
            "contributes": {
                "viewsWelcome": [{ "view": "scm", "contents": "Initialize repository" }]
            }
        }),
        &policy,
        VIEWS_WELCOME_EXTENSION_POINT,
    )?;

    let registry = Rc::new(InMemoryViewsRegistry::new());
    let contribution = ViewsWelcomeContribution::new(registry.clone(), ReconcilerConfig::default());
    let mut point: ExtensionPoint<WelcomeEntry> = ExtensionPoint::new(VIEWS_WELCOME_EXTENSION_POINT);
    contribution.attach(&mut point)?;

    point.accept_users(vec![enabled])?;
    println!("after_add live={} registry={}", contribution.live_count(), registry.len());

    point.accept_users(vec![])?;
    println!("after_remove live={} registry={}", contribution.live_count(), registry.len());

    point.accept_users(vec![gated.clone()])?;
    println!(
        "after_gated_add live={} registry={} diagnostics={}",
        contribution.live_count(),
        registry.len(),
        gated.collector.errors().len()
    );

    contribution.dispose();
    info!("event=smoke_run module=cli status=ok");
    Ok(())
}

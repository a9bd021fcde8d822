use std::path::Path;

use domenv::{env, EnvConfig, EnvOptions, JsdomError};
use tracing_subscriber::EnvFilter;

fn main() {
    let Some(raw_input) = std::env::args().nth(1) else {
        eprintln!("usage: domenv <url | file | html | config.yaml | config.json>");
        std::process::exit(2);
    };

    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let config = if is_config_file(&raw_input) {
        let options = EnvOptions::load(Path::new(&raw_input)).unwrap_or_else(|err| {
            eprintln!("Failed to load config {raw_input}: {err}");
            std::process::exit(1);
        });
        EnvConfig::from_options(options)
    } else {
        EnvConfig::from_input(raw_input)
    };

    let console = domenv::VirtualConsole::new();
    console.on_jsdom_error(|error: &JsdomError| eprintln!("jsdomError: {error}"));
    console.on("log", |event| eprintln!("console: {}", script_message(event)));

    let construction = env(config.virtual_console(console).done(|result| {
        if let Ok(window) = result {
            println!("{}", window.document().to_html());
        }
    }))
    .unwrap_or_else(|err| {
        eprintln!("Invalid configuration: {err}");
        std::process::exit(1);
    });

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        });

    if let Err(err) = rt.block_on(construction.run()) {
        eprintln!("Failed to construct environment: {err}");
        std::process::exit(1);
    }
}

fn is_config_file(raw: &str) -> bool {
    let path = Path::new(raw);
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml" | "json")
    ) && path.is_file()
}

fn script_message(event: &domenv::ConsoleEvent) -> &str {
    match event {
        domenv::ConsoleEvent::Script { message, .. } => message,
        domenv::ConsoleEvent::JsdomError(error) => &error.message,
    }
}

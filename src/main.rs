//! Honyaku - shape-preserving batch translation
//!
//! Command-line front end for the translation bridge: translate strings,
//! arrays, or keyed objects of texts with a local engine and print the
//! congruent result as JSON.

use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use honyaku::bridge::TranslateBridge;
use honyaku::cli::{Args, Commands};
use honyaku::config::{Config, EngineConfig};
use honyaku::engine::EngineKind;
use honyaku::engine::lexicon::LexiconEngine;
use honyaku::engine::ollama::OllamaEngine;
use honyaku::language::LanguageTag;
use honyaku::request::TranslationRequest;
use honyaku::sheet::{SheetRequest, TerminalSheet};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    let _guard = setup_logging(args.verbose)?;

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("honyaku.toml").exists() {
                info!("Found honyaku.toml in current directory, loading...");
                Config::from_file("honyaku.toml")?
            } else {
                Config::default()
            }
        }
    };
    if let Some(engine) = &args.engine {
        config.engine = EngineConfig {
            kind: engine.parse()?,
        };
    }

    match args.command {
        Commands::Task {
            input,
            input_file,
            target,
            source,
            requires_wifi,
            require_charging,
        } => {
            let raw = match (input, input_file) {
                (Some(input), _) => input,
                (None, Some(path)) => std::fs::read_to_string(&path)?,
                (None, None) => anyhow::bail!("Provide --input or --input-file"),
            };

            let params = serde_json::to_value(TranslationRequest {
                input: parse_input(&raw),
                target_lang_code: Some(target),
                source_lang_code: Some(source),
                requires_wifi: requires_wifi.then_some(true),
                require_charging: require_charging.then_some(true),
            })?;

            let bridge = TranslateBridge::from_config(config)?;
            match bridge.translate_task_json(params).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(err) => {
                    eprintln!("{}", serde_json::to_string_pretty(&err)?);
                    std::process::exit(1);
                }
            }
        }
        Commands::Sheet { text, target } => {
            if let Some(target) = target {
                config.sheet.target_language = target;
            }

            let bridge = TranslateBridge::from_config(config)?;
            match bridge
                .translate_sheet(SheetRequest { input: text }, &TerminalSheet)
                .await
            {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(err) => {
                    eprintln!("{}", serde_json::to_string_pretty(&err.to_coded())?);
                    std::process::exit(1);
                }
            }
        }
        Commands::Languages => {
            println!("{:<6} {:<30}", "Code", "Language");
            println!("{}", "-".repeat(36));
            for language in LanguageTag::supported() {
                println!("{:<6} {:<30}", language.code(), language.name());
            }
        }
        Commands::Check => match config.engine.kind {
            EngineKind::Ollama => {
                let engine = OllamaEngine::new(
                    config.ollama.clone(),
                    config.detection.confidence_threshold,
                )?;
                engine.check_availability().await?;
                println!("Ollama model '{}' is ready at {}", config.ollama.model, config.ollama.endpoint);
            }
            EngineKind::Lexicon => {
                let engine = LexiconEngine::new(&config.lexicon.directory);
                let pairs = engine.available_pairs().await?;
                if pairs.is_empty() {
                    println!("No lexicons found in {}", config.lexicon.directory);
                } else {
                    println!("Lexicons in {}:", config.lexicon.directory);
                    for pair in pairs {
                        println!("  {}", pair);
                    }
                }
            }
        },
        Commands::InitConfig { output } => {
            config.save_to_file(&output)?;
            println!("Wrote configuration to {}", output.display());
        }
    }

    Ok(())
}

/// Accept JSON, or fall back to treating the raw argument as one string.
fn parse_input(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".honyaku").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "honyaku.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr so stdout stays machine-readable
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("honyaku.log").display()
    );

    Ok(guard)
}

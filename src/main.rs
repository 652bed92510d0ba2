use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use dgalens::Pipeline;
use dgalens::config::load_config;
use dgalens::prescription::Prescriber;
use dgalens::report::{render_json, render_text};

#[derive(Parser)]
#[command(author, version, about = "Classify domains as DGA or legitimate, explain, and prescribe", long_about = None)]
struct Cli {
    /// Domains to analyze
    domains: Vec<String>,
    /// Domain to analyze (repeatable; combined with positional domains)
    #[arg(long = "domain", value_name = "DOMAIN")]
    extra_domains: Vec<String>,
    /// Classifier artifact (JSON)
    #[arg(long)]
    model: Option<PathBuf>,
    /// Config file (defaults to ~/.dgalens.json if present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Skip the GenAI playbook call and use the local fallback
    #[arg(long)]
    skip_genai: bool,
    /// GenAI API key (overrides config and GOOGLE_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
    /// Print results as JSON
    #[arg(long)]
    json: bool,
    /// Worker threads for multiple domains
    #[arg(long)]
    jobs: Option<usize>,
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[ERR] {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.model_path = model;
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if cli.skip_genai {
        config.prescription.enabled = false;
    }
    if cli.api_key.is_some() {
        config.prescription.api_key = cli.api_key;
    }

    let mut domains = cli.domains;
    domains.extend(cli.extra_domains);
    anyhow::ensure!(!domains.is_empty(), "no domain given (e.g. dgalens kq3v9z7j1x5f8g2h.info)");

    // Load the artifact once, before any domain is processed.
    let prescriber = Prescriber::from_config(config.prescription.clone());
    let pipeline = Pipeline::load(&config.model_path, prescriber)
        .with_context(|| format!("cannot use classifier artifact {}", config.model_path.display()))?;

    let results = pipeline.analyze_batch(&domains, config.jobs);

    if cli.json {
        let json = render_json(&domains, &results);
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        for (domain, result) in domains.iter().zip(&results) {
            match result {
                Ok(analysis) => println!("{}", render_text(analysis)),
                Err(e) => eprintln!("[ERR] {domain}: {e}"),
            }
        }
    }

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        log::warn!("{} of {} domains failed", failed, domains.len());
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

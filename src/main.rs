use pgdoc::assemble::assemble;
use pgdoc::config::Config;
use pgdoc::ir::Schema;
use pgdoc::markdown;
use pgdoc::postgres::{Filter, PgSource};
use pgdoc::render::{RenderOptions, render};
use pgdoc::source::MetadataSnapshot;
use std::env;
use std::fs;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    output: Option<String>,
    snapshot: Option<String>,
    schema: Option<String>,
    include_tables: Option<Vec<String>>,
    exclude_tables: Option<Vec<String>>,
    include_types: Option<bool>,
    pure_markdown: Option<bool>,
    include_rls: Option<bool>,
    include_toc: Option<bool>,
    help: bool,
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} --config <file> --output <file> [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <file>            Connection and rendering config (JSON)");
    eprintln!("  -o, --output <file>            Output Markdown file");
    eprintln!("      --snapshot <file>          Read metadata from a JSON snapshot instead of a database");
    eprintln!("  -s, --schema <name>            Schema to document (default: public)");
    eprintln!("      --include-tables <a,b>     Only tables matching these patterns");
    eprintln!("      --exclude-tables <a,b>     Skip tables matching these patterns");
    eprintln!("      --include-types <bool>     Render the Types section (default: true)");
    eprintln!("      --pure-markdown            No HTML anchors, styling or links");
    eprintln!("      --no-pure-markdown         Keep anchors and links even if the config disables them");
    eprintln!("      --rls, --no-rls            Include or omit row-level security policies");
    eprintln!("      --toc, --no-toc            Include or omit the table of contents");
    eprintln!();
    eprintln!("Flags override the matching config values.");
    process::exit(1);
}

fn split_patterns(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("Missing value for {}", flag))
        };
        match flag {
            "-c" | "--config" => parsed.config = Some(value()?),
            "-o" | "--output" => parsed.output = Some(value()?),
            "--snapshot" => parsed.snapshot = Some(value()?),
            "-s" | "--schema" => parsed.schema = Some(value()?),
            "--include-tables" => parsed.include_tables = Some(split_patterns(&value()?)),
            "--exclude-tables" => parsed.exclude_tables = Some(split_patterns(&value()?)),
            "--include-types" => {
                let v = value()?;
                parsed.include_types = match v.as_str() {
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => return Err(format!("Invalid value for --include-types: {}", v)),
                };
            }
            "--pure-markdown" => parsed.pure_markdown = Some(true),
            "--no-pure-markdown" => parsed.pure_markdown = Some(false),
            "--rls" => parsed.include_rls = Some(true),
            "--no-rls" => parsed.include_rls = Some(false),
            "--toc" => parsed.include_toc = Some(true),
            "--no-toc" => parsed.include_toc = Some(false),
            "-h" | "--help" => {
                parsed.help = true;
                return Ok(parsed);
            }
            _ => return Err(format!("Unknown option: {}", flag)),
        }
        i += 1;
    }

    let has_input = parsed.config.is_some() || parsed.snapshot.is_some();
    if !has_input || parsed.output.is_none() {
        return Err("\"--config\" (or \"--snapshot\") and \"--output\" are required".to_string());
    }
    Ok(parsed)
}

fn apply_flags(mut options: RenderOptions, args: &Args) -> RenderOptions {
    if let Some(include_types) = args.include_types {
        options.include_types = include_types;
    }
    if let Some(pure_markdown) = args.pure_markdown {
        options.pure_markdown = pure_markdown;
    }
    if let Some(include_rls) = args.include_rls {
        options.include_rls = include_rls;
    }
    if let Some(include_toc) = args.include_toc {
        options.include_toc = include_toc;
    }
    options
}

fn filter(args: &Args, config: &Config) -> Filter {
    Filter {
        schema: args.schema.clone().or_else(|| config.schema.clone()),
        include: args
            .include_tables
            .clone()
            .unwrap_or_else(|| config.include_tables.clone()),
        exclude: args
            .exclude_tables
            .clone()
            .unwrap_or_else(|| config.exclude_tables.clone()),
    }
}

async fn load_schema(args: &Args) -> Result<(Schema, RenderOptions), String> {
    if let Some(path) = &args.snapshot {
        let json = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
        let snapshot = MetadataSnapshot::from_json(&json).map_err(|e| format!("Invalid snapshot {}: {}", path, e))?;
        let options = match &args.config {
            Some(config) => Config::load(config).map_err(|e| e.to_string())?.render_options(),
            None => RenderOptions::default(),
        };
        let schema = assemble(&snapshot).await.map_err(|e| e.to_string())?;
        return Ok((schema, options));
    }

    let Some(config_path) = &args.config else {
        return Err("No config given".to_string());
    };
    let config = Config::load(config_path).map_err(|e| e.to_string())?;

    let (client, connection) = tokio_postgres::connect(&config.connection_string(), tokio_postgres::NoTls)
        .await
        .map_err(|e| format!("Failed to connect to {}: {}", config.host, e))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Database connection error: {}", e);
        }
    });

    let source = PgSource::new(&client, filter(args, &config));
    let schema = assemble(&source).await.map_err(|e| e.to_string())?;
    Ok((schema, config.render_options()))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = env::args().collect();
    let program = raw.first().map(String::as_str).unwrap_or("pgdoc");
    let args = match parse_args(&raw) {
        Ok(args) if args.help => usage(program),
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            usage(program);
        }
    };

    tracing::info!("Generating documentation...");
    let (schema, options) = match load_schema(&args).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error generating documentation: {}", e);
            process::exit(1);
        }
    };

    tracing::info!("Tables included in documentation:");
    for table in &schema.tables {
        tracing::info!("- {}", table.name);
    }
    tracing::info!("Views found:");
    for view in &schema.views {
        tracing::info!("- {}", view.name);
    }

    let options = apply_flags(options, &args);
    let output = markdown::serialize(&render(&schema, &options));

    let Some(path) = &args.output else {
        usage(program);
    };
    if let Err(e) = fs::write(path, &output) {
        eprintln!("Failed to write {}: {}", path, e);
        process::exit(1);
    }
    tracing::info!("Documentation written to {}", path);
}

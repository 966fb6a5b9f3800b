//! Tollgate - browse a SQL warehouse, preview a table and export it once the
//! terms of use are accepted.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde_json::Value;
use tollgate_core::logging::{self, init_logging, LogConfig};
use tollgate_core::services::credentials::{
    CredentialSource, EnvCredentials, ForwardedAuthCredentials, ManualCredentials,
};
use tollgate_core::{
    AuditSinkKind, Dataset, ExportFormat, ResultDisposition, SessionConfig, SessionRegistry,
    TollgateError, UserSession, TERMS_OF_USE,
};

/// Widest a preview cell is printed before it is cut.
const PREVIEW_CELL_WIDTH: usize = 32;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Source {
    /// Values passed on the command line
    Manual,
    /// DATABRICKS_* environment variables
    Env,
    /// Headers forwarded by the hosting platform
    Forwarded,
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    ExportFormat::parse(s).ok_or_else(|| format!("unknown format '{s}' (expected csv or json)"))
}

fn parse_audit_sink(s: &str) -> Result<AuditSinkKind, String> {
    AuditSinkKind::parse(s)
        .ok_or_else(|| format!("unknown audit sink '{s}' (expected stdout, file or tracing)"))
}

#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about = "Audited, terms-gated exports from a SQL warehouse")]
struct Cli {
    /// Where credentials come from
    #[arg(long, value_enum, default_value = "manual")]
    source: Source,

    /// Server hostname
    #[arg(long, default_value = "")]
    host: String,

    /// Warehouse HTTP path (e.g. /sql/1.0/warehouses/abc123)
    #[arg(long, default_value = "")]
    http_path: String,

    /// Personal access token
    #[arg(long, env = "DATABRICKS_TOKEN", hide_env_values = true, default_value = "")]
    token: String,

    /// Forwarded request header as NAME=VALUE (with --source forwarded)
    #[arg(long = "header", value_name = "NAME=VALUE")]
    headers: Vec<String>,

    /// Catalog to browse
    #[arg(long)]
    catalog: Option<String>,

    /// Schema to browse
    #[arg(long)]
    schema: Option<String>,

    /// Table to load
    #[arg(long)]
    table: Option<String>,

    /// Row limit (1-100000); defaults to the configured limit
    #[arg(long)]
    limit: Option<u32>,

    /// Print the first N loaded rows
    #[arg(long, value_name = "N", default_value_t = 10)]
    preview: usize,

    /// Export format (csv or json)
    #[arg(long, value_parser = parse_format)]
    format: Option<ExportFormat>,

    /// Accept the terms of use printed before the export
    #[arg(long)]
    accept_terms: bool,

    /// Fetch large results through external links instead of inline
    #[arg(long)]
    external_links: bool,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Audit destination (stdout, file or tracing)
    #[arg(long, value_parser = parse_audit_sink)]
    audit: Option<AuditSinkKind>,

    /// Log filter, overriding TOLLGATE_LOG and RUST_LOG
    #[arg(long, value_name = "FILTER")]
    log_filter: Option<String>,

    /// Directory for the exported file
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print catalogs, schemas and tables for the selection and exit
    #[arg(long)]
    list: bool,
}

impl Cli {
    fn credential_source(&self) -> Box<dyn CredentialSource> {
        match self.source {
            Source::Manual => {
                Box::new(ManualCredentials::new(&self.host, &self.http_path, &self.token))
            }
            Source::Env => Box::new(EnvCredentials::from_env()),
            Source::Forwarded => {
                let headers = self.headers.iter().filter_map(|h| h.split_once('='));
                let mut source = ForwardedAuthCredentials::new(headers);
                if !self.host.is_empty() {
                    source = source.with_fallback_host(&self.host);
                }
                Box::new(source.with_env_defaults())
            }
        }
    }

    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(limit) = self.limit {
            config = config.with_default_row_limit(limit);
        }
        if let Some(secs) = self.connect_timeout {
            config = config.with_connect_timeout_secs(secs);
        }
        if let Some(sink) = self.audit {
            config = config.with_audit_sink(sink);
        }
        if self.external_links {
            config = config.with_result_disposition(ResultDisposition::ExternalLinks);
        }
        config
    }

    fn log_config(&self, config: &SessionConfig) -> LogConfig {
        let mut log_config = LogConfig::new(logging::log_dir());
        if let Some(filter) = &self.log_filter {
            log_config = log_config.with_filter(filter);
        }
        if config.audit_sink == AuditSinkKind::Tracing {
            log_config = log_config.with_audit_dir(logging::audit_log_dir());
        }
        log_config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match SessionConfig::load(cli.config.as_deref()) {
        Ok(config) => cli.apply(config),
        Err(e) => return report(e),
    };
    let _logging_guard = init_logging(cli.log_config(&config));

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(e),
    }
}

fn report(error: TollgateError) -> ExitCode {
    let info = error.to_error_info();
    eprintln!("{}: {}", info.error_type, info.message);
    if let Some(hint) = info.hint {
        eprintln!("  hint: {hint}");
    }
    if let Some(detail) = info.technical_detail {
        eprintln!("  {detail}");
    }
    ExitCode::FAILURE
}

async fn run(cli: Cli, config: SessionConfig) -> Result<(), TollgateError> {
    let registry = SessionRegistry::from_config(config);
    tracing::debug!(audit_sink = registry.audit().sink_name(), "Session registry ready");
    let shared = registry.create_session();
    let session_id = shared.lock().await.id();

    let result = {
        let mut session = shared.lock().await;
        drive(&cli, &mut session).await
    };

    registry.close_session(&session_id).await;
    result
}

async fn drive(cli: &Cli, session: &mut UserSession) -> Result<(), TollgateError> {
    session.connect(cli.credential_source().as_ref()).await?;
    tracing::info!(session_id = %session.id(), "Connected");
    print_discovery_errors(session);

    if let Some(catalog) = &cli.catalog {
        session.select_catalog(catalog).await?;
    }
    if let Some(schema) = &cli.schema {
        session.select_schema(schema).await?;
    }
    if let Some(table) = &cli.table {
        session.select_table(table)?;
    }

    if cli.list {
        print_listing(session);
        return Ok(());
    }

    let dataset = session.load_default().await?;
    let dataset_id = dataset.id();
    println!("Loaded {} at {}", dataset.source_table(), dataset.loaded_at().to_rfc3339());
    println!("  rows:    {}", dataset.row_count());
    println!("  columns: {}", dataset.column_count());
    println!("  size:    ~{:.1} KB", dataset.approx_size_bytes() as f64 / 1024.0);
    print_preview(dataset, cli.preview);

    let Some(format) = cli.format else {
        return Ok(());
    };
    println!();
    println!("{TERMS_OF_USE}");
    if cli.accept_terms {
        session.set_terms_accepted(dataset_id, true)?;
        println!("Terms accepted.");
    }
    let artifact = session.export(format)?;
    let path = artifact.write_to(&cli.out)?;
    println!("Wrote {} ({})", path.display(), artifact.mime_type);
    Ok(())
}

fn print_discovery_errors(session: &UserSession) {
    let browse = session.browse();
    if let Some(error) = browse.schema_error() {
        eprintln!("Could not list schemas in {}: {error}", browse.catalog().unwrap_or_default());
    }
    if let Some(error) = browse.table_error() {
        eprintln!("Could not list tables in {}: {error}", browse.schema().unwrap_or_default());
    }
}

fn print_preview(dataset: &Dataset, rows: usize) {
    let head = dataset.head(rows);
    if head.is_empty() {
        return;
    }

    let cells: Vec<Vec<String>> =
        head.iter().map(|row| row.iter().map(preview_cell).collect()).collect();
    let names = dataset.column_names();
    let widths: Vec<usize> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .filter_map(|row| row.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
                .min(PREVIEW_CELL_WIDTH)
        })
        .collect();

    println!();
    let line = |fields: Vec<&str>| {
        let padded: Vec<String> = fields
            .iter()
            .zip(&widths)
            .map(|(field, width)| format!("{:<width$}", truncate(field, *width), width = *width))
            .collect();
        println!("{}", padded.join(" | ").trim_end());
    };
    line(names.clone());
    println!("{}", widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
    for row in &cells {
        line(row.iter().map(String::as_str).collect());
    }
    if dataset.row_count() > head.len() {
        println!("({} of {} rows shown)", head.len(), dataset.row_count());
    }
}

fn preview_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.replace(['\n', '\r'], " "),
        other => other.to_string(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('~');
        cut
    }
}

fn print_listing(session: &UserSession) {
    let browse = session.browse();
    let marker = |selected: Option<&str>, name: &str| if selected == Some(name) { "*" } else { " " };

    println!("Catalogs:");
    for name in session.catalogs() {
        println!("  {} {name}", marker(browse.catalog(), name));
    }
    if let Some(catalog) = browse.catalog() {
        println!("Schemas in {catalog}:");
        for name in browse.schema_options() {
            println!("  {} {name}", marker(browse.schema(), name));
        }
    }
    if let Some(schema) = browse.schema() {
        println!("Tables in {schema}:");
        for name in browse.table_options() {
            println!("  {} {name}", marker(browse.table(), name));
        }
    }
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use reqwest::Method;

/// Command-line arguments for the hyperjson binary.
#[derive(Debug, Parser)]
#[command(
    name = "hyperjson",
    version,
    about = "Read and write hypermedia JSON resources through a coalescing cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "HYPERJSON_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ClientOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Fetch a resource and print its body.
    Get(GetArgs),
    /// Fetch the API root and print its body.
    Root,
    /// Send a request and print the response body.
    Submit(SubmitArgs),
}

#[derive(Debug, Args, Clone)]
pub struct GetArgs {
    /// Href to fetch, absolute or relative to the API root.
    #[arg(value_name = "HREF")]
    pub href: String,

    /// Also print the `link` relations of the response.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub links: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SubmitArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE, ...).
    #[arg(value_name = "METHOD", value_parser = parse_method)]
    pub method: Method,

    /// Href to submit to, absolute or relative to the API root.
    #[arg(value_name = "HREF")]
    pub href: String,

    /// JSON body; sent as the query string for GET.
    #[arg(long, value_name = "JSON")]
    pub body: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ClientOverrides {
    /// Override the API root.
    #[arg(long = "api-root", value_name = "URL", global = true)]
    pub api_root: Option<String>,

    /// Override the cache capacity.
    #[arg(long = "max-size", value_name = "COUNT", global = true)]
    pub max_size: Option<u64>,

    /// Override the request timeout.
    #[arg(long = "timeout-seconds", value_name = "SECONDS", global = true)]
    pub timeout_seconds: Option<u64>,

    /// Toggle fault injection.
    #[arg(
        long = "chaos",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub chaos: Option<bool>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

fn parse_method(value: &str) -> Result<Method, String> {
    Method::from_bytes(value.to_ascii_uppercase().as_bytes())
        .map_err(|err| format!("invalid method `{value}`: {err}"))
}

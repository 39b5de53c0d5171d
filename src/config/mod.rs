use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::env;

const DEFAULT_INTERFACE: &str = "localhost";
const DEFAULT_PORT: u16 = 25;
const DEFAULT_HOSTNAME: &str = "localhost";
const DEFAULT_STATS_INTERVAL_SECS: u64 = 5;

/// Command-line flags. Each one overrides the matching environment variable.
#[derive(Parser, Debug, Default)]
#[command(name = "mail_sink")]
#[command(version)]
#[command(about = "A forgiving SMTP sink for integration tests", long_about = None)]
pub struct CliArgs {
    /// Listen port
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Listen on interface
    #[arg(short = 'i', long = "interface")]
    pub interface: Option<String>,

    /// Hostname to greet with
    #[arg(short = 'H', long = "hostname")]
    pub hostname: Option<String>,

    /// Log the mail body
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Seconds between stats log lines
    #[arg(long = "stats-interval")]
    pub stats_interval: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The interface to bind the SMTP listener to
    pub listen_interface: String,

    /// The port to bind the SMTP listener to
    pub listen_port: u16,

    /// Hostname announced in the 220 greeting
    pub greeting_hostname: String,

    /// Whether lines inside a DATA block are logged
    pub log_body: bool,

    /// Seconds between connection-count reports
    pub stats_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_interface: DEFAULT_INTERFACE.to_string(),
            listen_port: DEFAULT_PORT,
            greeting_hostname: DEFAULT_HOSTNAME.to_string(),
            log_body: false,
            stats_interval_secs: DEFAULT_STATS_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Load configuration from command-line flags, falling back to the environment.
    ///
    /// Exits the process on `--help`, `--version` or malformed flags.
    pub fn load() -> Result<Self> {
        Self::resolve(CliArgs::parse())
    }

    /// Same as [`Config::load`] but with an explicit argument list.
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::resolve(CliArgs::try_parse_from(args)?)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::resolve(CliArgs::default())
    }

    /// Builds the final configuration. A flag wins over its environment
    /// variable, which is then not read at all, so a malformed env value
    /// cannot fail a run that overrides it.
    pub fn resolve(cli: CliArgs) -> Result<Self> {
        // Load .env file if present (optional)
        let _ = dotenv::dotenv();

        let listen_interface = match cli.interface {
            Some(val) => {
                log::info!("Config: Using listen_interface from flag: {}", val);
                val
            }
            None => string_var("MAIL_SINK_INTERFACE", "listen_interface", DEFAULT_INTERFACE),
        };

        let listen_port = match cli.port {
            Some(port) => port,
            None => match env::var("MAIL_SINK_PORT") {
                Ok(val) => parse_var("MAIL_SINK_PORT", &val)?,
                Err(_) => DEFAULT_PORT,
            },
        };
        log::info!("Config: Using listen_port: {}", listen_port);

        let greeting_hostname = match cli.hostname {
            Some(val) => {
                log::info!("Config: Using greeting_hostname from flag: {}", val);
                val
            }
            None => string_var("MAIL_SINK_HOSTNAME", "greeting_hostname", DEFAULT_HOSTNAME),
        };

        let log_body = if cli.verbose {
            true
        } else {
            match env::var("MAIL_SINK_LOG_BODY") {
                Ok(val) => parse_bool_var("MAIL_SINK_LOG_BODY", &val)?,
                Err(_) => false,
            }
        };
        log::info!("Config: Using log_body: {}", log_body);

        let stats_interval_secs = match cli.stats_interval {
            Some(secs) => secs,
            None => match env::var("MAIL_SINK_STATS_INTERVAL") {
                Ok(val) => parse_var("MAIL_SINK_STATS_INTERVAL", &val)?,
                Err(_) => DEFAULT_STATS_INTERVAL_SECS,
            },
        };
        log::info!("Config: Using stats_interval_secs: {}", stats_interval_secs);

        let config = Config {
            listen_interface,
            listen_port,
            greeting_hostname,
            log_body,
            stats_interval_secs,
        };
        config.validate()?;
        Ok(config)
    }

    /// `interface:port`, ready for `TcpListener::bind`.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listen_interface, self.listen_port)
    }

    fn validate(&self) -> Result<()> {
        if self.stats_interval_secs == 0 {
            bail!("stats interval must be at least one second");
        }
        Ok(())
    }
}

fn string_var(name: &str, field: &str, default: &str) -> String {
    env::var(name)
        .map(|val| {
            log::info!("Config: Using {} from env: {}", field, val);
            val
        })
        .unwrap_or_else(|_| {
            log::info!("Config: Using default {}: {}", field, default);
            default.to_string()
        })
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse::<T>().map_err(|e| {
        let err_msg = format!("{} ('{}') must be a valid number", name, value);
        log::error!("{}: {}", err_msg, e);
        anyhow!(e).context(err_msg)
    })
}

fn parse_bool_var(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => {
            let err_msg = format!("{} ('{}') must be a boolean", name, value);
            log::error!("{}", err_msg);
            Err(anyhow!(err_msg))
        }
    }
}

#[cfg(test)]
mod tests;

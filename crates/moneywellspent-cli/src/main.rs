use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use dialoguer::{Input, Password};
use log::LevelFilter;
use moneywellspent::SpendAggregator;
use moneywellspent::config::{FileConfig, PartialConfig, default_config_path};

#[derive(Parser)]
#[command(name = "moneywellspent")]
#[command(about = "A script to summarize your money spent on Amazon", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long,
        value_name = "LOGIN",
        help = "Specify the username (e-mail) of your Amazon account"
    )]
    login: Option<String>,

    #[arg(
        short = 'p',
        long,
        value_name = "PASSWORD",
        help = "Specify the password of your Amazon account"
    )]
    password: Option<String>,

    #[arg(
        short = 'y',
        long,
        value_name = "YEAR",
        help = "Specify the first year to be summed up"
    )]
    year: Option<i32>,

    #[arg(
        short = 's',
        long,
        value_name = "SITE",
        help = "Specify the site to be queried: [amazon.]de, [amazon.]com, [amazon.]co.uk, [amazon.]fr"
    )]
    site: Option<String>,

    #[arg(
        short = 'c',
        long,
        value_name = "PATH",
        help = "Configuration file (defaults to ~/.moneywellspentrc)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long = "log-level",
        value_enum,
        default_value = "info",
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(short = 'v', long, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short = 'd', long, help = "Enable debug output")]
    debug: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value = "text",
        help = "Output format"
    )]
    format: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    fn level_filter(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else if self.verbose {
            LevelFilter::Info.max(self.log_level.clone().into())
        } else {
            self.log_level.clone().into()
        }
    }

    fn flags(&self) -> PartialConfig {
        PartialConfig {
            site: self.site.clone(),
            login: self.login.clone(),
            password: self.password.clone(),
            year: self.year,
        }
    }
}

/// Asks for every setting neither the flags nor the config file provided.
fn prompt_missing(mut settings: PartialConfig) -> Result<PartialConfig, dialoguer::Error> {
    if settings.site.is_none() {
        log::debug!("No site given, asking");
        settings.site = Some(
            Input::new()
                .with_prompt("Enter the site to be summed up")
                .interact_text()?,
        );
    }
    let site = settings.site.clone().unwrap_or_default();

    if settings.login.is_none() {
        log::debug!("No login given, asking");
        settings.login = Some(
            Input::new()
                .with_prompt(format!("Enter your {site} username"))
                .interact_text()?,
        );
    }
    if settings.password.is_none() {
        log::debug!("No password given, asking");
        settings.password = Some(
            Password::new()
                .with_prompt(format!("Enter your {site} password"))
                .interact()?,
        );
    }
    if settings.year.is_none() {
        log::debug!("No start year given, asking");
        settings.year = Some(
            Input::<i32>::new()
                .with_prompt("Enter the first year to be summed up")
                .interact_text()?,
        );
    }

    Ok(settings)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.level_filter())
        .init();

    let file_settings = match cli.config.clone().or_else(default_config_path) {
        Some(path) => FileConfig::load(&path)
            .unwrap_or_else(|e| {
                log::error!("{}", e);
                process::exit(1);
            })
            .map(|file| file.default)
            .unwrap_or_default(),
        None => PartialConfig::default(),
    };

    let settings = prompt_missing(cli.flags().or(file_settings)).unwrap_or_else(|e| {
        log::error!("Error reading input: {}", e);
        process::exit(1);
    });

    let config = settings.resolve().unwrap_or_else(|e| {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    });

    let summary = SpendAggregator::new().run(&config).await.unwrap_or_else(|e| {
        log::error!("Error summing up orders on {}: {}", config.site, e);
        process::exit(1);
    });

    match cli.format {
        OutputFormat::Json => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                log::error!("Error serializing to JSON: {}", e);
                process::exit(1);
            }
        },
        OutputFormat::Text => println!("{}", summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(args: &[&str]) -> LevelFilter {
        Cli::try_parse_from(args).unwrap().level_filter()
    }

    #[test]
    fn test_level_flags() {
        assert_eq!(level(&["moneywellspent"]), LevelFilter::Info);
        assert_eq!(level(&["moneywellspent", "--log-level", "warn"]), LevelFilter::Warn);
        assert_eq!(
            level(&["moneywellspent", "--log-level", "warn", "-v"]),
            LevelFilter::Info
        );
        assert_eq!(
            level(&["moneywellspent", "--log-level", "trace", "--verbose"]),
            LevelFilter::Trace
        );
        assert_eq!(level(&["moneywellspent", "-v", "-d"]), LevelFilter::Debug);
    }
}

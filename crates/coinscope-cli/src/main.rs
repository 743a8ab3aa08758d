// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow};
use coinscope_api::{AuthClient, MarketClient};
use coinscope_app::AppState;
use coinscope_tui::UiOptions;
use config::Config;
use logging::Verbosity;
use runtime::ApiRuntime;
use std::env;
use std::path::PathBuf;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `coinscope --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    logging::init(
        Verbosity::from_flags(options.verbose, options.quiet),
        config.log_level(),
        &config.log_path()?,
    )?;
    tracing::info!(config = %options.config_path.display(), "starting coinscope");

    let market = MarketClient::new(
        config.market_base_url(),
        config.backend(),
        config.market_timeout()?,
    )
    .with_context(|| {
        format!(
            "invalid [market] config in {}; fix backend/base_url/timeout values",
            options.config_path.display()
        )
    })?;

    let auth = match config.auth_endpoint() {
        Some((url, anon_key)) => Some(
            AuthClient::new(url, anon_key, config.auth_timeout()?).with_context(|| {
                format!(
                    "invalid [auth] config in {}; fix url/anon_key/timeout values",
                    options.config_path.display()
                )
            })?,
        ),
        None => None,
    };

    let ui_options = UiOptions {
        search: config.search_config()?,
        page_size: config.page_size(),
        initial_query: options.search_query.clone(),
    };
    if options.check_only {
        return Ok(());
    }

    let mut state = AppState::default();
    let mut runtime = ApiRuntime::new(market, auth, config.popular_limit());
    let result = coinscope_tui::run_app(&mut state, &mut runtime, &ui_options);
    tracing::info!(ok = result.is_ok(), "coinscope exiting");
    result
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    search_query: Option<String>,
    verbose: bool,
    quiet: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_example: false,
        check_only: false,
        show_help: false,
        search_query: None,
        verbose: false,
        quiet: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--search" | "-s" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--search requires a query"))?;
                options.search_query = Some(value.as_ref().to_owned());
            }
            "--print-config-path" => options.print_config_path = true,
            "--print-example-config" => options.print_example = true,
            "--check" => options.check_only = true,
            "--verbose" | "-v" => options.verbose = true,
            "--quiet" | "-q" => options.quiet = true,
            "--help" | "-h" => options.show_help = true,
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("coinscope: incremental coin search in the terminal");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config and client setup, then exit");
    println!("  -s, --search <query>     Start with <query> typed into the search box");
    println!("  -v, --verbose            Log at debug level");
    println!("  -q, --quiet              Log errors only");
    println!("  -h, --help               Show this help");
    println!();
    println!("Logs go to [log] path; COINSCOPE_LOG or RUST_LOG override the level.");
}


#[cfg(test)]
mod tests {
    use super::{CliOptions, parse_cli_args};
    use anyhow::Result;
    use std::path::PathBuf;

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/coinscope-config.toml")
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                print_config_path: false,
                print_example: false,
                check_only: false,
                show_help: false,
                search_query: None,
                verbose: false,
                quiet: false,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_config_path_override() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/config.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_values() {
        let error = parse_cli_args(vec!["--config"], default_options_path())
            .expect_err("missing config value should fail");
        assert!(error.to_string().contains("--config requires a file path"));

        let error = parse_cli_args(vec!["--search"], default_options_path())
            .expect_err("missing query should fail");
        assert!(error.to_string().contains("--search requires a query"));
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_argument() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown arg should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn parse_cli_args_keeps_search_query_verbatim() -> Result<()> {
        let options = parse_cli_args(vec!["-s", "  bit coin "], default_options_path())?;
        assert_eq!(options.search_query.as_deref(), Some("  bit coin "));

        let options = parse_cli_args(vec!["--search", "eth"], default_options_path())?;
        assert_eq!(options.search_query.as_deref(), Some("eth"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_print_and_check_flags() -> Result<()> {
        let options = parse_cli_args(
            vec!["--print-config-path", "--print-example-config", "--check"],
            default_options_path(),
        )?;
        assert!(options.print_config_path);
        assert!(options.print_example);
        assert!(options.check_only);
        assert!(!options.show_help);
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_verbosity_flags() -> Result<()> {
        let options = parse_cli_args(vec!["-v", "--quiet"], default_options_path())?;
        assert!(options.verbose);
        assert!(options.quiet);

        let options = parse_cli_args(vec!["--verbose"], default_options_path())?;
        assert!(options.verbose);
        assert!(!options.quiet);
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_help_flag_for_long_and_short_variants() -> Result<()> {
        let long = parse_cli_args(vec!["--help"], default_options_path())?;
        assert!(long.show_help);

        let short = parse_cli_args(vec!["-h"], default_options_path())?;
        assert!(short.show_help);
        Ok(())
    }
}

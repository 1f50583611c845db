#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]

mod logging;
mod report;

use clap::Parser;
use miette::Result;
use pbundle_core::{
    pipeline, read_manifest_specs, Auth, BundleConfig, HttpOptions, PackageSpec, Severity,
};
use report::LogObserver;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pbundle")]
#[command(author, version)]
#[command(about = "Create a bundle of packages including their dependencies in archive format")]
struct Cli {
    /// Packages in the format [@scope/]<pkg>[@<tag | version | range>];
    /// omit to read the dependency maps from ./package.json
    packages: Vec<String>,

    /// Include dev dependencies (root manifest only)
    #[arg(short = 'd', long)]
    dev: bool,

    /// Include optional dependencies (root manifest only)
    #[arg(short = 'o', long)]
    optional: bool,

    /// Also expand dev dependencies of transitive dependencies
    #[arg(long)]
    dev_recursive: bool,

    /// Also expand optional dependencies of transitive dependencies
    #[arg(long)]
    optional_recursive: bool,

    /// Save in a flat file structure, instead of individual folders
    #[arg(short = 'f', long)]
    flat: bool,

    /// Leave dependencies in a folder, and don't archive
    #[arg(short = 'z', long = "no-archive")]
    no_archive: bool,

    /// Don't use the cache file to avoid repeat downloads
    #[arg(short = 'x', long = "no-cache")]
    no_cache: bool,

    /// Output file name
    #[arg(long, value_name = "FILE")]
    out_file: Option<PathBuf>,

    /// Download all versions of the specified packages
    #[arg(short = 'a', long)]
    all_versions: bool,

    /// Download all versions of the specified packages and their dependencies
    #[arg(short = 'A', long)]
    all_versions_recursive: bool,

    /// Number of requests to make at the same time
    #[arg(short = 'c', long, value_name = "N")]
    concurrency: Option<usize>,

    /// Alternate registry base URL
    #[arg(short = 'r', long, value_name = "URL")]
    registry: Option<String>,

    /// Outbound HTTP(S) proxy
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,

    /// Basic auth credentials (base64-encoded user:pass)
    #[arg(long, value_name = "BASE64", conflicts_with = "auth_token")]
    basic_auth: Option<String>,

    /// Bearer auth token
    #[arg(long, value_name = "TOKEN")]
    auth_token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(short = 'k', long)]
    insecure: bool,

    /// Override the working directory
    #[arg(long, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON formatted logs
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn into_config(self) -> (BundleConfig, Vec<String>) {
        let auth = match (self.basic_auth, self.auth_token) {
            (Some(payload), _) => Some(Auth::Basic(payload)),
            (None, Some(token)) => Some(Auth::Token(token)),
            (None, None) => None,
        };

        let config = BundleConfig {
            working_dir: self.cwd.unwrap_or_else(|| PathBuf::from(".")),
            include_dev: self.dev,
            include_optional: self.optional,
            include_dev_recursive: self.dev_recursive,
            include_optional_recursive: self.optional_recursive,
            flat: self.flat,
            archive: !self.no_archive,
            use_cache: !self.no_cache,
            out_file: self.out_file,
            all_versions: self.all_versions,
            all_versions_recursive: self.all_versions_recursive,
            concurrency: self.concurrency,
            http: HttpOptions {
                registry: self.registry,
                proxy: self.proxy,
                auth,
                insecure: self.insecure,
            },
        };

        (config, self.packages)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    let (config, packages) = cli.into_config();

    let specs = gather_specs(&config, &packages)?;

    let observer = LogObserver::default();

    match pipeline::run(&config, &specs, &observer).await {
        Ok(summary) => {
            let downloaded = summary.downloaded;
            let total_bytes = summary.total_bytes;
            match (summary.archive, summary.staged) {
                (Some(path), _) => {
                    tracing::info!(
                        "Bundled {downloaded} packages ({total_bytes} bytes) into \"{}\"",
                        path.display()
                    );
                }
                (None, Some(dir)) => {
                    tracing::info!(
                        "Downloaded {downloaded} packages ({total_bytes} bytes) to \"{}\"",
                        dir.display()
                    );
                }
                (None, None) => {
                    tracing::info!("Downloaded {downloaded} packages ({total_bytes} bytes)");
                }
            }
            Ok(())
        }
        // Informational stops (nothing left to download) exit cleanly.
        Err(err) if err.severity() == Severity::Info => {
            tracing::info!("{}", err.message());
            Ok(())
        }
        Err(err) => Err(miette::miette!(code = err.code(), "{}", err.message())),
    }
}

/// Parse command-line specifiers, falling back to the local manifest when
/// none were given.
fn gather_specs(config: &BundleConfig, packages: &[String]) -> Result<Vec<PackageSpec>> {
    if packages.is_empty() {
        let manifest = config.manifest_file();
        return read_manifest_specs(&manifest, config.include_dev, config.include_optional)
            .map_err(|err| {
                miette::miette!(
                    code = err.code(),
                    help = "pass one or more package specifiers, or run in a directory with a package.json",
                    "{}",
                    err.message()
                )
            });
    }

    packages
        .iter()
        .map(|raw| {
            PackageSpec::parse(raw)
                .map_err(|err| miette::miette!(code = err.code(), "{}", err.message()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["pbundle", "react"]).unwrap();
        let (config, packages) = cli.into_config();

        assert_eq!(packages, vec!["react"]);
        assert!(config.archive);
        assert!(config.use_cache);
        assert!(!config.flat);
        assert!(!config.include_dev_recursive);
        assert_eq!(config.concurrency, None);
    }

    #[test]
    fn test_cli_negating_flags() {
        let cli = Cli::try_parse_from(["pbundle", "react", "-z", "-x"]).unwrap();
        let (config, _) = cli.into_config();
        assert!(!config.archive);
        assert!(!config.use_cache);
    }

    #[test]
    fn test_cli_all_versions_flags() {
        let cli = Cli::try_parse_from(["pbundle", "react", "-a"]).unwrap();
        let (config, _) = cli.into_config();
        assert!(config.all_versions);
        assert!(!config.all_versions_recursive);

        let cli = Cli::try_parse_from(["pbundle", "react", "-A"]).unwrap();
        let (config, _) = cli.into_config();
        assert!(config.all_versions_recursive);
    }

    #[test]
    fn test_cli_auth_conflict() {
        let result = Cli::try_parse_from([
            "pbundle",
            "react",
            "--basic-auth",
            "dXNlcjpwYXNz",
            "--auth-token",
            "tok",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_transport_options() {
        let cli = Cli::try_parse_from([
            "pbundle",
            "react",
            "-r",
            "https://registry.example.com",
            "--proxy",
            "http://proxy:8080",
            "-k",
            "-c",
            "10",
        ])
        .unwrap();
        let (config, _) = cli.into_config();

        assert_eq!(
            config.http.registry.as_deref(),
            Some("https://registry.example.com")
        );
        assert_eq!(config.http.proxy.as_deref(), Some("http://proxy:8080"));
        assert!(config.http.insecure);
        assert_eq!(config.concurrency, Some(10));
    }
}

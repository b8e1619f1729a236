//! shipwright - release pipeline CLI
//!
//! ## Commands
//!
//! - `compile`: Compile the release binary and export it
//! - `build-image`: Build the runtime container image
//! - `check-version`: Fail if the manifest version was already released
//! - `release`: Check, build, release on GitHub and push the image
//! - `lint` / `fmt`: Source checks run before a release

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use shipwright_ci::{
    ArtifactBuilder, BuiltinCheck, CheckConfig, DockerEngine, RegistryAuth, ReleaseCoordinator,
};
use shipwright_core::{read_package_name, read_version_file, GitHubClient, ReleaseConfig, Secret};

#[derive(Parser)]
#[command(name = "shipwright")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, release and publish a Rust project", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Source tree containing the manifest
    #[arg(long, global = true, default_value = ".")]
    source: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides applied on top of defaults and `SHIPWRIGHT_*` variables.
#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Repository owner
    #[arg(long, global = true)]
    owner: Option<String>,

    /// Repository name
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Product name (default: package.name from the manifest)
    #[arg(long, global = true)]
    product: Option<String>,

    /// Branch the release tag points at
    #[arg(long, global = true)]
    main_branch: Option<String>,

    /// Container registry host
    #[arg(long, global = true)]
    registry: Option<String>,

    /// Image repository inside the registry (default: owner/repo)
    #[arg(long, global = true)]
    image: Option<String>,

    /// Rust target triple of the released binary
    #[arg(long, global = true)]
    target: Option<String>,

    /// Container engine executable
    #[arg(long, global = true)]
    engine: Option<String>,

    /// Manifest path relative to the source tree
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Directory the exported binary is written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Timeout for each external command in seconds (0 = none)
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the release binary and export it to the output directory
    Compile,

    /// Build the runtime image
    BuildImage,

    /// Check the manifest version against existing tags
    CheckVersion {
        /// GitHub token
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: String,
    },

    /// Run the full release pipeline
    Release {
        /// GitHub token
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: String,

        /// Registry username
        #[arg(long, env = "SHIPWRIGHT_REGISTRY_USER")]
        registry_user: String,

        /// Registry token (default: the GitHub token)
        #[arg(long, env = "SHIPWRIGHT_REGISTRY_TOKEN", hide_env_values = true)]
        registry_token: Option<String>,
    },

    /// Run cargo clippy with warnings denied
    Lint,

    /// Check formatting with cargo fmt
    Fmt,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    shipwright_core::init_tracing(cli.json, level);

    let source = cli.source.as_path();
    match cli.command {
        Commands::Lint => cmd_check(source, BuiltinCheck::CargoClippy, &cli.config).await,
        Commands::Fmt => cmd_check(source, BuiltinCheck::CargoFmt, &cli.config).await,
        Commands::Compile => {
            let config = resolve_config(&cli.config, source).await?;
            cmd_compile(&config, source).await
        }
        Commands::BuildImage => {
            let config = resolve_config(&cli.config, source).await?;
            cmd_build_image(&config, source).await
        }
        Commands::CheckVersion { github_token } => {
            let config = resolve_config(&cli.config, source).await?;
            cmd_check_version(&config, source, Secret::new(github_token)).await
        }
        Commands::Release {
            github_token,
            registry_user,
            registry_token,
        } => {
            let config = resolve_config(&cli.config, source).await?;
            let registry_token =
                Secret::new(registry_token.unwrap_or_else(|| github_token.clone()));
            cmd_release(
                &config,
                source,
                Secret::new(github_token),
                &registry_user,
                registry_token,
            )
            .await
        }
    }
}

/// Apply CLI overrides to a config loaded from the environment.
fn apply_overrides(mut config: ReleaseConfig, args: &ConfigArgs) -> ReleaseConfig {
    let strings = [
        (&args.owner, &mut config.owner),
        (&args.repo, &mut config.repo),
        (&args.product, &mut config.product),
        (&args.main_branch, &mut config.main_branch),
        (&args.registry, &mut config.registry),
        (&args.image, &mut config.image_repository),
        (&args.target, &mut config.target),
        (&args.engine, &mut config.engine),
    ];
    for (value, field) in strings {
        if let Some(value) = value {
            *field = value.clone();
        }
    }
    if let Some(manifest) = &args.manifest {
        config.manifest_path = manifest.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.clone();
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    config
}

/// Build the effective config: defaults, environment, flags, then the
/// product name from the manifest when none was given.
async fn resolve_config(args: &ConfigArgs, source: &Path) -> Result<ReleaseConfig> {
    let mut config = apply_overrides(ReleaseConfig::from_env(), args);

    if config.product.is_empty() {
        let manifest_path = source.join(&config.manifest_path);
        let manifest = tokio::fs::read_to_string(&manifest_path)
            .await
            .with_context(|| format!("Failed to read manifest: {:?}", manifest_path))?;
        config.product = read_package_name(&manifest)
            .with_context(|| format!("Failed to read package name from {:?}", manifest_path))?;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn engine(config: &ReleaseConfig) -> DockerEngine {
    DockerEngine::new(&config.engine, config.timeout_secs)
}

/// Run a builtin source check in the source tree
async fn cmd_check(source: &Path, check: BuiltinCheck, args: &ConfigArgs) -> Result<()> {
    let timeout = apply_overrides(ReleaseConfig::from_env(), args).timeout_secs;
    let output = CheckConfig::from_builtin(check, timeout)
        .run(source)
        .await
        .with_context(|| format!("{} failed", check.name()))?;

    println!("✓ {} passed ({}ms)", check.name(), output.duration_ms);
    Ok(())
}

/// Compile the binary and export it
async fn cmd_compile(config: &ReleaseConfig, source: &Path) -> Result<()> {
    let engine = engine(config);
    let path = ArtifactBuilder::new(config, &engine)
        .compile_binary(source)
        .await
        .context("Failed to compile binary")?;

    println!("Binary: {}", path.display());
    Ok(())
}

/// Build the runtime image, labelled with the manifest version
async fn cmd_build_image(config: &ReleaseConfig, source: &Path) -> Result<()> {
    let version = read_version_file(&source.join(&config.manifest_path)).await?;
    let engine = engine(config);
    let builder = ArtifactBuilder::new(config, &engine);

    let labels = builder.base_labels().with_version(version.as_str());
    let image = builder
        .build_runtime_image(source, labels)
        .await
        .context("Failed to build runtime image")?;

    println!("Image: {}", image.id);
    println!("Version: {}", version);
    Ok(())
}

/// Check the manifest version against the repository's tags
async fn cmd_check_version(config: &ReleaseConfig, source: &Path, token: Secret) -> Result<()> {
    let host = GitHubClient::authenticate(config, token).context("Failed to set up GitHub client")?;
    let engine = engine(config);

    let version = ReleaseCoordinator::new(config, &host, &engine)
        .check_version_conflict(source)
        .await?;

    info!(%version, "version has not been released");
    println!("{}", version);
    Ok(())
}

/// Run the full release
async fn cmd_release(
    config: &ReleaseConfig,
    source: &Path,
    github_token: Secret,
    registry_user: &str,
    registry_token: Secret,
) -> Result<()> {
    let host =
        GitHubClient::authenticate(config, github_token).context("Failed to set up GitHub client")?;
    let engine = engine(config);
    let auth = RegistryAuth {
        registry: config.registry.clone(),
        username: registry_user.to_string(),
        token: registry_token,
    };

    println!(
        "Releasing {}/{} from {:?}",
        config.owner, config.repo, source
    );
    let outcome = ReleaseCoordinator::new(config, &host, &engine)
        .release(source, &auth)
        .await?;

    println!();
    println!("Version: {}", outcome.version);
    println!("Release: {} ({})", outcome.tag, outcome.release.html_url);
    println!("Asset:   {} (sha256 {})", outcome.asset.name, outcome.asset.sha256);
    for image in &outcome.images {
        match &image.digest {
            Some(digest) => println!("Image:   {} ({})", image.reference, digest),
            None => println!("Image:   {}", image.reference),
        }
    }
    println!();
    for record in &outcome.stages {
        println!("  ✓ {} ({}ms)", record.stage, record.duration_ms);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_release_parses_credentials() {
        let cli = Cli::try_parse_from([
            "shipwright",
            "release",
            "--github-token",
            "t",
            "--registry-user",
            "kerwood",
        ])
        .unwrap();
        match cli.command {
            Commands::Release {
                registry_user,
                registry_token,
                ..
            } => {
                assert_eq!(registry_user, "kerwood");
                assert_eq!(registry_token, None);
            }
            _ => panic!("expected release command"),
        }
    }

    #[test]
    fn test_global_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "shipwright",
            "compile",
            "--owner",
            "kerwood",
            "--timeout",
            "30",
        ])
        .unwrap();
        assert_eq!(cli.config.owner.as_deref(), Some("kerwood"));
        assert_eq!(cli.config.timeout, Some(30));
    }

    #[test]
    fn test_apply_overrides() {
        let args = ConfigArgs {
            owner: Some("kerwood".to_string()),
            repo: Some("confluence-updater".to_string()),
            image: Some("kerwood/cu".to_string()),
            output_dir: Some(PathBuf::from("dist")),
            timeout: Some(120),
            ..ConfigArgs::default()
        };
        let config = apply_overrides(ReleaseConfig::default(), &args);

        assert_eq!(config.owner, "kerwood");
        assert_eq!(config.repo, "confluence-updater");
        assert_eq!(config.image_repository, "kerwood/cu");
        assert_eq!(config.output_dir, PathBuf::from("dist"));
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.registry, "ghcr.io");
    }

    #[test]
    fn test_timeout_layers_env_under_flag() {
        std::env::set_var("SHIPWRIGHT_TIMEOUT_SECS", "77");
        let from_env = apply_overrides(ReleaseConfig::from_env(), &ConfigArgs::default());
        let from_flag = apply_overrides(
            ReleaseConfig::from_env(),
            &ConfigArgs {
                timeout: Some(45),
                ..ConfigArgs::default()
            },
        );
        std::env::remove_var("SHIPWRIGHT_TIMEOUT_SECS");

        assert_eq!(from_env.timeout_secs, 77);
        assert_eq!(from_flag.timeout_secs, 45);
    }

    #[tokio::test]
    async fn test_resolve_config_reads_product_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"confluence-updater\"\nversion = \"2.0.1\"\n",
        )
        .unwrap();
        let args = ConfigArgs {
            owner: Some("kerwood".to_string()),
            repo: Some("confluence-updater".to_string()),
            product: None,
            ..ConfigArgs::default()
        };

        let config = resolve_config(&args, dir.path()).await.unwrap();
        assert_eq!(config.product, "confluence-updater");
    }

    #[tokio::test]
    async fn test_resolve_config_without_owner_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = ConfigArgs {
            repo: Some("r".to_string()),
            product: Some("p".to_string()),
            owner: Some(String::new()),
            ..ConfigArgs::default()
        };
        assert!(resolve_config(&args, dir.path()).await.is_err());
    }
}

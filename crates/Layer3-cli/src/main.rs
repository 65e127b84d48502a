//! FeatureForge CLI - Main entry point

mod cli;

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use feature_core::StateId;
use feature_foundation::FeatureConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Plan;

/// featurectl - drive feature plugins through their lifecycle
#[derive(Parser, Debug)]
#[command(name = "featurectl")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Base URL of the `web:` plugin distribution server
    #[arg(long, global = true)]
    web_base_url: Option<String>,

    /// Directory where `web:` plugins are unpacked
    #[arg(long, global = true)]
    install_dir: Option<PathBuf>,

    /// Wait for dependencies instead of driving them to Registered
    #[arg(long, global = true)]
    no_drive_deps: bool,
}

#[derive(ClapArgs, Debug)]
struct Targets {
    /// Plugin URLs (`file:<path>.uplugin` or `web:<key>`)
    #[arg(required = true)]
    urls: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether plugins are available
    Status(Targets),
    /// Download plugins (file: plugins are verified in place)
    Install(Targets),
    /// Mount and register plugins (and their dependencies)
    Register(Targets),
    /// Load plugins
    Load(Targets),
    /// Load and activate plugins
    Activate(Targets),
    /// Activate, then deactivate back to Loaded
    Deactivate(Targets),
    /// Load, then unload back to Registered
    Unload(Targets),
    /// Register, then unregister back to Installed
    Unregister(Targets),
    /// Install, then uninstall back to StatusKnown
    Uninstall(Targets),
}

impl Command {
    /// 명령 → (준비 단계, 목적지) + 대상 URL
    ///
    /// 프로세스마다 머신이 새로 만들어지므로 역방향 명령은
    /// 먼저 위 단계까지 올린 뒤 내려옵니다.
    fn into_plan(self) -> (Plan, Vec<String>) {
        let (plan, targets) = match self {
            Command::Status(t) => (Plan::to(StateId::StatusKnown), t),
            Command::Install(t) => (Plan::to(StateId::Installed), t),
            Command::Register(t) => (Plan::to(StateId::Registered), t),
            Command::Load(t) => (Plan::to(StateId::Loaded), t),
            Command::Activate(t) => (Plan::to(StateId::Active), t),
            Command::Deactivate(t) => (Plan::via(StateId::Active, StateId::Loaded), t),
            Command::Unload(t) => (Plan::via(StateId::Loaded, StateId::Registered), t),
            Command::Unregister(t) => (Plan::via(StateId::Registered, StateId::Installed), t),
            Command::Uninstall(t) => (Plan::via(StateId::Installed, StateId::StatusKnown), t),
        };
        (plan, targets.urls)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = FeatureConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        FeatureConfig::new()
    });
    apply_overrides(&mut config, &args);

    let (plan, urls) = args.command.into_plan();
    let all_ok = cli::run(&config, plan, &urls).await?;

    if !all_ok {
        std::process::exit(1);
    }
    Ok(())
}

/// CLI 플래그가 설정 파일 값을 덮어씀
fn apply_overrides(config: &mut FeatureConfig, args: &Args) {
    if let Some(url) = &args.web_base_url {
        config.web_base_url = Some(url.clone());
    }
    if let Some(dir) = &args.install_dir {
        config.install_dir = Some(dir.clone());
    }
    if args.no_drive_deps {
        config.drive_dependencies = Some(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_forward_command_plan() {
        let args = parse(&["featurectl", "activate", "file:/p/Foo/Foo.uplugin", "web:Bar"]);
        let (plan, urls) = args.command.into_plan();

        assert_eq!(plan.phases(), vec![StateId::Active]);
        assert_eq!(urls, vec!["file:/p/Foo/Foo.uplugin", "web:Bar"]);
    }

    #[test]
    fn test_reverse_command_goes_up_first() {
        let (plan, _) = parse(&["featurectl", "uninstall", "web:Bar"]).command.into_plan();
        assert_eq!(plan.phases(), vec![StateId::Installed, StateId::StatusKnown]);

        let (plan, _) = parse(&["featurectl", "deactivate", "web:Bar"]).command.into_plan();
        assert_eq!(plan.phases(), vec![StateId::Active, StateId::Loaded]);
    }

    #[test]
    fn test_urls_required() {
        assert!(Args::try_parse_from(["featurectl", "load"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "featurectl",
            "--no-drive-deps",
            "install",
            "--web-base-url",
            "https://cdn.example.com/plugins",
            "--install-dir",
            "/tmp/plugins",
            "web:Bar",
        ]);
        let mut config = FeatureConfig::new().with_drive_dependencies(true);
        apply_overrides(&mut config, &args);

        assert!(!config.drive_dependencies());
        assert_eq!(config.web_base_url.as_deref(), Some("https://cdn.example.com/plugins"));
        assert_eq!(config.install_dir(), PathBuf::from("/tmp/plugins"));
    }
}

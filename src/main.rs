use anyhow::Result;
use clap::{Parser, Subcommand};
use oxide_shelf::{AppError, Config, ShortcutShell, config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    version,
    about = "Replace desktop shortcut icons with color-matched book icons."
)]
struct Cli {
    #[command(subcommand)]
    action: Action,

    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the shortcuts
    #[arg(long, global = true)]
    desktop: Option<PathBuf>,

    /// Book template image
    #[arg(long, global = true)]
    template: Option<PathBuf>,

    /// Backup file of original icon locations
    #[arg(long, global = true)]
    backup: Option<PathBuf>,

    /// Directory for generated icons
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Log debug details
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Action {
    /// Change shortcut icons to books
    Apply,
    /// Restore original icons from the backup
    Revert,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = build_config(&cli)?;

    println!("Template path: {}", config.template_path.display());
    println!("Desktop path: {}", config.desktop_dir.display());
    println!("Backup file: {}", config.backup_file.display());
    println!("Generated icons directory: {}", config.generated_dir.display());

    let shell = default_shell()?;
    match cli.action {
        Action::Apply => run_apply(&config, &shell)?,
        Action::Revert => run_revert(&config, &shell),
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<Config, AppError> {
    let mut config = match cli.config.clone().or_else(config::find_config) {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    if let Some(desktop) = &cli.desktop {
        config.desktop_dir = desktop.clone();
    }
    if let Some(template) = &cli.template {
        config.template_path = template.clone();
    }
    if let Some(backup) = &cli.backup {
        config.backup_file = backup.clone();
    }
    if let Some(output) = &cli.output {
        config.generated_dir = output.clone();
    }

    config.validate()?;
    config.absolutized()
}

#[cfg(windows)]
fn default_shell() -> Result<oxide_shelf::shortcut::WindowsShell, AppError> {
    Ok(oxide_shelf::shortcut::WindowsShell::new())
}

#[cfg(not(windows))]
fn default_shell() -> Result<NoShell, AppError> {
    Err(AppError::ShellUnavailable(
        "desktop shortcuts can only be edited on Windows".into(),
    ))
}

#[cfg(not(windows))]
enum NoShell {}

#[cfg(not(windows))]
impl ShortcutShell for NoShell {
    fn read_shortcut(
        &self,
        _lnk: &std::path::Path,
    ) -> Result<oxide_shelf::ShortcutInfo, oxide_shelf::error::ShellError> {
        match *self {}
    }

    fn set_icon(
        &self,
        _lnk: &std::path::Path,
        _icon: &oxide_shelf::IconRef,
    ) -> Result<(), oxide_shelf::error::ShellError> {
        match *self {}
    }
}

fn run_apply<S: ShortcutShell>(config: &Config, shell: &S) -> Result<(), AppError> {
    let summary = oxide_shelf::apply(config, shell)?;
    if summary.found == 0 {
        println!("No shortcuts found on the desktop.");
        return Ok(());
    }

    println!("\nFinished applying icons.");
    println!("  {} icons successfully changed.", summary.processed);
    println!(
        "  {} icons skipped (see log for reasons).",
        summary.skipped
    );
    if let Some(dir) = config.backup_file.parent() {
        println!("Original icon info backed up in: {}", dir.display());
    }
    Ok(())
}

fn run_revert<S: ShortcutShell>(config: &Config, shell: &S) {
    let summary = oxide_shelf::revert(config, shell);
    if summary.entries == 0 {
        println!("No backup data found. Cannot revert.");
        return;
    }

    println!("\nFinished reverting icons.");
    println!("  {} icons reverted.", summary.reverted);
    println!("  {} icons failed (see log).", summary.failed);
}

//! Apply and revert runs over every desktop shortcut.

use crate::analyzer::dominant_color;
use crate::compositor::Compositor;
use crate::config::Config;
use crate::error::{AppError, ComposeError, Stage, StageError};
use crate::icon_extractor::extract_icon;
use crate::icon_ref::IconRef;
use crate::ledger::{Ledger, Recorded};
use crate::shortcut::{self, ShortcutShell, display_name, find_shortcuts, generated_icon_name};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub found: usize,
    pub processed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevertSummary {
    pub entries: usize,
    pub reverted: usize,
    pub failed: usize,
}

/// Give every desktop shortcut a book icon in its own color.
///
/// Only a missing or unreadable template aborts the run. Any other failure
/// skips the shortcut it happened to.
pub fn apply<S: ShortcutShell>(config: &Config, shell: &S) -> Result<ApplySummary, AppError> {
    tracing::info!("starting book icon application");

    config.validate()?;
    let config = &config.absolutized()?;
    let compositor = Compositor::from_config(config).map_err(|e| match e {
        ComposeError::TemplateMissing(path) => AppError::TemplateMissing(path),
        other => AppError::Template(other),
    })?;
    fs::create_dir_all(&config.generated_dir)?;

    let shortcuts = find_shortcuts(&config.desktop_dir);
    let mut summary = ApplySummary {
        found: shortcuts.len(),
        ..Default::default()
    };
    if shortcuts.is_empty() {
        tracing::warn!(desktop = %config.desktop_dir.display(), "no shortcuts found");
        return Ok(summary);
    }

    let mut ledger = Ledger::load(&config.backup_file);

    for lnk in &shortcuts {
        let name = display_name(lnk);
        tracing::info!(shortcut = %name, "processing shortcut");

        match apply_one(lnk, config, shell, &compositor, &mut ledger) {
            Ok(icon) => {
                tracing::info!(shortcut = %name, icon = %icon.display(), "icon applied");
                summary.processed += 1;
            }
            Err(e) => {
                tracing::warn!(shortcut = %name, stage = %e.stage, "skipping: {}", e.source);
                summary.skipped += 1;
            }
        }
    }

    if let Err(e) = ledger.save() {
        tracing::error!(path = %ledger.path().display(), "error saving backup: {}", e);
    }
    if summary.processed > 0 {
        shell.notify_changed();
    }

    tracing::info!(
        processed = summary.processed,
        skipped = summary.skipped,
        "finished applying icons"
    );
    Ok(summary)
}

fn apply_one<S: ShortcutShell>(
    lnk: &Path,
    config: &Config,
    shell: &S,
    compositor: &Compositor,
    ledger: &mut Ledger,
) -> Result<PathBuf, StageError> {
    let info = shell
        .read_shortcut(lnk)
        .map_err(|e| StageError::new(Stage::ReadOriginal, e))?;
    let current =
        shortcut::current_icon(lnk, &info).map_err(|e| StageError::new(Stage::ReadOriginal, e))?;
    let source = original_icon(lnk, current, &config.generated_dir, ledger);

    let bitmap = extract_icon(&source).map_err(|e| StageError::new(Stage::Extract, e))?;
    let color = dominant_color(&bitmap, config).map_err(|e| StageError::new(Stage::Analyze, e))?;
    tracing::info!(shortcut = %display_name(lnk), rgb = ?color.0, "dominant color found");

    let dest = config.generated_dir.join(generated_icon_name(lnk));
    compositor
        .write_icon(color, &dest)
        .map_err(|e| StageError::new(Stage::Composite, e))?;

    shell
        .set_icon(lnk, &IconRef::new(&dest, 0))
        .map_err(|e| StageError::new(Stage::Apply, e))?;
    Ok(dest)
}

/// The icon to take the color from, recording it in the ledger when it is
/// a genuine original.
///
/// A shortcut already showing one of our generated icons keeps its ledger
/// entry, and that stored original is used as the source.
fn original_icon(
    lnk: &Path,
    current: IconRef,
    generated_dir: &Path,
    ledger: &mut Ledger,
) -> IconRef {
    let name = display_name(lnk);

    if current.is_inside(generated_dir) {
        return match ledger.original(lnk) {
            Some(original) => {
                tracing::debug!(shortcut = %name, original = %original, "already a book icon");
                original
            }
            None => {
                tracing::warn!(shortcut = %name, "shows a generated icon but has no backup");
                current
            }
        };
    }

    match ledger.record(lnk, &current) {
        Recorded::Added | Recorded::Updated => {
            tracing::info!(shortcut = %name, original = %current, "backed up original icon");
        }
        Recorded::Unchanged => {
            tracing::debug!(shortcut = %name, "original icon already backed up");
        }
    }
    current
}

/// Restore every shortcut in the ledger to its recorded icon.
pub fn revert<S: ShortcutShell>(config: &Config, shell: &S) -> RevertSummary {
    tracing::info!("starting icon reversion");

    let ledger = Ledger::load(&config.backup_file);
    let mut summary = RevertSummary {
        entries: ledger.len(),
        ..Default::default()
    };
    if ledger.is_empty() {
        tracing::warn!(path = %ledger.path().display(), "no backup data found");
        return summary;
    }

    for (lnk, original) in ledger.iter() {
        let name = display_name(&lnk);
        if !lnk.exists() {
            tracing::warn!(shortcut = %lnk.display(), "shortcut no longer exists");
            summary.failed += 1;
            continue;
        }

        match shell.set_icon(&lnk, &original) {
            Ok(()) => {
                tracing::info!(shortcut = %name, icon = %original, "reverted icon");
                summary.reverted += 1;
            }
            Err(e) => {
                tracing::error!(shortcut = %name, "failed to revert: {}", e);
                summary.failed += 1;
            }
        }
    }

    if summary.reverted > 0 {
        shell.notify_changed();
    }
    tracing::info!(
        reverted = summary.reverted,
        failed = summary.failed,
        "reversion finished"
    );
    summary
}

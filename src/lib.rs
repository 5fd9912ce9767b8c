//! OxideShelf - recolor desktop shortcut icons as books
//!
//! Each shortcut's current icon is decoded, its dominant color picked, and a
//! book template painted in that color is written as a multi-size `.ico` and
//! assigned to the shortcut. Originals are kept in a JSON backup so a run can
//! be reverted.

pub mod analyzer;
pub mod color;
pub mod compositor;
pub mod config;
pub mod error;
pub mod icon_extractor;
pub mod icon_ref;
pub mod ledger;
pub mod orchestrator;
pub mod shortcut;

pub use config::Config;
pub use error::AppError;
pub use icon_ref::IconRef;
pub use orchestrator::{ApplySummary, RevertSummary, apply, revert};
pub use shortcut::{ShortcutInfo, ShortcutShell};

use crate::error::ShellError;
use crate::icon_ref::IconRef;
use std::fs;
use std::path::{Path, PathBuf};

/// What the shell reports about a `.lnk` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortcutInfo {
    /// Explicit icon override, if the shortcut has one
    pub icon_location: Option<IconRef>,
    pub target_path: Option<String>,
}

/// Read and update desktop shortcuts.
pub trait ShortcutShell {
    fn read_shortcut(&self, lnk: &Path) -> Result<ShortcutInfo, ShellError>;

    fn set_icon(&self, lnk: &Path, icon: &IconRef) -> Result<(), ShellError>;

    /// Tell the desktop that icons changed.
    fn notify_changed(&self) {}
}

/// All `.lnk` files directly inside `dir`, sorted by path.
pub fn find_shortcuts(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(path = %dir.display(), "cannot list desktop: {}", e);
            return Vec::new();
        }
    };

    let mut shortcuts: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("lnk"))
        })
        .collect();
    shortcuts.sort();
    shortcuts
}

/// Icon the shortcut currently shows: its explicit override, or else its
/// target when that target exists.
pub fn current_icon(lnk: &Path, info: &ShortcutInfo) -> Result<IconRef, ShellError> {
    if let Some(icon) = info
        .icon_location
        .as_ref()
        .filter(|icon| !icon.path.as_os_str().is_empty())
    {
        return Ok(icon.expanded());
    }

    match info.target_path.as_deref().filter(|t| !t.is_empty()) {
        Some(target) if Path::new(target).exists() => {
            tracing::info!(
                shortcut = %display_name(lnk),
                target_path = target,
                "no explicit icon set, using target"
            );
            Ok(IconRef::new(target, 0))
        }
        _ => Err(ShellError::NoIcon(lnk.to_path_buf())),
    }
}

pub fn display_name(lnk: &Path) -> String {
    lnk.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| lnk.display().to_string())
}

/// `book_<name>.ico`, where `<name>` is the shortcut's file stem with
/// everything but letters, digits, spaces and underscores removed.
pub fn generated_icon_name(lnk: &Path) -> String {
    let stem = lnk
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let safe: String = stem
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect();
    format!("book_{}.ico", safe.trim_end())
}

#[cfg(windows)]
pub use self::windows_shell::WindowsShell;

#[cfg(windows)]
mod windows_shell {
    use super::{ShortcutInfo, ShortcutShell};
    use crate::error::ShellError;
    use crate::icon_ref::IconRef;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;
    use windows::Win32::Foundation::TRUE;
    use windows::Win32::Storage::FileSystem::WIN32_FIND_DATAW;
    use windows::Win32::System::Com::{
        CLSCTX_INPROC_SERVER, COINIT_APARTMENTTHREADED, CoCreateInstance, CoInitializeEx,
        CoUninitialize, IPersistFile, STGM_READ, STGM_READWRITE,
    };
    use windows::Win32::UI::Shell::{
        IShellLinkW, SHCNE_ASSOCCHANGED, SHCNF_IDLIST, SHChangeNotify, ShellLink,
    };
    use windows::core::{ComInterface, PCWSTR};

    const MAX_PATH: usize = 260;

    /// Keeps COM initialized for the lifetime of the shell.
    struct ComGuard {
        initialized: bool,
    }

    impl ComGuard {
        fn new() -> Self {
            let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
            Self {
                initialized: hr.is_ok(),
            }
        }
    }

    impl Drop for ComGuard {
        fn drop(&mut self) {
            if self.initialized {
                unsafe { CoUninitialize() };
            }
        }
    }

    /// Shortcut access through `IShellLinkW`.
    pub struct WindowsShell {
        _com: ComGuard,
    }

    impl WindowsShell {
        pub fn new() -> Self {
            Self {
                _com: ComGuard::new(),
            }
        }
    }

    impl Default for WindowsShell {
        fn default() -> Self {
            Self::new()
        }
    }

    fn to_wide(path: &Path) -> Vec<u16> {
        path.as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    fn from_wide(buf: &[u16]) -> String {
        let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        String::from_utf16_lossy(&buf[..len])
    }

    fn open_link(lnk: &Path, writable: bool) -> windows::core::Result<(IShellLinkW, IPersistFile)> {
        unsafe {
            let shell_link: IShellLinkW = CoCreateInstance(&ShellLink, None, CLSCTX_INPROC_SERVER)?;
            let persist_file: IPersistFile = shell_link.cast()?;
            let wide = to_wide(lnk);
            let mode = if writable { STGM_READWRITE } else { STGM_READ };
            persist_file.Load(PCWSTR(wide.as_ptr()), mode)?;
            Ok((shell_link, persist_file))
        }
    }

    impl ShortcutShell for WindowsShell {
        fn read_shortcut(&self, lnk: &Path) -> Result<ShortcutInfo, ShellError> {
            let read_err = |e: windows::core::Error| ShellError::Read {
                path: lnk.to_path_buf(),
                reason: e.to_string(),
            };
            let (shell_link, _) = open_link(lnk, false).map_err(read_err)?;

            let mut icon_buf = [0u16; MAX_PATH];
            let mut index = 0i32;
            unsafe { shell_link.GetIconLocation(&mut icon_buf, &mut index) }.map_err(read_err)?;

            let mut target_buf = [0u16; MAX_PATH];
            let mut find_data = WIN32_FIND_DATAW::default();
            // Shortcuts to virtual items have no file-system target.
            let _ = unsafe { shell_link.GetPath(&mut target_buf, &mut find_data, 0) };

            let icon_path = from_wide(&icon_buf);
            let icon_location = (!icon_path.is_empty()).then(|| {
                let index = u32::try_from(index).unwrap_or_else(|_| {
                    tracing::warn!(
                        shortcut = %lnk.display(),
                        "negative icon index {}, using 0",
                        index
                    );
                    0
                });
                IconRef::new(icon_path, index)
            });
            let target = from_wide(&target_buf);

            Ok(ShortcutInfo {
                icon_location,
                target_path: (!target.is_empty()).then_some(target),
            })
        }

        fn set_icon(&self, lnk: &Path, icon: &IconRef) -> Result<(), ShellError> {
            let write_err = |e: windows::core::Error| ShellError::Write {
                path: lnk.to_path_buf(),
                reason: e.to_string(),
            };
            let (shell_link, persist_file) = open_link(lnk, true).map_err(write_err)?;

            let wide_icon = to_wide(&icon.path);
            unsafe {
                shell_link
                    .SetIconLocation(PCWSTR(wide_icon.as_ptr()), icon.index as i32)
                    .map_err(write_err)?;
                persist_file.Save(PCWSTR::null(), TRUE).map_err(write_err)?;
            }
            Ok(())
        }

        fn notify_changed(&self) {
            unsafe { SHChangeNotify(SHCNE_ASSOCCHANGED, SHCNF_IDLIST, None, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_icon_name() {
        assert_eq!(generated_icon_name(Path::new("App.lnk")), "book_App.ico");
        assert_eq!(
            generated_icon_name(Path::new(r"Visual Studio Code (x64).lnk")),
            "book_Visual Studio Code x64.ico"
        );
        assert_eq!(generated_icon_name(Path::new("my_tool!? .lnk")), "book_my_tool.ico");
        assert_eq!(generated_icon_name(Path::new("Café.lnk")), "book_Café.ico");
    }

    #[test]
    fn test_find_shortcuts_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.lnk", "A.LNK", "notes.txt", "c.url"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("folder.lnk")).unwrap();

        let found: Vec<String> = find_shortcuts(dir.path())
            .iter()
            .map(|p| display_name(p))
            .collect();
        assert_eq!(found, vec!["A.LNK", "b.lnk"]);
    }

    #[test]
    fn test_find_shortcuts_missing_dir() {
        assert!(find_shortcuts(Path::new("/no/such/desktop")).is_empty());
    }

    #[test]
    fn test_current_icon_prefers_explicit_location() {
        let info = ShortcutInfo {
            icon_location: Some(IconRef::new("C:/icons/a.ico", 3)),
            target_path: Some("C:/App/app.exe".into()),
        };
        assert_eq!(
            current_icon(Path::new("App.lnk"), &info).unwrap(),
            IconRef::new("C:/icons/a.ico", 3)
        );
    }

    #[test]
    fn test_current_icon_falls_back_to_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app.exe");
        fs::write(&target, b"MZ").unwrap();

        let info = ShortcutInfo {
            icon_location: None,
            target_path: Some(target.to_string_lossy().into_owned()),
        };
        assert_eq!(
            current_icon(Path::new("App.lnk"), &info).unwrap(),
            IconRef::new(&target, 0)
        );

        let dangling = ShortcutInfo {
            icon_location: None,
            target_path: Some(dir.path().join("gone.exe").to_string_lossy().into_owned()),
        };
        assert!(matches!(
            current_icon(Path::new("App.lnk"), &dangling),
            Err(ShellError::NoIcon(_))
        ));
    }
}

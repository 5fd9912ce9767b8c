use crate::error::ExtractError;
use crate::icon_ref::IconRef;
use image::RgbaImage;
use std::path::Path;

/// Embedded-resource containers that carry icon groups.
const EMBEDDED_EXTENSIONS: [&str; 6] = ["exe", "dll", "cpl", "ocx", "scr", "icl"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A standalone `.ico` container
    IconFile,
    /// An icon group inside a PE image
    Embedded,
}

pub fn resource_kind(path: &Path) -> Option<ResourceKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext == "ico" {
        Some(ResourceKind::IconFile)
    } else if EMBEDDED_EXTENSIONS.contains(&ext.as_str()) {
        Some(ResourceKind::Embedded)
    } else {
        None
    }
}

/// Decode the icon an [`IconRef`] points at into an RGBA bitmap.
///
/// No frame is ever upscaled: an `.ico` yields its largest frame, an embedded
/// icon is rendered at the size the resource provides.
pub fn extract_icon(icon: &IconRef) -> Result<RgbaImage, ExtractError> {
    let path = icon.path.as_path();
    if !path.exists() {
        return Err(ExtractError::NotFound(path.to_path_buf()));
    }

    let img = match resource_kind(path) {
        Some(ResourceKind::IconFile) => load_icon_file(path)?,
        Some(ResourceKind::Embedded) => extract_embedded(path, icon.index)?,
        None => return Err(ExtractError::UnsupportedType(path.to_path_buf())),
    };

    tracing::debug!(
        icon = %icon,
        width = img.width(),
        height = img.height(),
        "icon extracted"
    );
    Ok(img)
}

/// The ICO decoder picks the largest frame in the directory.
fn load_icon_file(path: &Path) -> Result<RgbaImage, ExtractError> {
    let img = image::open(path).map_err(|source| ExtractError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgba8())
}

#[cfg(not(windows))]
fn extract_embedded(path: &Path, _index: u32) -> Result<RgbaImage, ExtractError> {
    Err(ExtractError::UnsupportedPlatform(path.to_path_buf()))
}

#[cfg(windows)]
fn extract_embedded(path: &Path, index: u32) -> Result<RgbaImage, ExtractError> {
    match win32::extract_indexed(path, index) {
        Ok(img) => Ok(img),
        Err(e) if index == 0 => {
            tracing::debug!(path = %path.display(), "{}, trying shell icon", e);
            let path_str = path.to_string_lossy();
            windows_icons::get_icon_by_path(&path_str).map_err(|_| e)
        }
        Err(e) => Err(e),
    }
}

#[cfg(windows)]
mod win32 {
    use super::ExtractError;
    use image::RgbaImage;
    use std::ffi::c_void;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::Graphics::Gdi::{
        BI_RGB, BITMAP, BITMAPINFO, BITMAPINFOHEADER, CreateCompatibleDC, CreateDIBSection,
        CreatedHDC, DIB_RGB_COLORS, DeleteDC, DeleteObject, GdiFlush, GetDC, GetObjectW, HBITMAP,
        HDC, HGDIOBJ, ReleaseDC, SelectObject,
    };
    use windows::Win32::UI::Shell::ExtractIconExW;
    use windows::Win32::UI::WindowsAndMessaging::{
        DI_NORMAL, DestroyIcon, DrawIconEx, GetIconInfo, GetSystemMetrics, HICON, ICONINFO,
        SM_CXICON, SM_CYICON,
    };
    use windows::core::PCWSTR;

    struct IconHandle(HICON);

    impl Drop for IconHandle {
        fn drop(&mut self) {
            if !self.0.is_invalid() {
                unsafe {
                    let _ = DestroyIcon(self.0);
                }
            }
        }
    }

    struct Bitmap(HBITMAP);

    impl Drop for Bitmap {
        fn drop(&mut self) {
            if !self.0.is_invalid() {
                unsafe {
                    DeleteObject(self.0);
                }
            }
        }
    }

    struct ScreenDc(HDC);

    impl Drop for ScreenDc {
        fn drop(&mut self) {
            unsafe {
                ReleaseDC(HWND::default(), self.0);
            }
        }
    }

    struct MemoryDc(CreatedHDC);

    impl MemoryDc {
        fn hdc(&self) -> HDC {
            HDC(self.0.0)
        }
    }

    impl Drop for MemoryDc {
        fn drop(&mut self) {
            unsafe {
                DeleteDC(self.0);
            }
        }
    }

    struct Selection {
        dc: HDC,
        previous: HGDIOBJ,
    }

    impl Drop for Selection {
        fn drop(&mut self) {
            unsafe {
                SelectObject(self.dc, self.previous);
            }
        }
    }

    fn to_wide(path: &Path) -> Vec<u16> {
        path.as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    fn platform(call: &'static str, path: &Path) -> ExtractError {
        ExtractError::Platform {
            call,
            path: path.to_path_buf(),
        }
    }

    pub(super) fn extract_indexed(path: &Path, index: u32) -> Result<RgbaImage, ExtractError> {
        let wide = to_wide(path);
        let mut large = HICON::default();
        let count = unsafe {
            ExtractIconExW(
                PCWSTR(wide.as_ptr()),
                index as i32,
                Some(&mut large as *mut HICON),
                None,
                1,
            )
        };
        let icon = IconHandle(large);
        if count == 0 || icon.0.is_invalid() {
            return Err(ExtractError::NoIconAtIndex {
                path: path.to_path_buf(),
                index,
            });
        }

        let (width, height) = icon_size(&icon, path)?;
        let img = render(&icon, width, height, path)?;
        if img.pixels().all(|p| p.0[3] == 0) {
            return Err(ExtractError::NoIconAtIndex {
                path: path.to_path_buf(),
                index,
            });
        }
        Ok(img)
    }

    /// Natural size of the icon's color bitmap, or the system icon size for
    /// monochrome icons.
    fn icon_size(icon: &IconHandle, path: &Path) -> Result<(u32, u32), ExtractError> {
        let mut info = ICONINFO::default();
        unsafe { GetIconInfo(icon.0, &mut info) }.map_err(|_| platform("GetIconInfo", path))?;
        let color = Bitmap(info.hbmColor);
        let _mask = Bitmap(info.hbmMask);

        if !color.0.is_invalid() {
            let mut bm = BITMAP::default();
            let written = unsafe {
                GetObjectW(
                    color.0,
                    std::mem::size_of::<BITMAP>() as i32,
                    Some(&mut bm as *mut BITMAP as *mut c_void),
                )
            };
            if written > 0 && bm.bmWidth > 0 && bm.bmHeight > 0 {
                return Ok((bm.bmWidth as u32, bm.bmHeight as u32));
            }
        }

        let (w, h) = unsafe { (GetSystemMetrics(SM_CXICON), GetSystemMetrics(SM_CYICON)) };
        if w <= 0 || h <= 0 {
            return Err(platform("GetSystemMetrics", path));
        }
        Ok((w as u32, h as u32))
    }

    fn render(
        icon: &IconHandle,
        width: u32,
        height: u32,
        path: &Path,
    ) -> Result<RgbaImage, ExtractError> {
        let screen = ScreenDc(unsafe { GetDC(HWND::default()) });
        if screen.0.is_invalid() {
            return Err(platform("GetDC", path));
        }
        let mem = MemoryDc(unsafe { CreateCompatibleDC(screen.0) });
        if mem.0.is_invalid() {
            return Err(platform("CreateCompatibleDC", path));
        }

        let bmi = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width as i32,
                biHeight: -(height as i32), // Top-down DIB
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut bits: *mut c_void = std::ptr::null_mut();
        let dib = unsafe {
            CreateDIBSection(mem.hdc(), &bmi, DIB_RGB_COLORS, &mut bits, None, 0)
        }
        .map(Bitmap)
        .map_err(|_| platform("CreateDIBSection", path))?;
        if bits.is_null() {
            return Err(platform("CreateDIBSection", path));
        }

        let byte_len = (width * height * 4) as usize;
        let _selection = Selection {
            dc: mem.hdc(),
            previous: unsafe { SelectObject(mem.hdc(), dib.0) },
        };

        unsafe {
            std::ptr::write_bytes(bits as *mut u8, 0, byte_len);
            DrawIconEx(
                mem.hdc(),
                0,
                0,
                icon.0,
                width as i32,
                height as i32,
                0,
                None,
                DI_NORMAL,
            )
            .map_err(|_| platform("DrawIconEx", path))?;
            // the draw may still be batched; the DIB is read directly below
            let _ = GdiFlush();
        }

        let mut pixels = vec![0u8; byte_len];
        unsafe {
            std::ptr::copy_nonoverlapping(bits as *const u8, pixels.as_mut_ptr(), byte_len);
        }

        bgra_to_rgba(&mut pixels);
        RgbaImage::from_raw(width, height, pixels).ok_or_else(|| platform("CreateDIBSection", path))
    }

    /// Swap to RGBA. Legacy icons without an alpha channel come back with
    /// alpha 0 everywhere; those are made opaque where anything was drawn.
    fn bgra_to_rgba(pixels: &mut [u8]) {
        let mut any_alpha = false;
        for px in pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
            any_alpha |= px[3] != 0;
        }
        if !any_alpha {
            for px in pixels.chunks_exact_mut(4) {
                if px[0] != 0 || px[1] != 0 || px[2] != 0 {
                    px[3] = 255;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::ico::{IcoEncoder, IcoFrame};
    use image::{ExtendedColorType, Rgba};
    use std::fs::File;

    fn write_ico(path: &Path, sizes: &[u32], color: Rgba<u8>) {
        let frames: Vec<IcoFrame<'static>> = sizes
            .iter()
            .map(|&s| {
                let img = RgbaImage::from_pixel(s, s, color);
                IcoFrame::as_png(img.as_raw(), s, s, ExtendedColorType::Rgba8).unwrap()
            })
            .collect();
        IcoEncoder::new(File::create(path).unwrap())
            .encode_images(&frames)
            .unwrap();
    }

    #[test]
    fn test_resource_kind() {
        assert_eq!(resource_kind(Path::new("a.ico")), Some(ResourceKind::IconFile));
        assert_eq!(resource_kind(Path::new(r"C:\x\A.ICO")), Some(ResourceKind::IconFile));
        assert_eq!(resource_kind(Path::new("app.exe")), Some(ResourceKind::Embedded));
        assert_eq!(resource_kind(Path::new("shell32.DLL")), Some(ResourceKind::Embedded));
        assert_eq!(resource_kind(Path::new("photo.png")), None);
        assert_eq!(resource_kind(Path::new("noext")), None);
    }

    #[test]
    fn test_missing_path_is_failure() {
        let icon = IconRef::new("/definitely/not/here/app.ico", 0);
        assert!(matches!(extract_icon(&icon), Err(ExtractError::NotFound(_))));
    }

    #[test]
    fn test_unsupported_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon.png");
        std::fs::write(&path, b"whatever").unwrap();
        let icon = IconRef::new(&path, 0);
        assert!(matches!(
            extract_icon(&icon),
            Err(ExtractError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_corrupt_ico_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ico");
        std::fs::write(&path, b"\0\0\x01\0garbage").unwrap();
        let icon = IconRef::new(&path, 0);
        assert!(matches!(extract_icon(&icon), Err(ExtractError::Decode { .. })));
    }

    #[test]
    fn test_ico_prefers_largest_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.ico");
        write_ico(&path, &[16, 48, 32], Rgba([10, 200, 30, 255]));

        let img = extract_icon(&IconRef::new(&path, 0)).unwrap();
        assert_eq!(img.dimensions(), (48, 48));
        assert_eq!(*img.get_pixel(5, 5), Rgba([10, 200, 30, 255]));
    }

    #[test]
    fn test_small_ico_is_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.ico");
        write_ico(&path, &[32], Rgba([200, 50, 50, 255]));

        let img = extract_icon(&IconRef::new(&path, 0)).unwrap();
        assert_eq!(img.dimensions(), (32, 32));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_embedded_needs_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.exe");
        std::fs::write(&path, b"MZ").unwrap();
        assert!(matches!(
            extract_icon(&IconRef::new(&path, 2)),
            Err(ExtractError::UnsupportedPlatform(_))
        ));
    }
}

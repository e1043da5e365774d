use image::{GrayImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::error::{GuestpassError, Result};

pub const DEFAULT_MODULE_PX: u32 = 10;

/// Turns a code identifier into a scannable PNG. Rendering is deterministic:
/// the same payload always gives the same bytes.
#[derive(Clone, Debug)]
pub struct QrEncoder {
    module_px: u32,
    ec_level: EcLevel,
}

impl Default for QrEncoder {
    fn default() -> Self {
        Self {
            module_px: DEFAULT_MODULE_PX,
            ec_level: EcLevel::M,
        }
    }
}

impl QrEncoder {
    pub fn with_module_px(mut self, px: u32) -> Self {
        self.module_px = px.max(1);
        self
    }

    pub fn render(&self, payload: &str) -> Result<GrayImage> {
        let code = QrCode::with_error_correction_level(payload.as_bytes(), self.ec_level)
            .map_err(|e| GuestpassError::QrEncoding(e.to_string()))?;

        Ok(code
            .render::<Luma<u8>>()
            .quiet_zone(true)
            .module_dimensions(self.module_px, self.module_px)
            .build())
    }

    pub fn render_png(&self, payload: &str) -> Result<Vec<u8>> {
        let image = self.render(payload)?;
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| GuestpassError::QrEncoding(format!("PNG encoding failed: {}", e)))?;
        Ok(bytes)
    }

    /// Render `payload` and write it as `<dir>/<file_name>`, creating `dir`
    /// when needed.
    pub fn save_png(&self, payload: &str, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let bytes = self.render_png(payload)?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Download name for a code's image.
pub fn png_file_name(code: &str) -> String {
    format!("qr_{}.png", code)
}

/// Inverse of [`png_file_name`] for names that can be served safely: only a
/// hyphenated UUID between the prefix and the extension is accepted, which
/// also keeps path separators and `..` out.
pub fn code_from_file_name(file_name: &str) -> Option<&str> {
    let code = file_name.strip_prefix("qr_")?.strip_suffix(".png")?;
    let valid = code.len() == 36
        && code.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        });
    valid.then_some(code)
}

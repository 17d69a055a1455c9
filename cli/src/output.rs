//! Terminal output for the `tint` commands

use colored::Colorize;
use tint_shared::PixelBuffer;
use tint_studio::Notice;

pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a session notice; module problems are errors, the rest warnings.
pub fn notice(notice: &Notice) {
    match notice {
        Notice::ModuleUnavailable(_) | Notice::FilterFailed(_) => error(&notice.to_string()),
        _ => warning(&notice.to_string()),
    }
}

/// `WxH` of an image, for status lines.
pub fn dimensions(pixels: &PixelBuffer) -> String {
    format!("{}x{}", pixels.width(), pixels.height()).bold().to_string()
}

//! Filter module ABI
//!
//! A filter module is any WebAssembly module exporting an allocator, a
//! deallocator, its linear memory and some of the pixel transforms
//! below. Every transform mutates `len` bytes at `ptr` in place.

use serde::{Deserialize, Serialize};

/// Name of the linear memory export (and of the `env` import we provide)
pub const MEMORY_EXPORT: &str = "memory";

/// Reactor initialisation export, called once after instantiation if present
pub const INITIALIZE_EXPORT: &str = "_initialize";

/// Default file name of the filter module under the asset root
pub const DEFAULT_MODULE_FILE: &str = "image.wasm";

/// Filter module ABI version
pub const FILTER_ABI_VERSION: u32 = 1;

/// An exported function of the filter module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `allocate(size: i32) -> i32`, 0 on failure
    Allocate,
    /// `free(ptr: i32)`
    Free,
    /// `grayscale(ptr: i32, len: i32)`
    Grayscale,
    /// `adjustBrightness(ptr: i32, len: i32, amount: i32)`
    Brightness,
    /// `adjustContrast(ptr: i32, len: i32, factor: f32)`
    Contrast,
    /// `sepia(ptr: i32, len: i32)`
    Sepia,
    /// `invert(ptr: i32, len: i32)`
    Invert,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Allocate,
        Capability::Free,
        Capability::Grayscale,
        Capability::Brightness,
        Capability::Contrast,
        Capability::Sepia,
        Capability::Invert,
    ];

    /// Export names accepted for this capability, in lookup order.
    ///
    /// Emscripten builds prefix C symbols with an underscore and keep
    /// snake_case names, so those spellings are accepted too.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Capability::Allocate => &["allocate", "malloc", "_malloc"],
            Capability::Free => &["free", "_free"],
            Capability::Grayscale => &["grayscale", "_grayscale"],
            Capability::Brightness => &["adjustBrightness", "adjust_brightness", "_adjust_brightness"],
            Capability::Contrast => &["adjustContrast", "adjust_contrast", "_adjust_contrast"],
            Capability::Sepia => &["sepia", "_sepia"],
            Capability::Invert => &["invert", "_invert"],
        }
    }

    /// Canonical export name.
    pub fn name(self) -> &'static str {
        self.aliases()[0]
    }

    /// Whether a module without this export is rejected at load time.
    pub fn is_required(self) -> bool {
        matches!(self, Capability::Allocate | Capability::Free)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

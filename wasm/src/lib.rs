//! Reference tint filter module
//!
//! Build with `cargo build -p tint-filter --target wasm32-unknown-unknown --release`
//! and copy `tint_filter.wasm` to `<asset_root>/image.wasm`.
//!
//! The pixel transforms live in [`ops`] as plain slice functions; the
//! wasm exports are thin wrappers over them.

pub mod ops;

pub use tint_shared::wasm::FILTER_ABI_VERSION;

#[cfg(target_arch = "wasm32")]
mod exports {
    use std::alloc::{alloc, dealloc, Layout};
    use std::slice;

    use crate::ops;

    /// Bytes reserved in front of each allocation to remember its size
    const HEADER: usize = 8;

    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size.checked_add(HEADER)?, HEADER).ok()
    }

    /// Allocate memory for the host, 0 on failure
    #[no_mangle]
    pub extern "C" fn allocate(size: usize) -> *mut u8 {
        let Some(layout) = layout(size) else {
            return std::ptr::null_mut();
        };
        unsafe {
            let base = alloc(layout);
            if base.is_null() {
                return base;
            }
            (base as *mut usize).write(size);
            base.add(HEADER)
        }
    }

    /// Release memory handed out by `allocate`
    #[no_mangle]
    pub extern "C" fn free(ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        unsafe {
            let base = ptr.sub(HEADER);
            let size = (base as *const usize).read();
            if let Some(layout) = layout(size) {
                dealloc(base, layout);
            }
        }
    }

    unsafe fn pixels<'a>(ptr: *mut u8, len: usize) -> &'a mut [u8] {
        slice::from_raw_parts_mut(ptr, len)
    }

    #[no_mangle]
    pub extern "C" fn grayscale(ptr: *mut u8, len: usize) {
        ops::grayscale(unsafe { pixels(ptr, len) });
    }

    #[export_name = "adjustBrightness"]
    pub extern "C" fn adjust_brightness(ptr: *mut u8, len: usize, amount: i32) {
        ops::adjust_brightness(unsafe { pixels(ptr, len) }, amount);
    }

    #[export_name = "adjustContrast"]
    pub extern "C" fn adjust_contrast(ptr: *mut u8, len: usize, factor: f32) {
        ops::adjust_contrast(unsafe { pixels(ptr, len) }, factor);
    }

    #[no_mangle]
    pub extern "C" fn sepia(ptr: *mut u8, len: usize) {
        ops::sepia(unsafe { pixels(ptr, len) });
    }

    #[no_mangle]
    pub extern "C" fn invert(ptr: *mut u8, len: usize) {
        ops::invert(unsafe { pixels(ptr, len) });
    }
}

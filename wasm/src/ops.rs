//! In-place RGBA transforms.
//!
//! Each function walks whole pixels and leaves the alpha channel alone.
//! A trailing partial pixel is ignored.

const CHANNELS: usize = 4;

fn clamp_u8(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

/// Weighted luma, written to all three color channels.
pub fn grayscale(data: &mut [u8]) {
    for px in data.chunks_exact_mut(CHANNELS) {
        let gray = px[0] as f32 * 0.3 + px[1] as f32 * 0.59 + px[2] as f32 * 0.11;
        let gray = clamp_u8(gray);
        px[0] = gray;
        px[1] = gray;
        px[2] = gray;
    }
}

/// Add `amount` to every color channel, saturating at 0 and 255.
pub fn adjust_brightness(data: &mut [u8], amount: i32) {
    for px in data.chunks_exact_mut(CHANNELS) {
        for c in &mut px[..3] {
            *c = (*c as i32 + amount).clamp(0, 255) as u8;
        }
    }
}

/// Scale each color channel's distance from mid-gray by `factor`.
pub fn adjust_contrast(data: &mut [u8], factor: f32) {
    for px in data.chunks_exact_mut(CHANNELS) {
        for c in &mut px[..3] {
            *c = clamp_u8((*c as f32 - 128.0) * factor + 128.0);
        }
    }
}

pub fn sepia(data: &mut [u8]) {
    for px in data.chunks_exact_mut(CHANNELS) {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        px[0] = clamp_u8(r * 0.393 + g * 0.769 + b * 0.189);
        px[1] = clamp_u8(r * 0.349 + g * 0.686 + b * 0.168);
        px[2] = clamp_u8(r * 0.272 + g * 0.534 + b * 0.131);
    }
}

pub fn invert(data: &mut [u8]) {
    for px in data.chunks_exact_mut(CHANNELS) {
        for c in &mut px[..3] {
            *c = 255 - *c;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grayscale_equalizes_channels() {
        let mut data = vec![10, 20, 30, 255, 200, 210, 220, 128];
        grayscale(&mut data);
        // 10*0.3 + 20*0.59 + 30*0.11 = 18.1
        assert_eq!(&data[..4], &[18, 18, 18, 255]);
        assert_eq!(data[4], data[5]);
        assert_eq!(data[5], data[6]);
        assert_eq!(data[7], 128);
    }

    #[test]
    fn test_brightness_saturates() {
        let mut data = vec![250, 5, 128, 9];
        adjust_brightness(&mut data, 10);
        assert_eq!(data, vec![255, 15, 138, 9]);
        adjust_brightness(&mut data, -20);
        assert_eq!(data, vec![235, 0, 118, 9]);
    }

    #[test]
    fn test_contrast_pivots_on_mid_gray() {
        let mut data = vec![128, 64, 192, 255];
        adjust_contrast(&mut data, 2.0);
        assert_eq!(data, vec![128, 0, 255, 255]);

        let mut flat = vec![0, 100, 255, 255];
        adjust_contrast(&mut flat, 0.0);
        assert_eq!(flat, vec![128, 128, 128, 255]);
    }

    #[test]
    fn test_invert_twice_is_identity() {
        let original = vec![1, 2, 3, 4, 250, 251, 252, 253];
        let mut data = original.clone();
        invert(&mut data);
        assert_eq!(&data[..4], &[254, 253, 252, 4]);
        invert(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_sepia_saturates_white() {
        let mut data = vec![255, 255, 255, 255];
        sepia(&mut data);
        assert_eq!(data[0], 255);
        assert_eq!(data[1], 255);
        assert_eq!(data[2], 238);
    }

    #[test]
    fn test_partial_pixel_untouched() {
        let mut data = vec![10, 20, 30, 40, 50];
        invert(&mut data);
        assert_eq!(data[4], 50);
    }
}

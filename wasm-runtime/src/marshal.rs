//! Pixel marshaling across the host/guest boundary.
//!
//! One call allocates a region in the module's linear memory, copies the
//! pixels in, runs the requested transforms in a fixed order, copies the
//! result out and releases the region again.

use crate::error::MarshalError;
use crate::FilterModule;
use tint_shared::types::pixels::CHANNELS;
use tint_shared::wasm::Capability;
use tint_shared::{PixelBuffer, TransformParams};
use tracing::{debug, trace, warn};

/// A single in-place transform call with its scalar argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Grayscale,
    Brightness(i32),
    Contrast(f32),
    Sepia,
    Invert,
}

impl Transform {
    pub fn capability(&self) -> Capability {
        match self {
            Transform::Grayscale => Capability::Grayscale,
            Transform::Brightness(_) => Capability::Brightness,
            Transform::Contrast(_) => Capability::Contrast,
            Transform::Sepia => Capability::Sepia,
            Transform::Invert => Capability::Invert,
        }
    }
}

/// The transforms `params` asks for, in execution order.
///
/// Grayscale runs before brightness, brightness before contrast. The
/// transforms do not commute, so this order is part of the contract.
pub fn plan(params: &TransformParams) -> Vec<Transform> {
    let mut steps = Vec::with_capacity(5);
    if params.grayscale() > 0 {
        steps.push(Transform::Grayscale);
    }
    if params.brightness() != 0 {
        steps.push(Transform::Brightness(params.brightness()));
    }
    if params.contrast() != 0 {
        steps.push(Transform::Contrast(params.contrast_factor()));
    }
    if params.sepia() {
        steps.push(Transform::Sepia);
    }
    if params.invert() {
        steps.push(Transform::Invert);
    }
    steps
}

/// Run `params` over `pixels` using `module`, returning a new buffer.
pub fn apply_filters<M: FilterModule + ?Sized>(
    module: &mut M,
    pixels: &PixelBuffer,
    params: &TransformParams,
) -> Result<PixelBuffer, MarshalError> {
    let out = apply_to_bytes(module, pixels.as_bytes(), params)?;
    pixels
        .with_data(out)
        .map_err(|_| MarshalError::InvalidBuffer(pixels.len()))
}

/// Run `params` over raw RGBA bytes.
///
/// The input is never mutated; on error no partial result escapes.
pub fn apply_to_bytes<M: FilterModule + ?Sized>(
    module: &mut M,
    bytes: &[u8],
    params: &TransformParams,
) -> Result<Vec<u8>, MarshalError> {
    if bytes.len() % CHANNELS != 0 {
        return Err(MarshalError::InvalidBuffer(bytes.len()));
    }
    if params.is_neutral() || bytes.is_empty() {
        trace!("no-op filter request, module untouched");
        return Ok(bytes.to_vec());
    }
    if module.is_poisoned() {
        return Err(MarshalError::Poisoned);
    }

    let steps = plan(params);
    if let Some(missing) = steps
        .iter()
        .map(Transform::capability)
        .find(|cap| !module.has_capability(*cap))
    {
        return Err(MarshalError::MissingCapability(missing));
    }

    let len = u32::try_from(bytes.len()).map_err(|_| MarshalError::Allocation {
        requested: bytes.len(),
        reason: "buffer exceeds 32-bit address space".to_string(),
    })?;

    let region = module.allocate(len)?;
    debug!(
        ptr = region.ptr(),
        len = region.len(),
        steps = steps.len(),
        "allocated pixel region"
    );

    let outcome = run_in_region(module, &region, bytes, &steps);
    let ptr = region.ptr();
    let released = module.release(region);

    match (outcome, released) {
        (Ok(out), Ok(())) => Ok(out),
        (outcome, Err(e)) => {
            if let Err(run_err) = outcome {
                warn!("filter run failed before release: {}", run_err);
            }
            warn!(ptr, "release failed, filter module poisoned: {}", e);
            module.poison();
            Err(e)
        }
        (Err(e), Ok(())) => {
            if e.is_fatal() {
                warn!("filter module poisoned: {}", e);
                module.poison();
            }
            Err(e)
        }
    }
}

fn run_in_region<M: FilterModule + ?Sized>(
    module: &mut M,
    region: &tint_shared::MemoryRegion,
    bytes: &[u8],
    steps: &[Transform],
) -> Result<Vec<u8>, MarshalError> {
    module.write(region, bytes)?;
    for step in steps {
        trace!(?step, "invoking transform");
        module.invoke(*step, region)?;
    }
    let mut out = vec![0u8; bytes.len()];
    module.read(region, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tint_shared::MemoryRegion;

    /// In-process filter module backed by the reference transforms.
    #[derive(Default)]
    struct RecordingModule {
        memory: Vec<u8>,
        next: u32,
        live: HashSet<u32>,
        allocations: usize,
        releases: usize,
        calls: Vec<(Transform, u32, u32)>,
        missing: Vec<Capability>,
        fail_alloc: bool,
        fail_release: bool,
        trap_on: Option<Capability>,
        poisoned: bool,
    }

    impl RecordingModule {
        fn new() -> Self {
            Self {
                memory: vec![0xAA; 4096],
                next: 64,
                ..Default::default()
            }
        }

        fn slice(&mut self, region: &MemoryRegion) -> &mut [u8] {
            &mut self.memory[region.ptr() as usize..region.end() as usize]
        }
    }

    impl FilterModule for RecordingModule {
        fn has_capability(&self, capability: Capability) -> bool {
            !self.missing.contains(&capability)
        }

        fn allocate(&mut self, len: u32) -> Result<MemoryRegion, MarshalError> {
            if self.fail_alloc || (self.next + len) as usize > self.memory.len() {
                return Err(MarshalError::Allocation {
                    requested: len as usize,
                    reason: "out of memory".into(),
                });
            }
            let ptr = self.next;
            self.next += len;
            self.live.insert(ptr);
            self.allocations += 1;
            Ok(MemoryRegion::new(ptr, len))
        }

        fn release(&mut self, region: MemoryRegion) -> Result<(), MarshalError> {
            let ptr = region.into_ptr();
            assert!(self.live.remove(&ptr), "double free of {ptr}");
            self.releases += 1;
            if self.fail_release {
                return Err(MarshalError::Release {
                    ptr,
                    reason: "allocator corrupted".into(),
                });
            }
            Ok(())
        }

        fn write(&mut self, region: &MemoryRegion, bytes: &[u8]) -> Result<(), MarshalError> {
            self.slice(region).copy_from_slice(bytes);
            Ok(())
        }

        fn read(&mut self, region: &MemoryRegion, out: &mut [u8]) -> Result<(), MarshalError> {
            out.copy_from_slice(self.slice(region));
            Ok(())
        }

        fn invoke(&mut self, transform: Transform, region: &MemoryRegion) -> Result<(), MarshalError> {
            self.calls.push((transform, region.ptr(), region.len()));
            if self.trap_on == Some(transform.capability()) {
                return Err(MarshalError::Trap {
                    op: transform.capability(),
                    reason: "unreachable".into(),
                });
            }
            let data = self.slice(region);
            match transform {
                Transform::Grayscale => tint_filter::ops::grayscale(data),
                Transform::Brightness(amount) => tint_filter::ops::adjust_brightness(data, amount),
                Transform::Contrast(factor) => tint_filter::ops::adjust_contrast(data, factor),
                Transform::Sepia => tint_filter::ops::sepia(data),
                Transform::Invert => tint_filter::ops::invert(data),
            }
            Ok(())
        }

        fn is_poisoned(&self) -> bool {
            self.poisoned
        }

        fn poison(&mut self) {
            self.poisoned = true;
        }
    }

    fn two_pixels() -> PixelBuffer {
        PixelBuffer::new(2, 1, vec![10, 20, 30, 255, 200, 210, 220, 255]).unwrap()
    }

    #[test]
    fn test_plan_order_is_fixed() {
        let params = TransformParams::new(20, 50, 100)
            .unwrap()
            .with_sepia(true)
            .with_invert(true);
        assert_eq!(
            plan(&params),
            vec![
                Transform::Grayscale,
                Transform::Brightness(20),
                Transform::Contrast(1.5),
                Transform::Sepia,
                Transform::Invert,
            ]
        );
        assert!(plan(&TransformParams::default()).is_empty());
    }

    #[test]
    fn test_neutral_params_do_not_touch_module() {
        let mut module = RecordingModule::new();
        let input = two_pixels();
        let out = apply_filters(&mut module, &input, &TransformParams::default()).unwrap();
        assert_eq!(out, input);
        let again = apply_filters(&mut module, &out, &TransformParams::default()).unwrap();
        assert_eq!(again, input);
        assert_eq!(module.allocations, 0);
        assert!(module.calls.is_empty());
    }

    #[test]
    fn test_grayscale_invocation_contract() {
        let mut module = RecordingModule::new();
        let params = TransformParams::new(0, 0, 100).unwrap();
        let out = apply_filters(&mut module, &two_pixels(), &params).unwrap();

        assert_eq!(module.calls, vec![(Transform::Grayscale, 64, 8)]);
        assert_eq!(out.len(), 8);
        for px in out.pixels() {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn test_every_allocation_released_once() {
        let mut module = RecordingModule::new();
        let params = TransformParams::new(-30, 40, 50).unwrap();
        for _ in 0..3 {
            apply_filters(&mut module, &two_pixels(), &params).unwrap();
        }
        assert_eq!(module.allocations, 3);
        assert_eq!(module.releases, 3);
        assert!(module.live.is_empty());
    }

    #[test]
    fn test_output_length_matches_input() {
        let mut module = RecordingModule::new();
        for pixels in [1usize, 2, 7, 64] {
            let bytes: Vec<u8> = (0..pixels * 4).map(|i| (i * 37 % 256) as u8).collect();
            let params = TransformParams::new(15, -25, 60).unwrap();
            let out = apply_to_bytes(&mut module, &bytes, &params).unwrap();
            assert_eq!(out.len(), bytes.len());
        }
    }

    #[test]
    fn test_matches_reference_pipeline() {
        let bytes = vec![10, 200, 30, 255, 90, 15, 240, 128];
        let params = TransformParams::new(100, 50, 100).unwrap();

        let mut module = RecordingModule::new();
        let out = apply_to_bytes(&mut module, &bytes, &params).unwrap();

        let mut expected = bytes.clone();
        tint_filter::ops::grayscale(&mut expected);
        tint_filter::ops::adjust_brightness(&mut expected, 100);
        tint_filter::ops::adjust_contrast(&mut expected, 1.5);
        assert_eq!(out, expected);

        let mut reordered = bytes.clone();
        tint_filter::ops::adjust_brightness(&mut reordered, 100);
        tint_filter::ops::grayscale(&mut reordered);
        tint_filter::ops::adjust_contrast(&mut reordered, 1.5);
        assert_ne!(out, reordered);
    }

    #[test]
    fn test_rejects_partial_pixels() {
        let mut module = RecordingModule::new();
        let params = TransformParams::new(10, 0, 0).unwrap();
        let err = apply_to_bytes(&mut module, &[1, 2, 3, 4, 5], &params).unwrap_err();
        assert!(matches!(err, MarshalError::InvalidBuffer(5)));
        assert_eq!(module.allocations, 0);
    }

    #[test]
    fn test_allocation_failure_returns_no_buffer() {
        let mut module = RecordingModule::new();
        module.fail_alloc = true;
        let params = TransformParams::new(10, 0, 0).unwrap();
        let err = apply_filters(&mut module, &two_pixels(), &params).unwrap_err();
        assert!(matches!(err, MarshalError::Allocation { requested: 8, .. }));
        assert!(module.calls.is_empty());
        assert!(!module.is_poisoned());
    }

    #[test]
    fn test_trap_releases_region_and_poisons() {
        let mut module = RecordingModule::new();
        module.trap_on = Some(Capability::Brightness);
        let params = TransformParams::new(10, 10, 100).unwrap();
        let err = apply_filters(&mut module, &two_pixels(), &params).unwrap_err();

        assert!(matches!(err, MarshalError::Trap { op: Capability::Brightness, .. }));
        assert_eq!(module.releases, 1);
        assert!(module.live.is_empty());
        // contrast never ran
        assert_eq!(module.calls.len(), 2);
        assert!(module.is_poisoned());

        let err = apply_filters(&mut module, &two_pixels(), &params).unwrap_err();
        assert!(matches!(err, MarshalError::Poisoned));
    }

    #[test]
    fn test_release_failure_poisons() {
        let mut module = RecordingModule::new();
        module.fail_release = true;
        let params = TransformParams::new(0, 20, 0).unwrap();
        let err = apply_filters(&mut module, &two_pixels(), &params).unwrap_err();
        assert!(matches!(err, MarshalError::Release { ptr: 64, .. }));
        assert!(module.is_poisoned());
    }

    #[test]
    fn test_missing_capability_checked_before_allocation() {
        let mut module = RecordingModule::new();
        module.missing.push(Capability::Sepia);
        let params = TransformParams::default().with_sepia(true);
        let err = apply_filters(&mut module, &two_pixels(), &params).unwrap_err();
        assert!(matches!(err, MarshalError::MissingCapability(Capability::Sepia)));
        assert_eq!(module.allocations, 0);
    }
}

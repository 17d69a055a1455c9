use anyhow::Result;
use std::sync::Arc;
use tint_shared::wasm::Capability;
use tint_shared::{PixelBuffer, TransformParams};
use tint_wasm::{
    apply_filters, FilterError, FilterModule, MarshalError, ModuleLoadError, ModuleLoader,
    ModuleSource, RuntimeLimits, SharedFilterModule, WasmFilterModule, WasmRuntime,
};

const RECORDING_FILTERS: &str = include_str!("fixtures/recording_filters.wat");

fn load() -> Result<WasmFilterModule> {
    let runtime = WasmRuntime::new(RuntimeLimits::default())?;
    Ok(runtime.instantiate(RECORDING_FILTERS.as_bytes())?)
}

fn two_pixels() -> PixelBuffer {
    PixelBuffer::new(2, 1, vec![10, 20, 30, 255, 200, 210, 220, 255]).unwrap()
}

#[test]
fn test_grayscale_end_to_end() -> Result<()> {
    let mut module = load()?;
    let params = TransformParams::new(0, 0, 100)?;

    let out = apply_filters(&mut module, &two_pixels(), &params)?;

    assert_eq!(module.call_getter("grayscale_calls")?, 1);
    assert_eq!(module.call_getter("brightness_calls")?, 0);
    assert_eq!(module.call_getter("contrast_calls")?, 0);
    assert_eq!(module.call_getter("last_len")?, 8);
    assert_eq!(module.call_getter("last_ptr")?, 1024);
    assert_eq!(module.call_getter("live_allocations")?, 0);

    assert_eq!(out.len(), 8);
    for px in out.pixels() {
        assert!(px[0] == px[1] && px[1] == px[2]);
        assert_eq!(px[3], 255);
    }
    Ok(())
}

#[test]
fn test_fixed_order_through_wasm() -> Result<()> {
    let mut module = load()?;
    let input = PixelBuffer::new(1, 1, vec![10, 200, 30, 255])?;
    let params = TransformParams::new(100, 50, 100)?;

    let out = apply_filters(&mut module, &input, &params)?;

    // avg(10, 200, 30) = 80; +100 = 180; (180 - 128) * 1.5 + 128 = 206
    assert_eq!(out.as_bytes(), &[206, 206, 206, 255]);
    assert_eq!(module.call_getter("live_allocations")?, 0);
    Ok(())
}

#[test]
fn test_neutral_params_never_allocate() -> Result<()> {
    let mut module = load()?;
    let input = two_pixels();
    let once = apply_filters(&mut module, &input, &TransformParams::default())?;
    let twice = apply_filters(&mut module, &once, &TransformParams::default())?;
    assert_eq!(twice, input);
    assert_eq!(module.call_getter("grayscale_calls")?, 0);
    Ok(())
}

#[test]
fn test_allocation_failure_when_memory_exhausted() -> Result<()> {
    let mut module = load()?;
    // two pages of linear memory cannot hold a 256x256 image
    let big = PixelBuffer::new(256, 256, vec![7; 256 * 256 * 4])?;
    let err = apply_filters(&mut module, &big, &TransformParams::new(5, 0, 0)?).unwrap_err();
    assert!(matches!(err, MarshalError::Allocation { .. }));
    assert!(!module.is_poisoned());

    // the module is still usable afterwards
    let out = apply_filters(&mut module, &two_pixels(), &TransformParams::new(5, 0, 0)?)?;
    assert_eq!(&out.as_bytes()[..4], &[15, 25, 35, 255]);
    Ok(())
}

#[test]
fn test_trap_poisons_module() -> Result<()> {
    let mut module = load()?;
    let params = TransformParams::default().with_invert(true);
    let err = apply_filters(&mut module, &two_pixels(), &params).unwrap_err();
    assert!(matches!(err, MarshalError::Trap { op: Capability::Invert, .. }));
    assert!(module.is_poisoned());
    assert_eq!(module.call_getter("live_allocations")?, 0);
    Ok(())
}

#[test]
fn test_missing_transform_is_reported() -> Result<()> {
    let mut module = load()?;
    let err = apply_filters(
        &mut module,
        &two_pixels(),
        &TransformParams::default().with_sepia(true),
    )
    .unwrap_err();
    assert!(matches!(err, MarshalError::MissingCapability(Capability::Sepia)));
    Ok(())
}

#[tokio::test]
async fn test_shared_module_loads_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("image.wasm"), RECORDING_FILTERS)?;

    let loader = ModuleLoader::new(
        WasmRuntime::new(RuntimeLimits::default())?,
        ModuleSource::from_asset_root(dir.path()),
    );
    let shared = Arc::new(SharedFilterModule::new(loader));
    let params = TransformParams::new(10, 0, 0)?;

    // neutral requests load the module but leave its memory alone
    let out = shared.apply(&two_pixels(), &TransformParams::default()).await?;
    assert_eq!(out, two_pixels());
    assert_eq!(shared.load_count(), 1);
    let last_len = shared.with_module(|m| m.call_getter("last_len")).await??;
    assert_eq!(last_len, 0);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let shared = shared.clone();
        tasks.push(tokio::spawn(async move {
            shared.apply(&two_pixels(), &params).await
        }));
    }
    for task in tasks {
        let out = task.await??;
        assert_eq!(&out.as_bytes()[..4], &[20, 30, 40, 255]);
    }
    assert_eq!(shared.load_count(), 1);

    let live = shared
        .with_module(|m| m.call_getter("live_allocations"))
        .await??;
    assert_eq!(live, 0);
    Ok(())
}

#[tokio::test]
async fn test_shared_module_reloads_after_poison() -> Result<()> {
    let loader = ModuleLoader::new(
        WasmRuntime::new(RuntimeLimits::default())?,
        ModuleSource::Bytes(RECORDING_FILTERS.as_bytes().to_vec()),
    );
    let shared = SharedFilterModule::new(loader);

    let err = shared
        .apply(&two_pixels(), &TransformParams::default().with_invert(true))
        .await
        .unwrap_err();
    assert!(matches!(err, FilterError::Marshal(MarshalError::Trap { .. })));

    shared.apply(&two_pixels(), &TransformParams::new(0, 0, 100)?).await?;
    assert_eq!(shared.load_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_missing_module_file() -> Result<()> {
    let loader = ModuleLoader::new(
        WasmRuntime::new(RuntimeLimits::default())?,
        ModuleSource::Path("/nonexistent/tint/image.wasm".into()),
    );
    let shared = SharedFilterModule::new(loader);
    let err = shared.ensure_loaded().await.unwrap_err();
    assert!(matches!(err, ModuleLoadError::Fetch { .. }));
    Ok(())
}

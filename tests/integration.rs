use assert_fs::prelude::*;
use assert_fs::TempDir;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use pixelhorizon::prelude::*;
use pixelhorizon::{
    BackgroundService, FinalStep, ImageToolError, OperationKind, PotraceTracer, Result,
    TargetFormat, TraceParams, TraceTool,
};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Returns a transparent PNG of the same size, except for 13px-wide inputs,
/// which the "service" rejects.
struct FakeRemover;

impl BackgroundService for FakeRemover {
    fn remove_background(&self, image: &[u8], _api_key: &str) -> Result<Vec<u8>> {
        let decoded = image::load_from_memory(image)?;
        if decoded.width() == 13 {
            return Err(ImageToolError::Service {
                status: 500,
                message: "cannot find foreground".to_string(),
            });
        }

        let mut out = Cursor::new(Vec::new());
        RgbaImage::from_pixel(decoded.width(), decoded.height(), Rgba([0, 0, 0, 0]))
            .write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}

struct FakeTracer;

impl TraceTool for FakeTracer {
    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    fn trace(&self, _bitmap: &[u8], params: &TraceParams) -> Result<Vec<u8>> {
        Ok(format!("<svg fill=\"{}\"></svg>", params.color).into_bytes())
    }
}

fn fake_services(api_key: Option<&str>) -> Services {
    Services {
        background: Arc::new(FakeRemover),
        api_key: api_key.map(str::to_string),
        tracer: Arc::new(FakeTracer),
    }
}

fn batch(config: PipelineConfig, services: Services) -> BatchProcessor {
    BatchProcessor::new(Pipeline::new(config, services).unwrap(), 0).unwrap()
}

fn write_image(path: &Path, width: u32, height: u32) {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([30, 120, 200, 255]),
    ));
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("jpg") | Some("jpeg") => image.to_rgb8().save(path).unwrap(),
        _ => image.save(path).unwrap(),
    }
}

fn request_for(inputs: &[PathBuf]) -> BatchRequest {
    BatchRequest {
        inputs: inputs.to_vec(),
        ..Default::default()
    }
}

#[test]
fn test_convert_all_supported_pairs() {
    let temp = TempDir::new().unwrap();

    for source_ext in ["png", "jpg", "jpeg", "ico"] {
        let source = temp.child(format!("logo.{}", source_ext));
        write_image(source.path(), 32, 32);

        for target in TargetFormat::ALL {
            let output = temp.child(format!("out/{}_to.{}", source_ext, target.extension()));
            let request = BatchRequest {
                inputs: vec![source.path().to_path_buf()],
                output: Some(output.path().to_path_buf()),
                ..Default::default()
            };
            let config = PipelineConfig {
                final_step: Some(FinalStep::Convert(target)),
                ..Default::default()
            };

            let result = batch(config, fake_services(None)).run(&request).unwrap();
            assert!(!result.has_failures(), "{} -> {:?}", source_ext, target);

            let bytes = std::fs::read(output.path()).unwrap();
            assert_eq!(image::guess_format(&bytes).unwrap(), target.image_format());
            let decoded = image::load_from_memory(&bytes)
                .unwrap_or_else(|e| panic!("{} -> {:?}: {}", source_ext, target, e));
            assert_eq!((decoded.width(), decoded.height()), (32, 32));
        }
    }
}

#[test]
fn test_grayscale_ico_then_convert() {
    let temp = TempDir::new().unwrap();
    let source = temp.child("icon.ico");
    write_image(source.path(), 16, 16);

    let gray = PipelineConfig {
        grayscale: true,
        ..Default::default()
    };
    let result = batch(gray, fake_services(None))
        .run(&request_for(&[source.path().to_path_buf()]))
        .unwrap();
    assert!(!result.has_failures(), "{:?}", result.failed);
    let gray_icon = temp.child("icon_grayscale.ico");
    image::open(gray_icon.path()).unwrap();

    let chained = PipelineConfig {
        grayscale: true,
        final_step: Some(FinalStep::Convert(TargetFormat::Jpg)),
        ..Default::default()
    };
    let result = batch(chained, fake_services(None))
        .run(&request_for(&[source.path().to_path_buf()]))
        .unwrap();
    assert!(!result.has_failures(), "{:?}", result.failed);
    let jpg = image::open(temp.child("icon_processed.jpg").path()).unwrap();
    assert_eq!((jpg.width(), jpg.height()), (16, 16));
}

#[test]
fn test_rgba_to_jpeg_is_opaque_with_white_background() {
    let temp = TempDir::new().unwrap();
    let source = temp.child("logo.png");
    let mut pixels = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
    pixels.put_pixel(9, 9, Rgba([0, 0, 0, 255]));
    pixels.save(source.path()).unwrap();

    let config = PipelineConfig {
        final_step: Some(FinalStep::Convert(TargetFormat::Jpg)),
        ..Default::default()
    };
    let result = batch(config, fake_services(None))
        .run(&request_for(&[source.path().to_path_buf()]))
        .unwrap();

    let output = temp.child("logo.jpg");
    assert_eq!(result.succeeded[0].output, output.path());

    let decoded = image::open(output.path()).unwrap();
    assert!(!decoded.color().has_alpha());
    let corner = decoded.get_pixel(0, 0);
    assert!(corner[0] > 245 && corner[1] > 245 && corner[2] > 245);
}

#[test]
fn test_resize_is_exact() {
    let temp = TempDir::new().unwrap();
    let source = temp.child("wide.png");
    write_image(source.path(), 300, 100);

    let config = PipelineConfig {
        resize: Some((100, 150)),
        ..Default::default()
    };
    let result = batch(config, fake_services(None))
        .run(&request_for(&[source.path().to_path_buf()]))
        .unwrap();

    let output = &result.succeeded[0].output;
    assert_eq!(output, &temp.child("wide_resized.png").path().to_path_buf());
    assert_eq!(image::open(output).unwrap().dimensions(), (100, 150));
}

#[test]
fn test_identity_pipeline_is_byte_for_byte() {
    let temp = TempDir::new().unwrap();
    let source = temp.child("logo.png");
    write_image(source.path(), 8, 8);
    let out_dir = temp.child("copies");

    let request = BatchRequest {
        inputs: vec![source.path().to_path_buf()],
        output: Some(out_dir.path().to_path_buf()),
        ..Default::default()
    };
    let result = batch(PipelineConfig::default(), fake_services(None))
        .run(&request)
        .unwrap();

    let output = out_dir.child("logo.png");
    assert_eq!(result.succeeded[0].output, output.path());
    assert_eq!(
        std::fs::read(output.path()).unwrap(),
        std::fs::read(source.path()).unwrap()
    );
}

#[test]
fn test_default_naming_beside_source() {
    let temp = TempDir::new().unwrap();
    let source = temp.child("logo.png");
    write_image(source.path(), 8, 8);
    let inputs = [source.path().to_path_buf()];

    let convert = PipelineConfig {
        final_step: Some(FinalStep::Convert(TargetFormat::Jpg)),
        ..Default::default()
    };
    let result = batch(convert, fake_services(None)).run(&request_for(&inputs)).unwrap();
    assert_eq!(result.succeeded[0].output, temp.child("logo.jpg").path());

    let gray = PipelineConfig {
        grayscale: true,
        ..Default::default()
    };
    let result = batch(gray, fake_services(None)).run(&request_for(&inputs)).unwrap();
    assert_eq!(result.succeeded[0].output, temp.child("logo_grayscale.png").path());
}

#[test]
fn test_single_file_output_with_many_inputs_is_rejected_up_front() {
    let temp = TempDir::new().unwrap();
    let a = temp.child("a.png");
    let b = temp.child("b.png");
    write_image(a.path(), 4, 4);
    write_image(b.path(), 4, 4);
    let before = std::fs::read(a.path()).unwrap();
    let target = temp.child("out.png");

    let request = BatchRequest {
        inputs: vec![a.path().to_path_buf(), b.path().to_path_buf()],
        output: Some(target.path().to_path_buf()),
        ..Default::default()
    };
    let config = PipelineConfig {
        grayscale: true,
        ..Default::default()
    };
    let err = batch(config, fake_services(None)).run(&request).unwrap_err();

    assert!(matches!(err, ImageToolError::ConfigConflict(_)));
    assert!(!target.path().exists());
    assert!(!temp.child("a_grayscale.png").path().exists());
    assert!(!temp.child("b_grayscale.png").path().exists());
    assert_eq!(std::fs::read(a.path()).unwrap(), before);
}

#[test]
fn test_one_background_failure_does_not_stop_the_batch() {
    let temp = TempDir::new().unwrap();
    for (name, width) in [("a.png", 10), ("b.png", 13), ("c.jpg", 10)] {
        write_image(temp.child(name).path(), width, 10);
    }

    let request = BatchRequest {
        input_dir: Some(temp.path().to_path_buf()),
        output: Some(temp.child("out").path().to_path_buf()),
        ..Default::default()
    };
    let config = PipelineConfig {
        remove_background: true,
        ..Default::default()
    };
    let result = batch(config, fake_services(Some("key"))).run(&request).unwrap();

    assert_eq!(result.succeeded.len(), 2);
    assert_eq!(result.failed.len(), 1);

    let failure = &result.failed[0];
    assert_eq!(failure.source, temp.child("b.png").path());
    assert_eq!(failure.stage(), Some(OperationKind::RemoveBackground));
    assert!(matches!(failure.error.root(), ImageToolError::Service { status: 500, .. }));

    assert!(temp.child("out/a.png").path().exists());
    assert!(temp.child("out/c.png").path().exists());
    assert!(!temp.child("out/b.png").path().exists());
}

#[test]
fn test_missing_credential_fails_only_background_tasks() {
    let temp = TempDir::new().unwrap();
    let source = temp.child("logo.jpg");
    write_image(source.path(), 6, 6);

    let config = PipelineConfig {
        resize: Some((3, 3)),
        remove_background: true,
        ..Default::default()
    };
    let result = batch(config, fake_services(None))
        .run(&request_for(&[source.path().to_path_buf()]))
        .unwrap();

    assert!(result.succeeded.is_empty());
    assert_eq!(result.failed.len(), 1);
    assert!(matches!(result.failed[0].error.root(), ImageToolError::MissingCredential));
    let message = result.failed[0].error.to_string();
    assert!(message.contains("remove-background"));
}

#[test]
fn test_missing_tool_fails_every_vectorize_task_cleanly() {
    let temp = TempDir::new().unwrap();
    let scratch = temp.child("scratch");
    scratch.create_dir_all().unwrap();
    let tools = temp.child("tools");
    tools.create_dir_all().unwrap();
    let images = temp.child("images");
    images.create_dir_all().unwrap();
    for name in ["a.png", "b.png", "c.png"] {
        write_image(images.child(name).path(), 8, 8);
    }
    let out_dir = temp.child("svg");

    let config = PipelineConfig {
        grayscale: true,
        final_step: Some(FinalStep::Vectorize(TraceParams::default())),
        scratch_root: Some(scratch.path().to_path_buf()),
        ..Default::default()
    };
    let tracer = PotraceTracer::new(tools.path(), Duration::from_secs(5))
        .with_executable("pixelhorizon-missing-potrace")
        .with_scratch_root(Some(scratch.path().to_path_buf()));
    let services = Services {
        tracer: Arc::new(tracer),
        ..fake_services(None)
    };

    let request = BatchRequest {
        input_dir: Some(images.path().to_path_buf()),
        output: Some(out_dir.path().to_path_buf()),
        ..Default::default()
    };
    let result = batch(config, services).run(&request).unwrap();

    assert!(result.succeeded.is_empty());
    assert_eq!(result.failed.len(), 3);
    for failure in &result.failed {
        assert_eq!(failure.stage(), Some(OperationKind::Vectorize));
        assert!(matches!(failure.error.root(), ImageToolError::ToolMissing(_)));
    }

    assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(images.path()).unwrap().count(), 3);
}

#[test]
fn test_vectorize_through_fake_tracer() {
    let temp = TempDir::new().unwrap();
    let source = temp.child("logo.png");
    write_image(source.path(), 8, 8);

    let config = PipelineConfig {
        final_step: Some(FinalStep::Vectorize(TraceParams {
            color: "#ff0000".to_string(),
            ..Default::default()
        })),
        ..Default::default()
    };
    let result = batch(config, fake_services(None))
        .run(&request_for(&[source.path().to_path_buf()]))
        .unwrap();

    let output = temp.child("logo.svg");
    assert_eq!(result.succeeded[0].output, output.path());
    output.assert("<svg fill=\"#ff0000\"></svg>");
}

#[test]
fn test_invalid_file() {
    let pipeline = Pipeline::new(PipelineConfig::default(), fake_services(None)).unwrap();
    let result = pipeline.run(&ImageTask::new("nonexistent.jpg", OutputTarget::BesideSource));

    assert!(matches!(result, Err(ImageToolError::InputNotFound(_))));
}

//! Integration tests for building and dispatching kernels.

use std::sync::Arc;
use std::thread;

use kernelweave::prelude::*;
use kernelweave::codegen::CodegenError;
use kernelweave::{ImageHandle, RecordingProgram};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn copy_kernel(backend: Arc<RecordingBackend>) -> CompiledKernel<RecordingBackend> {
    let definition = KernelDefinition::block_mapper(
        "copy",
        "for (int i = 0; i < BLOCK_SIZE_IN; ++i)\n    b[out_offset + i] = a[in_offset + i];",
        BlockSizes::new(4, 4),
    )
    .with_argument(ArgumentSpec::global_buffer("a", NumericType::F32))
    .with_argument(ArgumentSpec::global_buffer("b", NumericType::F32));
    CompiledKernel::new(backend, definition)
}

/// Two float buffers, block size 4, called over 100 items with `b` by keyword.
#[test]
fn test_copy_kernel_dispatches_logical_length() {
    init_logging();
    let backend = Arc::new(RecordingBackend::new());
    let kernel = copy_kernel(Arc::clone(&backend));
    let queue = RecordingQueue::new();

    let a = BufferHandle::new(1, 1600);
    let b = BufferHandle::new(2, 1600);
    kernel
        .call(&queue, 100, CallArgs::new().arg(a).kwarg("b", b))
        .expect("call failed");

    let dispatches = queue.dispatches();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].dims.global, vec![100]);
    assert_eq!(dispatches[0].dims.local, None);
    assert_eq!(dispatches[0].args, vec![KernelArg::Buffer(a), KernelArg::Buffer(b)]);

    let source = &backend.sources()[0];
    assert!(source.contains("#define BLOCK_SIZE_IN 4"));
    assert!(source.contains("__global float *a,\n    __global float *b)"));
}

#[test]
fn test_four_axis_layout_fails_before_compiling() {
    let backend = Arc::new(RecordingBackend::new());
    let definition = KernelDefinition::new("wide", "x;")
        .with_argument(ArgumentSpec::global_buffer("a", "float"))
        .with_threads(LayoutSpec::threads([2, 2, 2, 2]));
    let kernel = CompiledKernel::new(Arc::clone(&backend), definition);
    let queue = RecordingQueue::new();

    let err = kernel
        .call(&queue, 10, CallArgs::new().arg(BufferHandle::new(1, 40)))
        .unwrap_err();

    assert!(matches!(
        err,
        KernelError::Codegen(CodegenError::UnsupportedLayout { axes: 4, .. })
    ));
    assert_eq!(backend.compile_count(), 0);
    assert!(kernel.source().is_none());
    assert!(queue.is_empty());
}

#[test]
fn test_missing_argument_names_the_gap() {
    let kernel = copy_kernel(Arc::new(RecordingBackend::new()));
    let queue = RecordingQueue::new();

    let err = kernel
        .call(&queue, 100, CallArgs::new().arg(BufferHandle::new(1, 1600)))
        .unwrap_err();

    assert_eq!(err.to_string(), "Missing argument: b");
    assert!(queue.is_empty());
}

#[test]
fn test_invalid_type_reports_argument_context() {
    let backend = Arc::new(RecordingBackend::new());
    let definition = KernelDefinition::new("k", "x;")
        .with_argument(ArgumentSpec::global_buffer("a", "float"))
        .with_argument(ArgumentSpec::scalar("gain", "float5"));
    let kernel = CompiledKernel::new(Arc::clone(&backend), definition);

    match kernel.build().unwrap_err() {
        KernelError::Codegen(CodegenError::InvalidType { index, argument, value, .. }) => {
            assert_eq!(index, 1);
            assert_eq!(argument, "gain");
            assert_eq!(value, "float5");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.compile_count(), 0);
}

#[test]
fn test_postprocess_wraps_primary_expression() {
    let backend = Arc::new(RecordingBackend::new());
    let primary = ObjectFragment::new("a[gid] * gain")
        .with_argument(ArgumentSpec::global_buffer("a", "float"))
        .with_argument(ArgumentSpec::scalar("gain", "float"));
    let post = MappingFragment::new()
        .with("expression", "out[gid] = clamp($expression, 0.0f, 1.0f);")
        .with("arguments", vec![ArgumentSpec::global_buffer("out", "float")]);
    let definition = KernelDefinition::new("gain_clamp", primary).with_postprocess(post);
    let kernel = CompiledKernel::new(Arc::clone(&backend), definition);

    let built = kernel.build().unwrap();
    let names: Vec<&str> = built.schema.names().collect();
    assert_eq!(names, vec!["a", "gain", "out"]);
    assert!(built
        .source
        .contains("    out[gid] = clamp(a[gid] * gain, 0.0f, 1.0f);\n"));
}

#[test]
fn test_struct_argument_round_trip() {
    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Params {
        gain: f32,
        count: u32,
    }

    let layout = StructLayout::new().field("gain", "float").field("count", "uint");
    let definition = KernelDefinition::new("apply", "out[gid] = p.gain * (float)p.count;")
        .with_argument(ArgumentSpec::global_buffer("out", "float"))
        .with_argument(ArgumentSpec::structure("p", layout));
    let kernel = CompiledKernel::new(Arc::new(RecordingBackend::new()), definition);
    let queue = RecordingQueue::new();

    kernel
        .call(
            &queue,
            8,
            CallArgs::new()
                .arg(BufferHandle::new(1, 32))
                .arg(KernelArg::from_pod(&Params { gain: 0.5, count: 3 })),
        )
        .unwrap();

    let source = kernel.source().unwrap();
    assert_eq!(source.matches("} p_t;").count(), 1);
    assert!(source.contains("    p_t p)"));
    match &queue.dispatches()[0].args[1] {
        KernelArg::Bytes(bytes) => assert_eq!(bytes.len(), 8),
        other => panic!("unexpected argument {other:?}"),
    }
}

#[test]
fn test_texture_writer_dispatch() {
    let definition = KernelDefinition::texture_writer(
        "fill",
        "write_imagef(dest, coord, color);",
        32,
        16,
    )
    .expect("texture writer")
    .with_argument(ArgumentSpec::scalar("color", "float4"));
    let kernel = CompiledKernel::new(Arc::new(RecordingBackend::new()), definition);
    let queue = RecordingQueue::new();
    let image = ImageHandle {
        id: 7,
        extent: [32, 16, 1],
    };

    kernel
        .call(
            &queue,
            32 * 16,
            CallArgs::new()
                .kwarg("color", KernelArg::Bytes(vec![0; 16]))
                .kwarg("dest", image),
        )
        .unwrap();

    let dispatch = &queue.dispatches()[0];
    assert_eq!(dispatch.dims.global, vec![512]);
    assert_eq!(dispatch.args[0], KernelArg::Image(image));
    assert!(kernel
        .source()
        .unwrap()
        .contains("__write_only image2d_t dest,\n    float4 color)"));
}

#[test]
fn test_rebuilding_produces_identical_source() {
    let first = copy_kernel(Arc::new(RecordingBackend::new()));
    let second = copy_kernel(Arc::new(RecordingBackend::new()));

    let a = first.build().unwrap();
    let b = second.build().unwrap();
    assert_eq!(a.source, b.source);
    assert_eq!(a.source_hash, b.source_hash);
}

#[test]
fn test_concurrent_first_calls_build_once() {
    let backend = Arc::new(RecordingBackend::new());
    let kernel = Arc::new(copy_kernel(Arc::clone(&backend)));
    let queue = RecordingQueue::new();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let kernel = Arc::clone(&kernel);
            let queue = queue.clone();
            thread::spawn(move || {
                kernel
                    .call(
                        &queue,
                        10 + i,
                        CallArgs::new()
                            .arg(BufferHandle::new(1, 1600))
                            .kwarg("b", BufferHandle::new(2, 1600)),
                    )
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(backend.compile_count(), 1);
    assert_eq!(queue.len(), 8);
    let programs: Vec<RecordingProgram> = backend.programs();
    assert!(queue.dispatches().iter().all(|d| d.program == programs[0].id));
}

#[test]
fn test_dispatch_rejection_surfaces() {
    let kernel = copy_kernel(Arc::new(RecordingBackend::new()));
    let queue = RecordingQueue::new();
    queue.set_rejecting(Some("out of resources".to_string()));

    let err = kernel
        .call(
            &queue,
            100,
            CallArgs::new()
                .arg(BufferHandle::new(1, 1600))
                .arg(BufferHandle::new(2, 1600)),
        )
        .unwrap_err();
    assert!(matches!(err, KernelError::Dispatch(ref r) if r == "out of resources"));
}

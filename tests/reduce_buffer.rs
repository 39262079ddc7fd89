//! Integration tests for buffer reductions on a real WebGPU device.
//!
//! Every test returns early when no subgroup-capable adapter is present.

mod common;

use std::sync::Arc;

use common::{download, random_i32, random_small_f32, random_u32, setup, upload};
use wgreduce::prelude::*;
use wgreduce::runtime::wgpu::WgpuDevice;

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_multi_pass_u32_sum() {
    let Some(client) = setup() else { return };
    let data = random_u32(1_048_593, 16);
    let expected: u32 = data.iter().sum();

    let input = upload(&client, "values", &data);
    let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32));
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert_eq!(reducer.reduce().unwrap(), expected);
    assert_eq!(reducer.state(), ReduceState::Ready);
    assert_eq!(reducer.plan().unwrap().len(), 3);
}

#[test]
fn test_f32_sum() {
    let Some(client) = setup() else { return };
    let data = random_small_f32(100_000);
    let expected: f32 = data.iter().sum();

    let input = upload(&client, "values", &data);
    let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::F32));
    let mut reducer = ReduceBuffer::<f32>::new(params).unwrap();

    assert_eq!(reducer.reduce().unwrap(), expected);
}

#[test]
fn test_i32_min_max() {
    let Some(client) = setup() else { return };
    let data = random_i32(70_001, 1 << 20);
    let input = upload(&client, "values", &data);

    let mut min = ReduceBuffer::<i32>::new(ReduceBufferParams::new(
        client.clone(),
        input.clone(),
        BinOp::min(ScalarType::I32),
    ))
    .unwrap();
    let mut max = ReduceBuffer::<i32>::new(ReduceBufferParams::new(
        client,
        input,
        BinOp::max(ScalarType::I32),
    ))
    .unwrap();

    assert_eq!(min.reduce().unwrap(), *data.iter().min().unwrap());
    assert_eq!(max.reduce().unwrap(), *data.iter().max().unwrap());
}

#[test]
fn test_u32_product() {
    let Some(client) = setup() else { return };
    let mut data = vec![1u32; 5000];
    for i in 0..10 {
        data[i * 487 + 3] = 2;
    }

    let input = upload(&client, "values", &data);
    let params = ReduceBufferParams::new(client, input, BinOp::product(ScalarType::U32));
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert_eq!(reducer.reduce().unwrap(), 1024);
}

#[test]
fn test_custom_binop() {
    let Some(client) = setup() else { return };
    let data: Vec<u32> = (0..3000).map(|i| 1 << (i % 32)).collect();

    let or = BinOp::new("bit_or", ScalarType::U32, "0u", "a | b", "subgroupOr").unwrap();
    let input = upload(&client, "values", &data);
    let mut reducer = ReduceBuffer::<u32>::new(ReduceBufferParams::new(client, input, or)).unwrap();

    assert_eq!(reducer.reduce().unwrap(), u32::MAX);
}

#[test]
fn test_sum_of_squares_with_map() {
    let Some(client) = setup() else { return };
    let data: Vec<u32> = (0..2048).map(|i| i % 10).collect();
    let expected: u32 = data.iter().map(|v| v * v).sum();

    let input = upload(&client, "values", &data);
    let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32))
        .map_fn(MapFn::new("value * value").unwrap());
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert_eq!(reducer.reduce().unwrap(), expected);
}

// ============================================================================
// Layouts
// ============================================================================

#[test]
fn test_single_element_is_copied() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "one", &[42u32]);
    let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32));
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert_eq!(reducer.reduce().unwrap(), 42);
    assert!(reducer.plan().unwrap().is_empty());
    assert!(reducer.kernel_key().is_none());
}

#[test]
fn test_single_element_with_map() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "one", &[-7i32]);
    let params = ReduceBufferParams::new(client, input, BinOp::max(ScalarType::I32))
        .map_fn(MapFn::new("abs(value)").unwrap());
    let mut reducer = ReduceBuffer::<i32>::new(params).unwrap();

    assert_eq!(reducer.reduce().unwrap(), 7);
    assert!(reducer.kernel_key().is_some());
}

#[test]
fn test_destination_offset() {
    let Some(client) = setup() else { return };
    let data = random_u32(9000, 100);
    let expected: u32 = data.iter().sum();

    let input = upload(&client, "values", &data);
    let output = upload(&client, "slots", &[0xdead_u32; 4]);
    let params = ReduceBufferParams::new(client.clone(), input, BinOp::sum(ScalarType::U32))
        .output_buffer(output.clone(), 8);
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert_eq!(reducer.reduce().unwrap(), expected);
    assert_eq!(
        download::<u32>(&client, &output, 4),
        vec![0xdead, 0xdead, expected, 0xdead]
    );
}

#[test]
fn test_strided_input() {
    let Some(client) = setup() else { return };
    let n = 5000;
    let interleaved: Vec<u32> = (0..n).flat_map(|i| [1000, i % 7]).collect();
    let expected: u32 = (0..n).map(|i| i % 7).sum();

    let input = upload(&client, "pairs", &interleaved);
    let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32))
        .input_layout(4, Some(8));
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert_eq!(reducer.reduce().unwrap(), expected);
}

#[test]
fn test_element_count_prefix() {
    let Some(client) = setup() else { return };
    let data: Vec<u32> = (0..4096).collect();

    let input = upload(&client, "values", &data);
    let params =
        ReduceBufferParams::new(client, input, BinOp::max(ScalarType::U32)).element_count(1000);
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert_eq!(reducer.reduce().unwrap(), 999);
}

#[test]
fn test_small_workgroup_tuning() {
    let Some(client) = setup() else { return };
    let data = random_u32(33_333, 50);
    let expected: u32 = data.iter().sum();

    let tuning = ReduceTuning {
        workgroup_size: 64,
        elements_per_thread: 2,
        subgroup_min_size: None,
    };
    let input = upload(&client, "values", &data);
    let params =
        ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32)).tuning(tuning);
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert_eq!(reducer.reduce().unwrap(), expected);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_pipeline_shared_between_sessions() {
    if setup().is_none() {
        return;
    }
    let Ok(client) = WgpuClient::new_uncached(WgpuDevice::new(0)) else {
        return;
    };

    let a = upload(&client, "a", &random_u32(3000, 10));
    let b = upload(&client, "b", &random_u32(77_000, 10));
    let mut first = ReduceBuffer::<u32>::new(ReduceBufferParams::new(
        client.clone(),
        a,
        BinOp::sum(ScalarType::U32),
    ))
    .unwrap();
    let mut second = ReduceBuffer::<u32>::new(ReduceBufferParams::new(
        client.clone(),
        b,
        BinOp::sum(ScalarType::U32),
    ))
    .unwrap();

    let before = client.pipeline_cache().build_count();
    first.reduce().unwrap();
    second.reduce().unwrap();

    assert_eq!(client.pipeline_cache().build_count() - before, 1);
    let key = first.kernel_key().unwrap();
    assert_eq!(Some(key), second.kernel_key());
    assert!(client.pipeline_cache().get(key).is_some());
}

#[test]
fn test_rebind_input() {
    let Some(client) = setup() else { return };
    let a = upload(&client, "a", &vec![1u32; 5000]);
    let b = upload(&client, "b", &vec![2u32; 5000]);
    let c = upload(&client, "c", &vec![3u32; 100]);

    let params = ReduceBufferParams::new(client, a, BinOp::sum(ScalarType::U32));
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();
    assert_eq!(reducer.reduce().unwrap(), 5000);

    // Same element count keeps the plan
    reducer.set_input_buffer(b);
    assert_eq!(reducer.state(), ReduceState::Uninitialized);
    assert!(reducer.plan().is_some());
    assert_eq!(reducer.reduce().unwrap(), 10_000);

    // A different count replans
    reducer.set_input_buffer(c);
    assert!(reducer.plan().is_none());
    assert_eq!(reducer.reduce().unwrap(), 300);
    assert_eq!(reducer.plan().unwrap().len(), 1);
}

#[test]
fn test_set_binop() {
    let Some(client) = setup() else { return };
    let data: Vec<u32> = (1..=2000).collect();
    let input = upload(&client, "values", &data);

    let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32));
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();
    assert_eq!(reducer.reduce().unwrap(), 2000 * 2001 / 2);
    let sum_key = reducer.kernel_key().unwrap().clone();

    reducer.set_binop(BinOp::max(ScalarType::U32)).unwrap();
    assert_eq!(reducer.reduce().unwrap(), 2000);
    assert_ne!(reducer.kernel_key(), Some(&sum_key));

    assert!(matches!(
        reducer.set_binop(BinOp::max(ScalarType::F32)),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_destroy_and_rebuild() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "values", &vec![5u32; 4000]);
    let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32));
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();
    assert_eq!(reducer.reduce().unwrap(), 20_000);

    reducer.destroy();
    assert!(reducer.output_buffer().is_none());
    assert!(reducer.plan().is_none());
    assert_eq!(reducer.state(), ReduceState::Uninitialized);

    assert_eq!(reducer.reduce().unwrap(), 20_000);
    assert!(reducer.output_buffer().is_some());
}

#[test]
fn test_batched_encode() {
    let Some(client) = setup() else { return };
    let data = random_u32(12_345, 1000);
    let input = upload(&client, "values", &data);
    let output = upload(&client, "results", &[0u32; 2]);

    let mut sum = ReduceBuffer::<u32>::new(
        ReduceBufferParams::new(client.clone(), input.clone(), BinOp::sum(ScalarType::U32))
            .output_buffer(output.clone(), 0),
    )
    .unwrap();
    let mut max = ReduceBuffer::<u32>::new(
        ReduceBufferParams::new(client.clone(), input, BinOp::max(ScalarType::U32))
            .output_buffer(output.clone(), 4),
    )
    .unwrap();

    let mut encoder = client
        .wgpu_device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("batch") });
    let shaders: [&mut dyn HostedShader; 2] = [&mut sum, &mut max];
    for shader in shaders {
        shader.encode(&mut encoder).unwrap();
    }
    client.submit_and_wait(encoder).unwrap();

    assert_eq!(
        download::<u32>(&client, &output, 2),
        vec![data.iter().sum(), *data.iter().max().unwrap()]
    );
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_compilation_error() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "values", &[1u32; 512]);
    let bad = BinOp::new("bad", ScalarType::U32, "0u", "a +* b", "subgroupAdd").unwrap();
    let mut reducer = ReduceBuffer::<u32>::new(ReduceBufferParams::new(client, input, bad)).unwrap();

    assert!(matches!(reducer.reduce(), Err(Error::Compilation(_))));
    assert_eq!(reducer.state(), ReduceState::Uninitialized);
}

#[test]
fn test_type_mismatch() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "values", &[1u32; 16]);
    let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::F32));

    assert!(matches!(
        ReduceBuffer::<u32>::new(params),
        Err(Error::TypeMismatch {
            expected: ScalarType::U32,
            got: ScalarType::F32,
        })
    ));
}

#[test]
fn test_zero_elements() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "values", &[1u32; 16]);
    let params =
        ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32)).element_count(0);
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert!(matches!(
        reducer.reduce(),
        Err(Error::Configuration {
            field: "element_count",
            ..
        })
    ));
}

#[test]
fn test_count_past_end() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "values", &[1u32; 16]);
    let params =
        ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32)).element_count(17);
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert!(matches!(
        reducer.reduce(),
        Err(Error::Configuration {
            field: "element_count",
            ..
        })
    ));
}

#[test]
fn test_arc_input_is_shared() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "values", &[3u32; 300]);
    let params = ReduceBufferParams::new(client, input.clone(), BinOp::sum(ScalarType::U32));
    let reducer = ReduceBuffer::<u32>::new(params).unwrap();

    assert!(Arc::ptr_eq(reducer.input_buffer(), &input));
}

#[test]
fn test_invalid_tuning_fails_at_creation() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "values", &[1u32; 4096]);

    let cases = [(1, None), (96, None), (256, Some(1)), (64, Some(128))];
    for (workgroup_size, subgroup_min_size) in cases {
        let tuning = ReduceTuning {
            workgroup_size,
            elements_per_thread: 4,
            subgroup_min_size,
        };
        let params =
            ReduceBufferParams::new(client.clone(), input.clone(), BinOp::sum(ScalarType::U32))
                .tuning(tuning);
        assert!(
            matches!(ReduceBuffer::<u32>::new(params), Err(Error::Configuration { .. })),
            "{tuning:?}"
        );
    }
}

#[test]
fn test_workgroup_over_device_limit() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "values", &[1u32; 4096]);
    let too_wide = client.device().limits().max_compute_invocations_per_workgroup * 2;

    let tuning = ReduceTuning {
        workgroup_size: too_wide.next_power_of_two(),
        elements_per_thread: 1,
        subgroup_min_size: None,
    };
    let params =
        ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32)).tuning(tuning);

    assert!(matches!(
        ReduceBuffer::<u32>::new(params),
        Err(Error::BackendLimitation { .. })
    ));
}

#[test]
fn test_offset_overflow() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "values", &[1u32; 64]);

    let output = upload(&client, "out", &[0u32; 4]);
    let params =
        ReduceBufferParams::new(client.clone(), input.clone(), BinOp::sum(ScalarType::U32))
            .output_buffer(output, u64::MAX - 3);
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();
    assert!(matches!(
        reducer.reduce(),
        Err(Error::Configuration {
            field: "destination_offset",
            ..
        })
    ));

    let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32))
        .input_layout(u64::MAX - 3, None);
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();
    assert!(matches!(
        reducer.reduce(),
        Err(Error::Configuration {
            field: "element_count",
            ..
        })
    ));
}

#[test]
fn test_owned_output_offset_overflow() {
    let Some(client) = setup() else { return };
    let input = upload(&client, "values", &[1u32; 64]);
    let mut params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32));
    params.destination_offset = u64::MAX - 1;

    assert!(matches!(
        ReduceBuffer::<u32>::new(params),
        Err(Error::Configuration {
            field: "destination_offset",
            ..
        })
    ));
}

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::backend::{MemoryClass, PipelineHandle, ShaderStage};
use crate::cmd::{encode_draw, encode_end_encoding, encode_set_pipeline, DrawArgs};
use crate::command_buffer::CommandBufferError;
use crate::context::{BridgeConfig, BridgeContext, GpuInfo, VENDOR_ID_NVIDIA};
use crate::pipeline_cache::RenderPipelineDesc;
use crate::testing::TestDriver;
use crate::CommandBufferState;

const TIMEOUT: Duration = Duration::from_secs(1);

fn context() -> (BridgeContext, Arc<TestDriver>) {
    let driver = Arc::new(TestDriver::new());
    let gpu = GpuInfo::probe(VENDOR_ID_NVIDIA, 0x13C2).unwrap();
    (
        BridgeContext::new(gpu, BridgeConfig::default(), driver.clone()),
        driver,
    )
}

fn draw_args() -> DrawArgs {
    DrawArgs {
        vertex_count: 3,
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    }
}

#[test]
fn wait_before_commit_fails() {
    let (ctx, _) = context();
    let mut cb = ctx.create_command_buffer();
    assert_eq!(
        cb.wait_until_completed(TIMEOUT),
        Err(CommandBufferError::NotCommitted)
    );
    assert_eq!(cb.state(), CommandBufferState::Recording);
}

#[test]
fn commit_then_wait_reaches_completed() {
    let (ctx, driver) = context();
    let mut cb = ctx.create_command_buffer();

    let mut enc = cb.begin_render_encoder().unwrap();
    enc.set_pipeline(PipelineHandle(1)).unwrap();
    enc.draw(draw_args()).unwrap();
    enc.end_encoding().unwrap();

    cb.commit().unwrap();
    assert_eq!(cb.state(), CommandBufferState::Committed);
    assert_eq!(driver.boundary.submissions().len(), 1);

    cb.wait_until_completed(TIMEOUT).unwrap();
    assert_eq!(cb.state(), CommandBufferState::Completed);

    // Waiting again is a no-op.
    cb.wait_until_completed(TIMEOUT).unwrap();
}

#[test]
fn double_commit_flushes_once() {
    let (ctx, driver) = context();
    let mut cb = ctx.create_command_buffer();

    let mut enc = cb.begin_render_encoder().unwrap();
    enc.draw(draw_args()).unwrap();
    enc.end_encoding().unwrap();

    cb.commit().unwrap();
    cb.commit().unwrap();
    assert_eq!(driver.boundary.submissions().len(), 1);
    assert_eq!(cb.state(), CommandBufferState::Committed);
}

#[test]
fn commit_ends_an_open_encoder() {
    let (ctx, driver) = context();
    let mut cb = ctx.create_command_buffer();

    let mut enc = cb.begin_render_encoder().unwrap();
    enc.set_pipeline(PipelineHandle(7)).unwrap();
    drop(enc);

    cb.commit().unwrap();

    let subs = driver.boundary.submissions();
    let mut expected = encode_set_pipeline(PipelineHandle(7));
    expected.extend_from_slice(&encode_end_encoding());
    assert_eq!(subs, vec![expected]);
}

#[test]
fn new_encoder_implicitly_ends_the_previous_one() {
    let (ctx, driver) = context();
    let mut cb = ctx.create_command_buffer();

    let mut enc = cb.begin_render_encoder().unwrap();
    enc.draw(draw_args()).unwrap();
    drop(enc);

    // Beginning the next encoder writes the end-of-encoding record for the
    // dropped one.
    let enc2 = cb.begin_compute_encoder().unwrap();
    enc2.end_encoding().unwrap();
    cb.commit().unwrap();

    let mut expected = encode_draw(draw_args());
    expected.extend_from_slice(&encode_end_encoding());
    expected.extend_from_slice(&encode_end_encoding());
    assert_eq!(driver.boundary.submissions(), vec![expected]);
}

#[test]
fn encoding_after_commit_fails() {
    let (ctx, _) = context();
    let mut cb = ctx.create_command_buffer();
    cb.commit().unwrap();
    assert!(matches!(
        cb.begin_render_encoder().err(),
        Some(CommandBufferError::NotRecording)
    ));
}

#[test]
fn committed_records_survive_in_submission_order() {
    let (ctx, driver) = context();
    let mut cb = ctx.create_command_buffer();

    let mut enc = cb.begin_render_encoder().unwrap();
    enc.set_pipeline(PipelineHandle(1)).unwrap();
    enc.draw(draw_args()).unwrap();
    enc.end_encoding().unwrap();
    cb.commit().unwrap();

    let mut expected = encode_set_pipeline(PipelineHandle(1));
    expected.extend_from_slice(&encode_draw(draw_args()));
    expected.extend_from_slice(&encode_end_encoding());
    assert_eq!(driver.boundary.submissions(), vec![expected]);
}

#[test]
fn shutdown_clears_caches_and_memory() {
    let (ctx, driver) = context();

    ctx.memory().alloc(4096, MemoryClass::Device, false).unwrap();
    ctx.shaders()
        .compile_or_fetch(ShaderStage::Vertex, "src", "main")
        .unwrap();
    ctx.pipelines()
        .get_or_build_render(b"vs", None, &RenderPipelineDesc::default())
        .unwrap();

    ctx.shutdown();
    assert_eq!(driver.memory.live_regions(), 0);
    assert!(ctx.shaders().is_empty());
    assert!(ctx.pipelines().is_empty());
    assert_eq!(ctx.memory().budget().used, 0);
}

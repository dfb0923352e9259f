//! Command record encoding.
//!
//! Records are flat little-endian `[op: u32][payload_len: u32][payload]`
//! frames. The accumulator treats them as opaque bytes; this module is the
//! single place that knows the layout.

use crate::backend::PipelineHandle;

/// Operation tag of a command record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum CmdOp {
    SetPipeline = 1,
    Draw = 2,
    Dispatch = 3,
    EndEncoding = 4,
}

/// Non-indexed draw arguments, in record order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Compute grid dimensions, in record order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchArgs {
    pub groups_x: u32,
    pub groups_y: u32,
    pub groups_z: u32,
}

pub const RECORD_HEADER_LEN: usize = 8;

fn encode(op: CmdOp, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
    out.extend_from_slice(&(op as u32).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn encode_set_pipeline(handle: PipelineHandle) -> Vec<u8> {
    encode(CmdOp::SetPipeline, &handle.0.to_le_bytes())
}

pub fn encode_draw(args: DrawArgs) -> Vec<u8> {
    let mut payload = [0u8; 16];
    payload[0..4].copy_from_slice(&args.vertex_count.to_le_bytes());
    payload[4..8].copy_from_slice(&args.instance_count.to_le_bytes());
    payload[8..12].copy_from_slice(&args.first_vertex.to_le_bytes());
    payload[12..16].copy_from_slice(&args.first_instance.to_le_bytes());
    encode(CmdOp::Draw, &payload)
}

pub fn encode_dispatch(args: DispatchArgs) -> Vec<u8> {
    let mut payload = [0u8; 12];
    payload[0..4].copy_from_slice(&args.groups_x.to_le_bytes());
    payload[4..8].copy_from_slice(&args.groups_y.to_le_bytes());
    payload[8..12].copy_from_slice(&args.groups_z.to_le_bytes());
    encode(CmdOp::Dispatch, &payload)
}

pub fn encode_end_encoding() -> Vec<u8> {
    encode(CmdOp::EndEncoding, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_carry_op_and_length_header() {
        let rec = encode_set_pipeline(PipelineHandle(0x1122));
        assert_eq!(&rec[0..4], &1u32.to_le_bytes());
        assert_eq!(&rec[4..8], &8u32.to_le_bytes());
        assert_eq!(&rec[8..16], &0x1122u64.to_le_bytes());
    }

    #[test]
    fn draw_payload_is_four_le_words() {
        let rec = encode_draw(DrawArgs {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        });
        assert_eq!(rec.len(), RECORD_HEADER_LEN + 16);
        assert_eq!(&rec[8..12], &3u32.to_le_bytes());
        assert_eq!(&rec[12..16], &1u32.to_le_bytes());
    }

    #[test]
    fn end_encoding_has_empty_payload() {
        let rec = encode_end_encoding();
        assert_eq!(rec.len(), RECORD_HEADER_LEN);
        assert_eq!(&rec[4..8], &0u32.to_le_bytes());
    }
}

use bitflags::bitflags;
use glam::{Quat, Vec3};

use crate::binding::TargetId;
use crate::codec::{self, WireError};

pub const MAX_MESSAGE_SIZE: usize = 1200;

/// Fixed-point steps for quantized wire fields.
pub const POSITION_SCALE: f32 = 1000.0;
pub const ROTATION_SCALE: f32 = 32767.0;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldMask: u8 {
        const POSITION = 1 << 0;
        const ROTATION = 1 << 1;
        const SCALE = 1 << 2;
        const ANIMATION = 1 << 3;
        const TELEPORT = 1 << 4;
    }
}

impl FieldMask {
    pub const STATE_FIELDS: Self = Self::POSITION
        .union(Self::ROTATION)
        .union(Self::SCALE)
        .union(Self::ANIMATION);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationState {
    pub state: u8,
    /// Normalized cycle phase in [0, 1).
    pub phase: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub sequence: u32,
    pub timestamp: f32,
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub scale: Option<Vec3>,
    pub animation: Option<AnimationState>,
    pub teleport: bool,
}

impl Snapshot {
    pub fn new(sequence: u32, timestamp: f32) -> Self {
        Self {
            sequence,
            timestamp,
            position: None,
            rotation: None,
            scale: None,
            animation: None,
            teleport: false,
        }
    }

    pub fn field_mask(&self) -> FieldMask {
        let mut mask = FieldMask::empty();
        mask.set(FieldMask::POSITION, self.position.is_some());
        mask.set(FieldMask::ROTATION, self.rotation.is_some());
        mask.set(FieldMask::SCALE, self.scale.is_some());
        mask.set(FieldMask::ANIMATION, self.animation.is_some());
        mask.set(FieldMask::TELEPORT, self.teleport);
        mask
    }

    pub fn is_empty(&self) -> bool {
        !self.field_mask().intersects(FieldMask::STATE_FIELDS)
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mask = self.field_mask();
        if !mask.intersects(FieldMask::STATE_FIELDS) {
            return Err(WireError::EmptyFieldMask);
        }

        let mut out = Vec::with_capacity(64);
        codec::write_u8(mask.bits(), &mut out);

        if let Some(position) = self.position {
            write_fixed_vec3(position, &mut out);
        }
        if let Some(rotation) = self.rotation {
            write_quat(rotation, &mut out);
        }
        if let Some(scale) = self.scale {
            write_fixed_vec3(scale, &mut out);
        }
        if let Some(animation) = self.animation {
            codec::write_u8(animation.state, &mut out);
            codec::write_u8((animation.phase.fract() * 255.0) as u8, &mut out);
        }

        codec::write_uvarint(u64::from(self.sequence), &mut out);
        codec::write_f32(self.timestamp, &mut out);
        Ok(out)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let (bits, mut cursor) = codec::read_u8(payload, 0)?;
        let mask = FieldMask::from_bits(bits).ok_or(WireError::UnknownFieldBits(bits))?;
        if !mask.intersects(FieldMask::STATE_FIELDS) {
            return Err(WireError::EmptyFieldMask);
        }

        let mut snapshot = Snapshot::new(0, 0.0);
        snapshot.teleport = mask.contains(FieldMask::TELEPORT);

        if mask.contains(FieldMask::POSITION) {
            let (position, next) = read_fixed_vec3(payload, cursor)?;
            snapshot.position = Some(position);
            cursor = next;
        }
        if mask.contains(FieldMask::ROTATION) {
            let (rotation, next) = read_quat(payload, cursor)?;
            snapshot.rotation = Some(rotation);
            cursor = next;
        }
        if mask.contains(FieldMask::SCALE) {
            let (scale, next) = read_fixed_vec3(payload, cursor)?;
            snapshot.scale = Some(scale);
            cursor = next;
        }
        if mask.contains(FieldMask::ANIMATION) {
            let (state, next) = codec::read_u8(payload, cursor)?;
            let (phase, next) = codec::read_u8(payload, next)?;
            snapshot.animation = Some(AnimationState {
                state,
                phase: phase as f32 / 255.0,
            });
            cursor = next;
        }

        let (sequence, cursor) = codec::read_uvarint(payload, cursor)?;
        let (timestamp, _) = codec::read_f32(payload, cursor)?;
        snapshot.sequence = sequence as u32;
        snapshot.timestamp = timestamp;
        Ok(snapshot)
    }
}

/// Frames a snapshot as a self-contained datagram: target addressing,
/// signed-varint payload length, then the payload bytes.
pub fn encode_message(target: TargetId, snapshot: &Snapshot) -> Result<Vec<u8>, WireError> {
    let payload = snapshot.encode()?;
    let mut out = Vec::with_capacity(payload.len() + 8);
    codec::write_uvarint(u64::from(target.object_id), &mut out);
    codec::write_u8(target.component_index as u8, &mut out);
    codec::write_blob(&payload, &mut out);
    if out.len() > MAX_MESSAGE_SIZE {
        return Err(WireError::Oversize(out.len()));
    }
    Ok(out)
}

/// Splits a datagram into its target and the still-encoded payload, so
/// routing can happen before the payload is decoded.
pub fn decode_frame(datagram: &[u8]) -> Result<(TargetId, &[u8]), WireError> {
    if datagram.len() > MAX_MESSAGE_SIZE {
        return Err(WireError::Oversize(datagram.len()));
    }
    let (object_id, cursor) = codec::read_uvarint(datagram, 0)?;
    if object_id > u64::from(u32::MAX) {
        return Err(WireError::VarintOverflow(0));
    }
    let (index_byte, cursor) = codec::read_u8(datagram, cursor)?;
    let (payload, _) = codec::read_blob(datagram, cursor)?;
    let target = TargetId::new(object_id as u32, index_byte as i8);
    Ok((target, payload))
}

fn write_fixed_vec3(value: Vec3, out: &mut Vec<u8>) {
    for component in value.to_array() {
        codec::write_svarint(quantize(component, POSITION_SCALE), out);
    }
}

fn read_fixed_vec3(buf: &[u8], cursor: usize) -> Result<(Vec3, usize), WireError> {
    let (x, cursor) = codec::read_svarint(buf, cursor)?;
    let (y, cursor) = codec::read_svarint(buf, cursor)?;
    let (z, cursor) = codec::read_svarint(buf, cursor)?;
    let value = Vec3::new(
        dequantize(x, POSITION_SCALE),
        dequantize(y, POSITION_SCALE),
        dequantize(z, POSITION_SCALE),
    );
    Ok((value, cursor))
}

fn write_quat(value: Quat, out: &mut Vec<u8>) {
    for component in value.to_array() {
        let clamped = component.clamp(-1.0, 1.0);
        codec::write_svarint((clamped * ROTATION_SCALE).round() as i64, out);
    }
}

fn read_quat(buf: &[u8], cursor: usize) -> Result<(Quat, usize), WireError> {
    let (x, cursor) = codec::read_svarint(buf, cursor)?;
    let (y, cursor) = codec::read_svarint(buf, cursor)?;
    let (z, cursor) = codec::read_svarint(buf, cursor)?;
    let (w, cursor) = codec::read_svarint(buf, cursor)?;
    let value = Quat::from_xyzw(
        x as f32 / ROTATION_SCALE,
        y as f32 / ROTATION_SCALE,
        z as f32 / ROTATION_SCALE,
        w as f32 / ROTATION_SCALE,
    )
    .normalize();
    Ok((value, cursor))
}

#[inline]
fn quantize(value: f32, scale: f32) -> i64 {
    (value * scale).round() as i64
}

#[inline]
fn dequantize(raw: i64, scale: f32) -> f32 {
    raw as f32 / scale
}

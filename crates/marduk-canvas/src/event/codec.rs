use bytemuck::{Pod, Zeroable, bytes_of, pod_read_unaligned};

use crate::coords::{IntRect, IntSize, SurfaceFormat};
use crate::error::TransportError;
use crate::ids::ReferencePtr;
use crate::paint::Color;
use crate::transport::BufferId;

use super::{DrawOp, Event};

// Frame kinds. 0 is reserved by the transport for buffer switches.
const BEGIN_TRANSACTION: u32 = 1;
const END_TRANSACTION: u32 = 2;
const PAUSE_TRANSLATION: u32 = 3;
const DROP_BUFFERS: u32 = 4;
const CREATE_DRAW_TARGET: u32 = 10;
const DESTROY_DRAW_TARGET: u32 = 11;
const FILL_RECT: u32 = 12;
const CLEAR_RECT: u32 = 13;
const FLUSH: u32 = 14;
const DEVICE_CHANGE_ACK: u32 = 15;
const ADD_SURFACE_ALIAS: u32 = 16;
const REMOVE_SURFACE_ALIAS: u32 = 17;
const PREPARE_DATA: u32 = 18;
const GET_DATA: u32 = 19;
const PRESENT_TEXTURE: u32 = 20;
const RELEASE_TEXTURE: u32 = 21;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct RefRaw {
    id: u64,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct DrawTargetRaw {
    target: u64,
    width: i32,
    height: i32,
    format: u32,
    _pad: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct AliasRaw {
    alias: u64,
    surface: u64,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct RectOpRaw {
    target: u64,
    rect: [i32; 4],
    color: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct TextureRaw {
    target: u64,
    texture_id: i64,
}

/// Appends the payload of `event` to `out` and returns its frame kind.
pub(crate) fn encode(event: &Event, out: &mut Vec<u8>) -> u32 {
    match event {
        Event::BeginTransaction => BEGIN_TRANSACTION,
        Event::EndTransaction => END_TRANSACTION,
        Event::PauseTranslation => PAUSE_TRANSLATION,
        Event::DropBuffers(ids) => {
            for id in ids {
                out.extend_from_slice(bytes_of(&id.0));
            }
            DROP_BUFFERS
        }
        Event::CreateDrawTarget { target, size, format } => {
            out.extend_from_slice(bytes_of(&DrawTargetRaw {
                target: target.0,
                width: size.width,
                height: size.height,
                format: format.to_raw(),
                _pad: 0,
            }));
            CREATE_DRAW_TARGET
        }
        Event::DestroyDrawTarget { target } => {
            out.extend_from_slice(bytes_of(&RefRaw { id: target.0 }));
            DESTROY_DRAW_TARGET
        }
        Event::Draw { target, op } => {
            let (kind, rect, color) = match op {
                DrawOp::FillRect { rect, color } => (FILL_RECT, rect, *color),
                DrawOp::Clear { rect } => (CLEAR_RECT, rect, Color::transparent()),
            };
            out.extend_from_slice(bytes_of(&RectOpRaw {
                target: target.0,
                rect: [rect.x, rect.y, rect.width, rect.height],
                color: color.to_array(),
            }));
            kind
        }
        Event::Flush => FLUSH,
        Event::DeviceChangeAcknowledged => DEVICE_CHANGE_ACK,
        Event::AddSurfaceAlias { alias, surface } => {
            out.extend_from_slice(bytes_of(&AliasRaw { alias: alias.0, surface: surface.0 }));
            ADD_SURFACE_ALIAS
        }
        Event::RemoveSurfaceAlias { alias } => {
            out.extend_from_slice(bytes_of(&RefRaw { id: alias.0 }));
            REMOVE_SURFACE_ALIAS
        }
        Event::PrepareDataForSurface { surface } => {
            out.extend_from_slice(bytes_of(&RefRaw { id: surface.0 }));
            PREPARE_DATA
        }
        Event::GetDataForSurface { surface } => {
            out.extend_from_slice(bytes_of(&RefRaw { id: surface.0 }));
            GET_DATA
        }
        Event::PresentTexture { target, texture_id } => {
            out.extend_from_slice(bytes_of(&TextureRaw { target: target.0, texture_id: *texture_id }));
            PRESENT_TEXTURE
        }
        Event::ReleaseTexture { texture_id } => {
            out.extend_from_slice(bytes_of(&TextureRaw { target: 0, texture_id: *texture_id }));
            RELEASE_TEXTURE
        }
    }
}

fn read<T: Pod>(payload: &[u8]) -> Result<T, TransportError> {
    if payload.len() != size_of::<T>() {
        return Err(TransportError::Malformed("payload size mismatch"));
    }
    Ok(pod_read_unaligned(payload))
}

fn expect_empty(payload: &[u8], event: Event) -> Result<Event, TransportError> {
    if payload.is_empty() {
        Ok(event)
    } else {
        Err(TransportError::Malformed("unexpected payload"))
    }
}

/// Decodes one frame payload. `payload` may be unaligned.
pub(crate) fn decode(kind: u32, payload: &[u8]) -> Result<Event, TransportError> {
    match kind {
        BEGIN_TRANSACTION => expect_empty(payload, Event::BeginTransaction),
        END_TRANSACTION => expect_empty(payload, Event::EndTransaction),
        PAUSE_TRANSLATION => expect_empty(payload, Event::PauseTranslation),
        FLUSH => expect_empty(payload, Event::Flush),
        DEVICE_CHANGE_ACK => expect_empty(payload, Event::DeviceChangeAcknowledged),
        DROP_BUFFERS => {
            if payload.len() % size_of::<u64>() != 0 {
                return Err(TransportError::Malformed("buffer list is not a multiple of 8"));
            }
            let ids = payload
                .chunks_exact(size_of::<u64>())
                .map(|c| BufferId(pod_read_unaligned::<u64>(c)))
                .collect();
            Ok(Event::DropBuffers(ids))
        }
        CREATE_DRAW_TARGET => {
            let raw: DrawTargetRaw = read(payload)?;
            let format = SurfaceFormat::from_raw(raw.format)
                .ok_or(TransportError::Malformed("unknown surface format"))?;
            Ok(Event::CreateDrawTarget {
                target: ReferencePtr(raw.target),
                size: IntSize::new(raw.width, raw.height),
                format,
            })
        }
        DESTROY_DRAW_TARGET => {
            let raw: RefRaw = read(payload)?;
            Ok(Event::DestroyDrawTarget { target: ReferencePtr(raw.id) })
        }
        FILL_RECT | CLEAR_RECT => {
            let raw: RectOpRaw = read(payload)?;
            let [x, y, w, h] = raw.rect;
            let rect = IntRect::new(x, y, w, h);
            let op = if kind == FILL_RECT {
                DrawOp::FillRect { rect, color: Color::from_array(raw.color) }
            } else {
                DrawOp::Clear { rect }
            };
            Ok(Event::Draw { target: ReferencePtr(raw.target), op })
        }
        ADD_SURFACE_ALIAS => {
            let raw: AliasRaw = read(payload)?;
            Ok(Event::AddSurfaceAlias {
                alias: ReferencePtr(raw.alias),
                surface: ReferencePtr(raw.surface),
            })
        }
        REMOVE_SURFACE_ALIAS => {
            let raw: RefRaw = read(payload)?;
            Ok(Event::RemoveSurfaceAlias { alias: ReferencePtr(raw.id) })
        }
        PREPARE_DATA => {
            let raw: RefRaw = read(payload)?;
            Ok(Event::PrepareDataForSurface { surface: ReferencePtr(raw.id) })
        }
        GET_DATA => {
            let raw: RefRaw = read(payload)?;
            Ok(Event::GetDataForSurface { surface: ReferencePtr(raw.id) })
        }
        PRESENT_TEXTURE => {
            let raw: TextureRaw = read(payload)?;
            Ok(Event::PresentTexture { target: ReferencePtr(raw.target), texture_id: raw.texture_id })
        }
        RELEASE_TEXTURE => {
            let raw: TextureRaw = read(payload)?;
            Ok(Event::ReleaseTexture { texture_id: raw.texture_id })
        }
        _ => Err(TransportError::Malformed("unknown frame kind")),
    }
}

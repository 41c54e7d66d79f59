// (C) 2025 - Enzo Lombardi

//! Request/reply protocol between the coordination transport and the
//! dispatcher: opcodes, parameter/result payloads and the status taxonomy.
//!
//! Opcode numbering and the `SET_*_INFO` mask bits are carried over from
//! `condrv.h` unchanged (plain `u32`/`u16` consts, matching the way the
//! teacher encodes its own command/state bitmasks rather than reaching for
//! a bitflags crate).

use crate::console::input::InputRecord;
use crate::core::geometry::{Point, Rect};

/// One request opcode. Discriminants match `IOCTL_CONDRV_*`'s device-code
/// ordering purely for readability; nothing in this crate serializes them
/// to the wire as integers directly (the `Transport` trait hands over
/// already-parsed [`Request`] values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    GetMode,
    SetMode,
    ReadInput,
    WriteInput,
    Peek,
    GetInputInfo,
    SetInputInfo,
    GetTitle,
    SetTitle,
    CtrlEvent,
    ReadOutput,
    WriteOutput,
    GetOutputInfo,
    SetOutputInfo,
    Activate,
    FillOutput,
    Scroll,
    GetRendererEvents,
    AttachRenderer,
    InitOutput,
    CloseOutput,
}

/// Target a request is addressed to: the console itself, or one of its
/// screen buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Console,
    ScreenBuffer(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharInfoMode {
    Text,
    Attr,
    TextAttr,
    TextStdAttr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParams {
    pub x: i32,
    pub y: i32,
    pub mode: CharInfoMode,
    /// Width of the destination rectangle; `0` means wrapped addressing.
    pub width: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillOutputParams {
    pub x: i32,
    pub y: i32,
    pub mode: CharInfoMode,
    pub count: i32,
    pub wrap: bool,
    pub ch: u16,
    pub attr: u16,
}

/// `scroll` and `clip` use inclusive `a`/`b` corners (`SMALL_RECT`
/// semantics, matching the wire format), unlike the exclusive-`b`
/// convention `Rect` otherwise carries for dirty regions computed inside
/// this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollParams {
    pub scroll: Rect,
    pub origin: Point,
    pub clip: Rect,
    pub fill_ch: u16,
    pub fill_attr: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub cursor_size: u8,
    pub cursor_visible: bool,
    pub cursor: Point,
    pub width: i16,
    pub height: i16,
    pub attr: u16,
    pub popup_attr: u16,
    pub window: Rect,
    pub max_width: i16,
    pub max_height: i16,
    pub font_width: i16,
    pub font_height: i16,
    pub font_weight: i16,
    pub font_pitch_family: i16,
    pub color_map: [u32; 16],
}

pub const SET_OUTPUT_INFO_CURSOR_GEOM: u32 = 0x0001;
pub const SET_OUTPUT_INFO_CURSOR_POS: u32 = 0x0002;
pub const SET_OUTPUT_INFO_SIZE: u32 = 0x0004;
pub const SET_OUTPUT_INFO_ATTR: u32 = 0x0008;
pub const SET_OUTPUT_INFO_DISPLAY_WINDOW: u32 = 0x0010;
pub const SET_OUTPUT_INFO_MAX_SIZE: u32 = 0x0020;
pub const SET_OUTPUT_INFO_FONT: u32 = 0x0040;
pub const SET_OUTPUT_INFO_COLORTABLE: u32 = 0x0080;
pub const SET_OUTPUT_INFO_POPUP_ATTR: u32 = 0x0100;

pub const SET_INPUT_INFO_EDITION_MODE: u32 = 0x01;
pub const SET_INPUT_INFO_INPUT_CODEPAGE: u32 = 0x02;
pub const SET_INPUT_INFO_OUTPUT_CODEPAGE: u32 = 0x04;
pub const SET_INPUT_INFO_WIN: u32 = 0x08;
pub const SET_INPUT_INFO_HISTORY_MODE: u32 = 0x10;
pub const SET_INPUT_INFO_HISTORY_SIZE: u32 = 0x20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutputInfoParams {
    pub mask: u32,
    pub info: OutputInfo,
    pub font_face_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputInfo {
    pub input_cp: u32,
    pub output_cp: u32,
    pub history_mode: bool,
    pub history_size: u32,
    pub history_index: u32,
    pub edition_mode: u32,
    pub input_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetInputInfoParams {
    pub mask: u32,
    pub history_mode: bool,
    pub history_size: u32,
    pub edition_mode: u32,
    pub input_cp: u32,
    pub output_cp: u32,
}

/// Renderer-facing event, matching `condrv_renderer_event`'s tagged union.
/// Optional infrastructure (per spec) the dispatcher appends to whenever it
/// mutates renderer-visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererEvent {
    Title,
    ScreenBufferResize { width: i16, height: i16 },
    Update { top: i16, bottom: i16 },
    CursorPos { x: i16, y: i16 },
    CursorGeom { visible: bool, size: u8 },
    Display { left: i16, top: i16, width: i16, height: i16 },
    Exit,
}

/// The body of a request, carrying only the fields its opcode needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    GetMode,
    SetMode(u32),
    ReadInput { max_records: usize, blocking: bool },
    WriteInput(Vec<InputRecord>),
    Peek { max_records: usize },
    GetInputInfo,
    SetInputInfo(SetInputInfoParams),
    GetTitle,
    SetTitle(String),
    ReadOutput { params: OutputParams, max_bytes: usize },
    WriteOutput { params: OutputParams, data: Vec<u8> },
    GetOutputInfo,
    SetOutputInfo(SetOutputInfoParams),
    Activate,
    FillOutput(FillOutputParams),
    Scroll(ScrollParams),
    GetRendererEvents,
    AttachRenderer,
    InitOutput { width: i16, height: i16 },
    CloseOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub target: Target,
    pub body: RequestBody,
}

/// Status taxonomy carried alongside a reply. Deliberately not
/// `std::error::Error` — a single bad request must never unwind the
/// dispatcher loop, so these travel as plain data (see `core::error` for
/// the type that *is* used for genuinely fatal failures).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// The request cannot be satisfied yet (a blocking read with nothing
    /// queued); the dispatcher parks it and replies later.
    Pending,
    InvalidParameter,
    InvalidHandle,
    NoMemory,
    NotSupported,
    /// Internal only: signals the dispatcher's output scratch buffer must
    /// grow and the same request re-issued; never observed by a caller.
    BufferOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    Empty,
    Mode(u32),
    InputRecords(Vec<InputRecord>),
    InputInfo(InputInfo),
    Title(String),
    Bytes(Vec<u8>),
    /// `CHAR_INFO_MODE_TEXTATTR` read result: the `SMALL_RECT` region
    /// actually served (narrower than requested at the buffer's edges) plus
    /// its cells, packed as `{codepoint: u16, attr: u16}` little-endian pairs.
    OutputData { region: Rect, bytes: Vec<u8> },
    Rect(Rect),
    Count(u32),
    OutputInfo(Box<OutputInfo>),
    RendererEvents(Vec<RendererEvent>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub body: ReplyBody,
}

impl Reply {
    pub fn ok(body: ReplyBody) -> Self {
        Self { status: Status::Success, body }
    }

    pub fn err(status: Status) -> Self {
        Self { status, body: ReplyBody::Empty }
    }

    pub fn pending() -> Self {
        Self { status: Status::Pending, body: ReplyBody::Empty }
    }
}

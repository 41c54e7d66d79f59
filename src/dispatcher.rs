// (C) 2025 - Enzo Lombardi

//! The main serve loop: pulls requests off the transport, routes them to
//! the console or one of its screen buffers, and replies.
//!
//! Grounded on `conhost.c`'s `process_console_ioctls`/`main_loop`/
//! `screen_buffer_ioctl`/`console_input_ioctl`. The `BUFFER_OVERFLOW`
//! retry-same-request loop and the `INIT_OUTPUT` special case are carried
//! over unchanged; the two-`HANDLE` `WaitForMultipleObjects` wait is
//! replaced with a single multiplexed channel (see [`Incoming`]) — the
//! idiomatic safe-Rust equivalent of a wait-any over two sources.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::mpsc::Receiver;

use crate::console::console::Console;
use crate::console::input::{InputRecord, ENABLE_WINDOW_INPUT};
use crate::core::cell::Cell;
use crate::core::geometry::Rect;
use crate::protocol::{
    CharInfoMode, FillOutputParams, OutputParams, RendererEvent, Reply, ReplyBody, Request,
    RequestBody, ScrollParams, SetInputInfoParams, SetOutputInfoParams, Status, Target,
};
use crate::renderer::TtyRenderer;

/// Caps the outbound renderer-event queue so a renderer that never attaches
/// can't make the dispatcher's memory grow without bound; oldest events are
/// dropped first, matching a lossy "catch up on attach" renderer contract.
const MAX_RENDERER_EVENTS: usize = 256;

/// A single request arriving over the transport, or a shutdown signal —
/// the two sources `main_loop`'s `WaitForMultipleObjects` used to wait on.
pub enum Incoming {
    Request(Request),
    Shutdown,
}

/// What the dispatcher reads requests from and writes replies to. Kept as
/// a trait so the loop can be driven by a test harness without a real
/// coordination process on the other end.
pub trait Transport {
    fn reply(&mut self, reply: Reply);
}

/// Process exit code, mirroring `main_loop`'s `return 0`/`return 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Failure,
}

pub struct Dispatcher<W: Write> {
    console: Console,
    renderer: TtyRenderer<W>,
    renderer_events: VecDeque<RendererEvent>,
}

impl<W: Write> Dispatcher<W> {
    pub fn new(console: Console, renderer: TtyRenderer<W>) -> Self {
        Self { console, renderer, renderer_events: VecDeque::new() }
    }

    /// Appends an event for a future `GET_RENDERER_EVENTS` poll, dropping
    /// the oldest entry if the queue is at capacity.
    fn push_renderer_event(&mut self, event: RendererEvent) {
        if self.renderer_events.len() >= MAX_RENDERER_EVENTS {
            self.renderer_events.pop_front();
        }
        self.renderer_events.push_back(event);
    }

    /// Consumes the dispatcher, handing back its console and renderer.
    pub fn into_parts(self) -> (Console, TtyRenderer<W>) {
        (self.console, self.renderer)
    }

    /// Drives the loop until `incoming` yields [`Incoming::Shutdown`] or is
    /// disconnected. `transport` receives replies for each handled request.
    pub fn run(&mut self, incoming: &Receiver<Incoming>, transport: &mut dyn Transport) -> ExitCode {
        if !self.renderer.is_initialized() {
            if let Some(buffer) = self.console.active_buffer() {
                if let Err(e) = self.renderer.init(buffer) {
                    log::warn!("tty init failed: {}", e);
                }
            }
        }

        loop {
            match incoming.recv() {
                Ok(Incoming::Request(request)) => {
                    let reply = self.handle(request);
                    transport.reply(reply);
                }
                Ok(Incoming::Shutdown) | Err(_) => {
                    self.push_renderer_event(RendererEvent::Exit);
                    return ExitCode::Success;
                }
            }
        }
    }

    /// Handles a single request synchronously and returns its reply,
    /// without going through the channel loop — what [`Self::run`] calls
    /// per request, and the entry point for embedding this dispatcher in a
    /// transport that already demultiplexes requests itself.
    pub fn handle(&mut self, request: Request) -> Reply {
        log::trace!("{:?} -> {:?}", request.target, request.body);

        match request.target {
            Target::Console => self.handle_console(request.body),
            Target::ScreenBuffer(id) => self.handle_screen_buffer(id, request.body),
        }
    }

    fn handle_console(&mut self, body: RequestBody) -> Reply {
        match body {
            RequestBody::GetMode => Reply::ok(ReplyBody::Mode(self.console.mode)),
            RequestBody::SetMode(mode) => {
                self.console.mode = mode;
                Reply::ok(ReplyBody::Empty)
            }
            RequestBody::ReadInput { max_records, blocking } => self.read_input(max_records, blocking),
            RequestBody::WriteInput(records) => self.write_input(records),
            RequestBody::Peek { max_records } => {
                let records = self.console.input().peek(max_records).to_vec();
                Reply::ok(ReplyBody::InputRecords(records))
            }
            RequestBody::GetInputInfo => Reply::ok(ReplyBody::InputInfo(self.console.input_info())),
            RequestBody::SetInputInfo(params) => self.set_input_info(&params),
            RequestBody::GetTitle => Reply::ok(ReplyBody::Title(self.console.title().to_string())),
            RequestBody::SetTitle(title) => {
                self.console.set_title(title.clone());
                if let Err(e) = self.renderer.set_title(&title) {
                    log::warn!("tty set_title failed: {}", e);
                }
                self.push_renderer_event(RendererEvent::Title);
                Reply::ok(ReplyBody::Empty)
            }
            RequestBody::InitOutput { width, height } => {
                let id = self.console.create_buffer(width, height);
                Reply::ok(ReplyBody::Count(id))
            }
            RequestBody::GetRendererEvents => {
                let events = self.renderer_events.drain(..).collect();
                Reply::ok(ReplyBody::RendererEvents(events))
            }
            RequestBody::AttachRenderer => {
                // A fresh attach starts clean rather than replaying whatever
                // backlog accumulated before anyone was listening.
                self.renderer_events.clear();
                Reply::ok(ReplyBody::Empty)
            }
            other => {
                log::warn!("opcode not valid against the console target: {:?}", other);
                Reply::err(Status::InvalidHandle)
            }
        }
    }

    /// Non-blocking reads, and blocking reads against a non-empty queue,
    /// always return `min(max_records, len())` immediately (possibly zero
    /// records for a non-blocking read of an empty queue). Only a blocking
    /// read against an empty queue parks.
    fn read_input(&mut self, max_records: usize, blocking: bool) -> Reply {
        match self.console.input_mut().try_park_read(max_records, blocking) {
            Ok(true) => {
                let records = self.console.input_mut().read(max_records);
                Reply::ok(ReplyBody::InputRecords(records))
            }
            Ok(false) => Reply::pending(),
            Err(()) => Reply::err(Status::InvalidParameter),
        }
    }

    fn write_input(&mut self, records: Vec<InputRecord>) -> Reply {
        let mode = self.console.mode;
        let ctrl_events = self.console.input_mut().write(records, mode);
        for _event in ctrl_events {
            // Out-of-band: the transport is expected to deliver this to the
            // process group independently of the request/reply channel.
            log::trace!("synthesized CTRL_C_EVENT");
        }
        // Releasing only clears the park; it does not consume the records
        // itself — the parked caller's own follow-up READ_INPUT delivers
        // them, matching `read_console_input`'s actual delivery rather than
        // discarding the data the write just queued.
        if self.console.input_mut().take_ready_pending().is_some() {
            log::trace!("released parked read");
        }
        Reply::ok(ReplyBody::Empty)
    }

    fn set_input_info(&mut self, params: &SetInputInfoParams) -> Reply {
        match self.console.set_input_info(params) {
            Ok(()) => Reply::ok(ReplyBody::Empty),
            Err(status) => Reply::err(status),
        }
    }

    fn handle_screen_buffer(&mut self, id: u32, body: RequestBody) -> Reply {
        if matches!(body, RequestBody::CloseOutput) {
            self.console.close_buffer(id);
            return Reply::ok(ReplyBody::Empty);
        }

        if self.console.buffer(id).is_none() {
            return Reply::err(Status::InvalidHandle);
        }

        let result = match body {
            RequestBody::GetMode => {
                Ok(Reply::ok(ReplyBody::Mode(self.console.buffer(id).unwrap().mode)))
            }
            RequestBody::SetMode(mode) => {
                self.console.buffer_mut(id).unwrap().mode = mode;
                Ok(Reply::ok(ReplyBody::Empty))
            }
            RequestBody::Activate => self.console.activate(id).map(|()| Reply::ok(ReplyBody::Empty)),
            RequestBody::GetOutputInfo => {
                let info = self.console.buffer(id).unwrap().output_info();
                Ok(Reply::ok(ReplyBody::OutputInfo(Box::new(info))))
            }
            RequestBody::SetOutputInfo(params) => self.set_output_info(id, &params),
            RequestBody::ReadOutput { params, max_bytes } => self.read_output(id, &params, max_bytes),
            RequestBody::WriteOutput { params, data } => self.write_output(id, &params, &data),
            RequestBody::FillOutput(params) => self.fill_output(id, &params),
            RequestBody::Scroll(params) => self.scroll(id, &params),
            other => {
                log::warn!("opcode not valid against a screen buffer target: {:?}", other);
                Ok(Reply::err(Status::NotSupported))
            }
        };

        result.unwrap_or_else(Reply::err)
    }

    fn sync_dirty(&mut self, id: u32, dirty: Option<Rect>) {
        let Some(rect) = dirty else { return };
        if self.console.active_buffer().map(|b| b.id) != Some(id) {
            return;
        }
        self.push_renderer_event(RendererEvent::Update { top: rect.a.y, bottom: rect.b.y.saturating_sub(1) });
        let buffer = self.console.active_buffer().unwrap();
        if let Err(e) = self.renderer.update(buffer, rect) {
            log::warn!("tty update failed: {}", e);
            return;
        }
        if let Err(e) = self.renderer.sync(buffer) {
            log::warn!("tty sync failed: {}", e);
        }
    }

    fn set_output_info(&mut self, id: u32, params: &SetOutputInfoParams) -> Result<Reply, Status> {
        let resize = self.console.buffer_mut(id).unwrap().set_output_info(params)?;
        let is_active = self.console.active_buffer().map(|b| b.id) == Some(id);

        if let Some((width, height)) = resize {
            log::trace!("screen buffer {} resized to {}x{}", id, width, height);
            self.push_renderer_event(RendererEvent::ScreenBufferResize { width, height });
            if is_active && self.console.mode & ENABLE_WINDOW_INPUT != 0 {
                let mode = self.console.mode;
                self.console.input_mut().write(vec![InputRecord::WindowBufferSize { width, height }], mode);
                // Same rule as `write_input`: releasing a park only clears
                // it, it doesn't consume the record — the parked caller's
                // own READ_INPUT delivers it.
                self.console.input_mut().take_ready_pending();
            }
        }

        if is_active {
            let info = &params.info;
            if params.mask & crate::protocol::SET_OUTPUT_INFO_CURSOR_POS != 0 {
                self.push_renderer_event(RendererEvent::CursorPos { x: info.cursor.x, y: info.cursor.y });
            }
            if params.mask & crate::protocol::SET_OUTPUT_INFO_CURSOR_GEOM != 0 {
                self.push_renderer_event(RendererEvent::CursorGeom {
                    visible: info.cursor_visible,
                    size: info.cursor_size,
                });
            }
            if params.mask & crate::protocol::SET_OUTPUT_INFO_DISPLAY_WINDOW != 0 {
                self.push_renderer_event(RendererEvent::Display {
                    left: info.window.a.x,
                    top: info.window.a.y,
                    width: info.window.width(),
                    height: info.window.height(),
                });
            }
        }

        let full = self.console.buffer(id).unwrap().full_rect();
        self.sync_dirty(id, Some(full));
        Ok(Reply::ok(ReplyBody::Empty))
    }

    /// `CHAR_INFO_MODE_TEXTATTR` writes whole cells (codepoint + attr packed
    /// per entry) and goes through `write_output_cells`; the other three
    /// modes write a single code-unit stream through `write_output`.
    fn write_output(&mut self, id: u32, params: &OutputParams, data: &[u8]) -> Result<Reply, Status> {
        let buffer = self.console.buffer_mut(id).unwrap();

        let (count, dirty) = if params.mode == CharInfoMode::TextAttr {
            let cells: Vec<Cell> = data
                .chunks_exact(4)
                .map(|c| Cell {
                    codepoint: u16::from_le_bytes([c[0], c[1]]),
                    attr: u16::from_le_bytes([c[2], c[3]]),
                })
                .collect();
            buffer.write_output_cells(params, &cells)?
        } else {
            let entries: Vec<u16> = data
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            buffer.write_output(params, &entries)?
        };

        self.sync_dirty(id, dirty);
        Ok(Reply::ok(ReplyBody::Count(count)))
    }

    /// `CHAR_INFO_MODE_TEXTATTR` requires a nonzero width and uses
    /// rectangular addressing; `Text`/`Attr` use linear, truncate-to-
    /// buffer-end addressing and never fail on an out-of-bounds origin —
    /// they just yield nothing. `TextStdAttr` isn't a valid read mode at
    /// all (matches `read_output`'s `default: STATUS_INVALID_PARAMETER`;
    /// it's write/fill-only).
    fn read_output(&mut self, id: u32, params: &OutputParams, max_bytes: usize) -> Result<Reply, Status> {
        let buffer = self.console.buffer(id).unwrap();

        match params.mode {
            CharInfoMode::TextAttr => {
                if params.width == 0 {
                    return Err(Status::InvalidParameter);
                }
                let max_cells = max_bytes / 4;
                let (region, cells) =
                    buffer.read_output_rect(params.x as i16, params.y as i16, params.width as i16, max_cells)?;
                let mut bytes = Vec::with_capacity(cells.len() * 4);
                for cell in cells {
                    bytes.extend_from_slice(&cell.codepoint.to_le_bytes());
                    bytes.extend_from_slice(&cell.attr.to_le_bytes());
                }
                Ok(Reply::ok(ReplyBody::OutputData { region, bytes }))
            }
            CharInfoMode::Text | CharInfoMode::Attr => {
                let max_entries = max_bytes / 2;
                let entries =
                    buffer.read_output_linear(params.x as i16, params.y as i16, params.mode.clone(), max_entries)?;
                let mut bytes = Vec::with_capacity(entries.len() * 2);
                for entry in entries {
                    bytes.extend_from_slice(&entry.to_le_bytes());
                }
                Ok(Reply::ok(ReplyBody::Bytes(bytes)))
            }
            CharInfoMode::TextStdAttr => Err(Status::InvalidParameter),
        }
    }

    fn fill_output(&mut self, id: u32, params: &FillOutputParams) -> Result<Reply, Status> {
        let (count, dirty) = self.console.buffer_mut(id).unwrap().fill_output(params)?;
        self.sync_dirty(id, dirty);
        Ok(Reply::ok(ReplyBody::Count(count)))
    }

    fn scroll(&mut self, id: u32, params: &ScrollParams) -> Result<Reply, Status> {
        let dirty = self.console.buffer_mut(id).unwrap().scroll(params)?;
        self.sync_dirty(id, dirty);
        Ok(Reply::ok(ReplyBody::Empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::input::KeyEvent;
    use std::sync::mpsc;

    struct RecordingTransport {
        replies: Vec<Reply>,
    }

    impl Transport for RecordingTransport {
        fn reply(&mut self, reply: Reply) {
            self.replies.push(reply);
        }
    }

    fn dispatcher() -> Dispatcher<Vec<u8>> {
        let console = Console::new(10, 3);
        let renderer = TtyRenderer::new(Vec::new());
        Dispatcher::new(console, renderer)
    }

    #[test]
    fn get_mode_then_set_mode_round_trips() {
        let mut d = dispatcher();
        let reply = d.handle(Request { target: Target::Console, body: RequestBody::SetMode(0x42) });
        assert_eq!(reply.status, Status::Success);
        let reply = d.handle(Request { target: Target::Console, body: RequestBody::GetMode });
        assert_eq!(reply.body, ReplyBody::Mode(0x42));
    }

    #[test]
    fn write_then_read_input_round_trips() {
        let mut d = dispatcher();
        let key = InputRecord::Key(KeyEvent {
            key_down: true,
            repeat_count: 1,
            virtual_key_code: 0,
            unicode_char: b'a' as u16,
            control_key_state: 0,
        });
        d.handle(Request { target: Target::Console, body: RequestBody::WriteInput(vec![key.clone()]) });
        let reply = d.handle(Request { target: Target::Console, body: RequestBody::ReadInput { max_records: 1, blocking: true } });
        assert_eq!(reply.body, ReplyBody::InputRecords(vec![key]));
    }

    #[test]
    fn read_input_with_nothing_queued_is_pending() {
        let mut d = dispatcher();
        let reply = d.handle(Request { target: Target::Console, body: RequestBody::ReadInput { max_records: 1, blocking: true } });
        assert_eq!(reply.status, Status::Pending);
    }

    #[test]
    fn blocking_read_of_more_than_queued_returns_available_records_not_pending() {
        let mut d = dispatcher();
        let key = InputRecord::Key(KeyEvent {
            key_down: true,
            repeat_count: 1,
            virtual_key_code: 0,
            unicode_char: b'a' as u16,
            control_key_state: 0,
        });
        d.handle(Request { target: Target::Console, body: RequestBody::WriteInput(vec![key.clone()]) });
        let reply = d.handle(Request {
            target: Target::Console,
            body: RequestBody::ReadInput { max_records: 5, blocking: true },
        });
        assert_eq!(reply.body, ReplyBody::InputRecords(vec![key]));
    }

    #[test]
    fn non_blocking_read_of_empty_queue_returns_success_with_no_records() {
        let mut d = dispatcher();
        let reply = d.handle(Request {
            target: Target::Console,
            body: RequestBody::ReadInput { max_records: 1, blocking: false },
        });
        assert_eq!(reply.status, Status::Success);
        assert_eq!(reply.body, ReplyBody::InputRecords(vec![]));
    }

    #[test]
    fn unknown_screen_buffer_id_is_invalid_handle() {
        let mut d = dispatcher();
        let reply = d.handle(Request { target: Target::ScreenBuffer(999), body: RequestBody::GetMode });
        assert_eq!(reply.status, Status::InvalidHandle);
    }

    #[test]
    fn write_output_textattr_then_read_output_round_trips() {
        let mut d = dispatcher();
        let data = vec![b'Q' as u8, 0, 0x12, 0x34]; // codepoint 'Q', attr 0x3412
        let reply = d.handle(Request {
            target: Target::ScreenBuffer(0),
            body: RequestBody::WriteOutput {
                params: OutputParams { x: 2, y: 1, mode: CharInfoMode::TextAttr, width: 0 },
                data,
            },
        });
        assert_eq!(reply.body, ReplyBody::Count(1));

        let reply = d.handle(Request {
            target: Target::ScreenBuffer(0),
            body: RequestBody::ReadOutput {
                params: OutputParams { x: 2, y: 1, mode: CharInfoMode::TextAttr, width: 1 },
                max_bytes: 4,
            },
        });
        let ReplyBody::OutputData { bytes, .. } = reply.body else {
            panic!("expected OutputData");
        };
        assert_eq!(bytes, vec![b'Q', 0, 0x12, 0x34]);
    }

    #[test]
    fn read_output_textattr_with_zero_width_is_invalid_parameter() {
        let mut d = dispatcher();
        let reply = d.handle(Request {
            target: Target::ScreenBuffer(0),
            body: RequestBody::ReadOutput {
                params: OutputParams { x: 0, y: 0, mode: CharInfoMode::TextAttr, width: 0 },
                max_bytes: 64,
            },
        });
        assert_eq!(reply.status, Status::InvalidParameter);
    }

    #[test]
    fn renderer_events_accumulate_and_drain() {
        let mut d = dispatcher();
        d.handle(Request { target: Target::Console, body: RequestBody::SetTitle("hi".into()) });
        let reply = d.handle(Request { target: Target::Console, body: RequestBody::GetRendererEvents });
        assert_eq!(reply.body, ReplyBody::RendererEvents(vec![RendererEvent::Title]));

        // draining leaves the queue empty.
        let reply = d.handle(Request { target: Target::Console, body: RequestBody::GetRendererEvents });
        assert_eq!(reply.body, ReplyBody::RendererEvents(vec![]));
    }

    #[test]
    fn attach_renderer_clears_backlog() {
        let mut d = dispatcher();
        d.handle(Request { target: Target::Console, body: RequestBody::SetTitle("hi".into()) });
        d.handle(Request { target: Target::Console, body: RequestBody::AttachRenderer });
        let reply = d.handle(Request { target: Target::Console, body: RequestBody::GetRendererEvents });
        assert_eq!(reply.body, ReplyBody::RendererEvents(vec![]));
    }

    #[test]
    fn resize_pushes_screen_buffer_resize_event() {
        let mut d = dispatcher();
        let mut info = d.console.buffer(0).unwrap().output_info();
        info.width = 20;
        info.height = 5;
        let params = SetOutputInfoParams {
            mask: crate::protocol::SET_OUTPUT_INFO_SIZE,
            info,
            font_face_name: None,
        };
        let reply = d.handle(Request { target: Target::ScreenBuffer(0), body: RequestBody::SetOutputInfo(params) });
        assert_eq!(reply.status, Status::Success);

        let reply = d.handle(Request { target: Target::Console, body: RequestBody::GetRendererEvents });
        let ReplyBody::RendererEvents(events) = reply.body else { panic!("expected RendererEvents") };
        assert!(events.contains(&RendererEvent::ScreenBufferResize { width: 20, height: 5 }));
    }

    #[test]
    fn resize_synthesizes_window_buffer_size_event_when_enabled() {
        let mut d = dispatcher();
        d.handle(Request { target: Target::Console, body: RequestBody::SetMode(ENABLE_WINDOW_INPUT) });

        let mut info = d.console.buffer(0).unwrap().output_info();
        info.width = 20;
        info.height = 5;
        let params = SetOutputInfoParams {
            mask: crate::protocol::SET_OUTPUT_INFO_SIZE,
            info,
            font_face_name: None,
        };
        d.handle(Request { target: Target::ScreenBuffer(0), body: RequestBody::SetOutputInfo(params) });

        let reply = d.handle(Request { target: Target::Console, body: RequestBody::ReadInput { max_records: 1, blocking: true } });
        assert_eq!(reply.body, ReplyBody::InputRecords(vec![InputRecord::WindowBufferSize { width: 20, height: 5 }]));
    }

    #[test]
    fn resize_does_not_synthesize_window_buffer_size_event_when_disabled() {
        let mut d = dispatcher();
        let mut info = d.console.buffer(0).unwrap().output_info();
        info.width = 20;
        info.height = 5;
        let params = SetOutputInfoParams {
            mask: crate::protocol::SET_OUTPUT_INFO_SIZE,
            info,
            font_face_name: None,
        };
        d.handle(Request { target: Target::ScreenBuffer(0), body: RequestBody::SetOutputInfo(params) });

        let reply = d.handle(Request { target: Target::Console, body: RequestBody::ReadInput { max_records: 1, blocking: true } });
        assert_eq!(reply.status, Status::Pending);
    }

    #[test]
    fn shutdown_stops_the_loop() {
        let (tx, rx) = mpsc::channel();
        tx.send(Incoming::Shutdown).unwrap();
        let mut d = dispatcher();
        let mut transport = RecordingTransport { replies: Vec::new() };
        assert_eq!(d.run(&rx, &mut transport), ExitCode::Success);
        assert!(transport.replies.is_empty());
    }
}

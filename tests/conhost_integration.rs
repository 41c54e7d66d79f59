//! End-to-end scenarios run through the public dispatcher/protocol surface,
//! matching the numbered walkthroughs used to validate the screen-buffer and
//! input-queue algorithms against `conhost.c`'s own behavior.

use conhost::console::input::{InputRecord, KeyEvent, ENABLE_PROCESSED_INPUT};
use conhost::console::Console;
use conhost::core::geometry::{Point, Rect};
use conhost::dispatcher::Dispatcher;
use conhost::protocol::{
    CharInfoMode, FillOutputParams, OutputParams, ReplyBody, Request, RequestBody, ScrollParams,
    Status, Target,
};
use conhost::renderer::TtyRenderer;

fn dispatcher(width: i16, height: i16) -> Dispatcher<Vec<u8>> {
    let console = Console::new(width, height);
    let renderer = TtyRenderer::new(Vec::new());
    Dispatcher::new(console, renderer)
}

fn init_output(d: &mut Dispatcher<Vec<u8>>, width: i16, height: i16) -> u32 {
    let reply = d.handle(Request { target: Target::Console, body: RequestBody::InitOutput { width, height } });
    match reply.body {
        ReplyBody::Count(id) => id,
        other => panic!("expected a buffer id, got {other:?}"),
    }
}

fn read_text_attr(d: &mut Dispatcher<Vec<u8>>, id: u32, x: i32, y: i32, width: u32, max_bytes: usize) -> Vec<(u16, u16)> {
    let reply = d.handle(Request {
        target: Target::ScreenBuffer(id),
        body: RequestBody::ReadOutput {
            params: OutputParams { x, y, mode: CharInfoMode::TextAttr, width },
            max_bytes,
        },
    });
    assert_eq!(reply.status, Status::Success);
    let ReplyBody::OutputData { bytes, .. } = reply.body else {
        panic!("expected OutputData, got something else");
    };
    bytes
        .chunks_exact(4)
        .map(|c| (u16::from_le_bytes([c[0], c[1]]), u16::from_le_bytes([c[2], c[3]])))
        .collect()
}

/// Scenario 1: init a buffer, fill it end to end, expect every cell filled
/// and the reply count to match the number of cells written.
#[test]
fn scenario_1_init_and_fill() {
    let mut d = dispatcher(1, 1);
    let id = init_output(&mut d, 8, 4);

    let reply = d.handle(Request {
        target: Target::ScreenBuffer(id),
        body: RequestBody::FillOutput(FillOutputParams {
            x: 0,
            y: 0,
            mode: CharInfoMode::TextAttr,
            count: 32,
            wrap: true,
            ch: b'A' as u16,
            attr: 0x07,
        }),
    });
    assert_eq!(reply.body, ReplyBody::Count(32));

    let cells = read_text_attr(&mut d, id, 0, 0, 8, 32 * 4);
    assert_eq!(cells.len(), 32);
    assert!(cells.iter().all(|&(ch, attr)| ch == b'A' as u16 && attr == 0x07));
}

/// Scenario 2: a wrapped write (`width == 0`) starting near the row's end
/// continues onto the next row, leaving attributes untouched.
#[test]
fn scenario_2_wrapped_write() {
    let mut d = dispatcher(1, 1);
    let id = init_output(&mut d, 8, 4);

    d.handle(Request {
        target: Target::ScreenBuffer(id),
        body: RequestBody::FillOutput(FillOutputParams {
            x: 0,
            y: 0,
            mode: CharInfoMode::TextAttr,
            count: 32,
            wrap: true,
            ch: b'A' as u16,
            attr: 0x07,
        }),
    });

    let data: Vec<u8> = "XYZW".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    let reply = d.handle(Request {
        target: Target::ScreenBuffer(id),
        body: RequestBody::WriteOutput { params: OutputParams { x: 6, y: 0, mode: CharInfoMode::Text, width: 0 }, data },
    });
    assert_eq!(reply.body, ReplyBody::Count(4));

    let cells = read_text_attr(&mut d, id, 0, 0, 8, 8 * 2 * 4);
    let expect_char = |x: usize, y: usize| cells[y * 8 + x].0;
    assert_eq!(expect_char(6, 0), b'X' as u16);
    assert_eq!(expect_char(7, 0), b'Y' as u16);
    assert_eq!(expect_char(0, 1), b'Z' as u16);
    assert_eq!(expect_char(1, 1), b'W' as u16);
    // attributes from the earlier fill survive the write untouched.
    assert!(cells.iter().all(|&(_, attr)| attr == 0x07));
}

/// Scenario 3: scrolling the bottom three rows up by one and filling the
/// vacated row with blanks.
#[test]
fn scenario_3_scroll_up_with_fill() {
    let mut d = dispatcher(1, 1);
    let id = init_output(&mut d, 4, 4);

    for (y, row) in ["AAAA", "BBBB", "CCCC", "DDDD"].iter().enumerate() {
        let data: Vec<u8> = row.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        d.handle(Request {
            target: Target::ScreenBuffer(id),
            body: RequestBody::WriteOutput {
                params: OutputParams { x: 0, y: y as i32, mode: CharInfoMode::Text, width: 0 },
                data,
            },
        });
    }

    let reply = d.handle(Request {
        target: Target::ScreenBuffer(id),
        body: RequestBody::Scroll(ScrollParams {
            scroll: Rect::new(0, 1, 3, 3),
            origin: Point::new(0, 0),
            clip: Rect::new(0, 0, 3, 3),
            fill_ch: b' ' as u16,
            fill_attr: 0x07,
        }),
    });
    assert_eq!(reply.status, Status::Success);

    let cells = read_text_attr(&mut d, id, 0, 0, 4, 4 * 4 * 4);
    let row_text = |y: usize| -> String {
        (0..4).map(|x| char::from_u32(cells[y * 4 + x].0 as u32).unwrap()).collect()
    };
    assert_eq!(row_text(0), "BBBB");
    assert_eq!(row_text(1), "CCCC");
    assert_eq!(row_text(2), "DDDD");
    assert_eq!(row_text(3), "    ");
}

/// Scenario 4: a Ctrl-C key-down under `ENABLE_PROCESSED_INPUT` is consumed
/// out of the queue rather than delivered as a plain record.
#[test]
fn scenario_4_ctrl_c_is_consumed_not_queued() {
    let mut d = dispatcher(10, 3);
    d.handle(Request { target: Target::Console, body: RequestBody::SetMode(ENABLE_PROCESSED_INPUT) });

    let ctrl_c = InputRecord::Key(KeyEvent {
        key_down: true,
        repeat_count: 1,
        virtual_key_code: 0x43,
        unicode_char: 0x03,
        control_key_state: 0,
    });
    let reply = d.handle(Request { target: Target::Console, body: RequestBody::WriteInput(vec![ctrl_c]) });
    assert_eq!(reply.status, Status::Success);

    let reply = d.handle(Request { target: Target::Console, body: RequestBody::ReadInput { max_records: 1, blocking: true } });
    assert_eq!(reply.status, Status::Pending);
}

/// Scenario 5: a blocking read parked against an empty queue is released by
/// the next write.
#[test]
fn scenario_5_parked_read_released_by_write() {
    let mut d = dispatcher(10, 3);

    let reply = d.handle(Request { target: Target::Console, body: RequestBody::ReadInput { max_records: 1, blocking: true } });
    assert_eq!(reply.status, Status::Pending);

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

    let reply = d.handle(Request { target: Target::Console, body: RequestBody::ReadInput { max_records: 1, blocking: true } });
    assert_eq!(reply.status, Status::Pending);
}

/// Scenario 6: writing a single cell to a 1x1 buffer and syncing emits a
/// minimal, non-empty escape sequence rather than redrawing the full frame.
#[test]
fn scenario_6_renderer_minimal_emission() {
    let mut d = dispatcher(1, 1);

    let data = {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(b'A' as u16).to_le_bytes());
        bytes.extend_from_slice(&(0x07u16).to_le_bytes());
        bytes
    };
    let reply = d.handle(Request {
        target: Target::ScreenBuffer(0),
        body: RequestBody::WriteOutput { params: OutputParams { x: 0, y: 0, mode: CharInfoMode::TextAttr, width: 0 }, data },
    });
    assert_eq!(reply.status, Status::Success);

    let (_console, renderer) = d.into_parts();
    let emitted = renderer.into_sink().expect("sink flush never fails for a Vec<u8>");
    assert!(!emitted.is_empty());
    // One cell changing should never cost anywhere near a full 4096-byte
    // redraw buffer's worth of escape sequences.
    assert!(emitted.len() < 64, "expected a minimal diff, got {} bytes", emitted.len());
}

// (C) 2025 - Enzo Lombardi

//! One console screen buffer: its cell grid, cursor, viewport and font
//! state, and the nine opcode operations that mutate it.
//!
//! Grounded cell-for-cell on `conhost.c`'s `struct screen_buffer` and its
//! `write_output`/`read_output`/`fill_output`/`scroll_output`/
//! `set_output_info`/`change_screen_buffer_size`, translated from raw
//! pointer arithmetic over a `malloc`'d array to a flat `Vec<Cell>` indexed
//! `y * width + x` — the same flat-grid idiom the teacher's own
//! `core::draw::DrawBuffer` already uses.

use crate::core::cell::Cell;
use crate::core::geometry::{Point, Rect};
use crate::core::palette::DEFAULT_COLOR_MAP;
use crate::protocol::{
    CharInfoMode, FillOutputParams, OutputInfo, OutputParams, ScrollParams, SetOutputInfoParams,
    Status, SET_OUTPUT_INFO_ATTR, SET_OUTPUT_INFO_COLORTABLE, SET_OUTPUT_INFO_CURSOR_GEOM,
    SET_OUTPUT_INFO_CURSOR_POS, SET_OUTPUT_INFO_DISPLAY_WINDOW, SET_OUTPUT_INFO_FONT,
    SET_OUTPUT_INFO_MAX_SIZE, SET_OUTPUT_INFO_POPUP_ATTR, SET_OUTPUT_INFO_SIZE,
};

pub const ENABLE_PROCESSED_OUTPUT: u32 = 0x0001;
pub const ENABLE_WRAP_AT_EOL_OUTPUT: u32 = 0x0002;

#[derive(Debug, Clone, Default)]
pub struct FontInfo {
    pub width: i16,
    pub height: i16,
    pub weight: i16,
    pub pitch_family: i16,
    pub face_name: Option<String>,
}

pub struct ScreenBuffer {
    pub id: u32,
    pub mode: u32,
    width: i16,
    height: i16,
    cursor_size: u8,
    cursor_visible: bool,
    cursor: Point,
    attr: u16,
    popup_attr: u16,
    max_width: i16,
    max_height: i16,
    data: Vec<Cell>,
    color_map: [u32; 16],
    window: Rect,
    font: FontInfo,
}

/// What changed as a result of a mutating operation, so the dispatcher
/// knows which region to hand to the renderer (`update_output` + `tty_sync`
/// in the original).
pub type Dirty = Option<Rect>;

impl ScreenBuffer {
    pub fn new(id: u32, width: i16, height: i16) -> Self {
        let cell_count = width.max(0) as usize * height.max(0) as usize;
        Self {
            id,
            mode: ENABLE_PROCESSED_OUTPUT | ENABLE_WRAP_AT_EOL_OUTPUT,
            width,
            height,
            cursor_size: 100,
            cursor_visible: true,
            cursor: Point::zero(),
            attr: 0x07,
            popup_attr: 0xf5,
            max_width: 80,
            max_height: 25,
            data: vec![Cell::BLANK; cell_count],
            color_map: DEFAULT_COLOR_MAP,
            window: Rect::from_coords(0, 0, 80, 25),
            font: FontInfo::default(),
        }
    }

    pub fn width(&self) -> i16 {
        self.width
    }

    pub fn height(&self) -> i16 {
        self.height
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    pub fn attr(&self) -> u16 {
        self.attr
    }

    pub fn cell(&self, x: i16, y: i16) -> Option<Cell> {
        self.index(x, y).map(|i| self.data[i])
    }

    pub fn full_rect(&self) -> Rect {
        Rect::from_coords(0, 0, self.width, self.height)
    }

    fn index(&self, x: i16, y: i16) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// `change_screen_buffer_size`: reallocates the grid, preserving the
    /// overlapping region and blank-filling the rest.
    pub fn resize(&mut self, new_width: i16, new_height: i16) {
        let (old_width, old_height) = (self.width, self.height);
        let mut new_data = vec![Cell::BLANK; new_width.max(0) as usize * new_height.max(0) as usize];

        let copy_width = old_width.min(new_width).max(0) as usize;
        let copy_height = old_height.min(new_height).max(0) as usize;
        for row in 0..copy_height {
            let src_start = row * old_width as usize;
            let dst_start = row * new_width as usize;
            new_data[dst_start..dst_start + copy_width]
                .copy_from_slice(&self.data[src_start..src_start + copy_width]);
        }

        self.data = new_data;
        self.width = new_width;
        self.height = new_height;
    }

    /// `get_output_info`.
    pub fn output_info(&self) -> OutputInfo {
        OutputInfo {
            cursor_size: self.cursor_size,
            cursor_visible: self.cursor_visible,
            cursor: self.cursor,
            width: self.width,
            height: self.height,
            attr: self.attr,
            popup_attr: self.popup_attr,
            window: self.window,
            max_width: self.max_width,
            max_height: self.max_height,
            font_width: self.font.width,
            font_height: self.font.height,
            font_weight: self.font.weight,
            font_pitch_family: self.font.pitch_family,
            color_map: self.color_map,
        }
    }

    /// `set_output_info`. Returns the synthesized `WINDOW_BUFFER_SIZE_EVENT`
    /// dimensions when a resize happened and window input is wanted by the
    /// caller (the caller decides whether to actually enqueue it, since
    /// that depends on console-wide mode flags this type doesn't own).
    pub fn set_output_info(
        &mut self,
        params: &SetOutputInfoParams,
    ) -> Result<Option<(i16, i16)>, Status> {
        let info = &params.info;
        let mut resize_event = None;

        if params.mask & SET_OUTPUT_INFO_CURSOR_GEOM != 0 {
            if info.cursor_size < 1 || info.cursor_size > 100 {
                return Err(Status::InvalidParameter);
            }
            self.cursor_size = info.cursor_size as u8;
            self.cursor_visible = info.cursor_visible;
        }

        if params.mask & SET_OUTPUT_INFO_CURSOR_POS != 0 {
            if info.cursor.x < 0
                || info.cursor.x >= self.width
                || info.cursor.y < 0
                || info.cursor.y >= self.height
            {
                return Err(Status::InvalidParameter);
            }
            self.cursor = info.cursor;
        }

        if params.mask & SET_OUTPUT_INFO_SIZE != 0 {
            if info.width < self.window.width() || info.height < self.window.height() {
                return Err(Status::InvalidParameter);
            }
            self.resize(info.width, info.height);

            if self.window.b.x > info.width {
                self.window.b.x -= self.window.a.x;
                self.window.a.x = 0;
            }
            if self.window.b.y > info.height {
                self.window.b.y -= self.window.a.y;
                self.window.a.y = 0;
            }
            if self.cursor.x >= info.width {
                self.cursor.x = info.width - 1;
            }
            if self.cursor.y >= info.height {
                self.cursor.y = info.height - 1;
            }

            resize_event = Some((info.width, info.height));
        }

        if params.mask & SET_OUTPUT_INFO_ATTR != 0 {
            self.attr = info.attr;
        }

        if params.mask & SET_OUTPUT_INFO_POPUP_ATTR != 0 {
            self.popup_attr = info.popup_attr;
        }

        if params.mask & SET_OUTPUT_INFO_DISPLAY_WINDOW != 0 {
            if info.window.a.x < 0
                || info.window.a.x > info.window.b.x
                || info.window.b.x > self.width
                || info.window.a.y < 0
                || info.window.a.y > info.window.b.y
                || info.window.b.y > self.height
            {
                return Err(Status::InvalidParameter);
            }
            self.window = info.window;
        }

        if params.mask & SET_OUTPUT_INFO_MAX_SIZE != 0 {
            self.max_width = info.max_width;
            self.max_height = info.max_height;
        }

        if params.mask & SET_OUTPUT_INFO_COLORTABLE != 0 {
            self.color_map = info.color_map;
        }

        if params.mask & SET_OUTPUT_INFO_FONT != 0 {
            self.font.width = info.font_width;
            self.font.height = info.font_height;
            self.font.weight = info.font_weight;
            self.font.pitch_family = info.font_pitch_family;
            // A missing face name (allocation failure in the original)
            // leaves the previous one in place; the rest of the font
            // update above still applies.
            if let Some(name) = &params.font_face_name {
                self.font.face_name = Some(name.clone());
            }
        }

        Ok(resize_event)
    }

    /// `write_output`. `data` holds raw code units/attrs per `params.mode`;
    /// returns the number of entries written and the dirty rect to render.
    pub fn write_output(
        &mut self,
        params: &OutputParams,
        data: &[u16],
    ) -> Result<(u32, Dirty), Status> {
        if params.x >= self.width as i32 {
            return Ok((0, None));
        }

        let mut written = 0u32;
        let mut i: i32 = 0;
        for (idx, entry) in data.iter().enumerate() {
            let idx = idx as i32;
            let (x, y) = if params.width != 0 {
                let x = params.x + idx % params.width as i32;
                let y = params.y + idx / params.width as i32;
                if x >= self.width as i32 {
                    continue;
                }
                (x, y)
            } else {
                let x = (params.x + idx).rem_euclid(self.width as i32);
                let y = params.y + (params.x + idx) / self.width as i32;
                (x, y)
            };
            if y >= self.height as i32 {
                break;
            }

            let cell_idx = y as usize * self.width as usize + x as usize;
            match params.mode {
                CharInfoMode::Text => self.data[cell_idx].codepoint = *entry,
                CharInfoMode::Attr => self.data[cell_idx].attr = *entry,
                CharInfoMode::TextAttr => {
                    // two u16 entries packed consecutively: ch then attr
                    return Err(Status::InvalidParameter);
                }
                CharInfoMode::TextStdAttr => {
                    self.data[cell_idx].codepoint = *entry;
                    self.data[cell_idx].attr = self.attr;
                }
            }
            written += 1;
            i = idx + 1;
        }

        if written == 0 {
            return Ok((0, None));
        }

        let dirty = if params.width != 0 {
            let bottom = (params.y + data.len() as i32 / params.width as i32).min(self.height as i32) - 1;
            let right = (params.x + params.width as i32).min(self.width as i32) - 1;
            Rect::new(params.x as i16, params.y as i16, (right + 1) as i16, (bottom + 1) as i16)
        } else {
            let bottom_row = params.y + (params.x + i - 1) / self.width as i32;
            if bottom_row != params.y {
                Rect::new(0, params.y as i16, self.width, (bottom_row + 1) as i16)
            } else {
                Rect::new(params.x as i16, params.y as i16, (params.x + i) as i16, (params.y + 1) as i16)
            }
        };

        Ok((written, Some(dirty)))
    }

    /// Rectangular write helper for `CHAR_INFO_MODE_TEXTATTR`, which writes
    /// whole `Cell`s rather than a single code-unit stream.
    pub fn write_output_cells(&mut self, params: &OutputParams, cells: &[Cell]) -> Result<(u32, Dirty), Status> {
        if params.x >= self.width as i32 {
            return Ok((0, None));
        }
        let mut written = 0u32;
        for (idx, cell) in cells.iter().enumerate() {
            let idx = idx as i32;
            let (x, y) = if params.width != 0 {
                let x = params.x + idx % params.width as i32;
                let y = params.y + idx / params.width as i32;
                if x >= self.width as i32 {
                    continue;
                }
                (x, y)
            } else {
                let x = (params.x + idx).rem_euclid(self.width as i32);
                let y = params.y + (params.x + idx) / self.width as i32;
                (x, y)
            };
            if y >= self.height as i32 {
                break;
            }
            let cell_idx = y as usize * self.width as usize + x as usize;
            self.data[cell_idx] = *cell;
            written += 1;
        }
        if written == 0 {
            return Ok((0, None));
        }
        let dirty = if params.width != 0 {
            let bottom = (params.y + cells.len() as i32 / params.width as i32).min(self.height as i32) - 1;
            let right = (params.x + params.width as i32).min(self.width as i32) - 1;
            Rect::new(params.x as i16, params.y as i16, (right + 1) as i16, (bottom + 1) as i16)
        } else {
            let bottom_row = params.y + (params.x + written as i32 - 1) / self.width as i32;
            if bottom_row != params.y {
                Rect::new(0, params.y as i16, self.width, (bottom_row + 1) as i16)
            } else {
                Rect::new(params.x as i16, params.y as i16, (params.x + written as i32) as i16, (params.y + 1) as i16)
            }
        };
        Ok((written, Some(dirty)))
    }

    /// `read_output` for `CHAR_INFO_MODE_TEXT`/`CHAR_INFO_MODE_ATTR`:
    /// a linear, wrapped read starting at `(x, y)` for up to `max_entries`.
    pub fn read_output_linear(&self, x: i16, y: i16, mode: CharInfoMode, max_entries: usize) -> Result<Vec<u16>, Status> {
        if x >= self.width || y >= self.height || x < 0 || y < 0 {
            return Ok(Vec::new());
        }
        let start = y as usize * self.width as usize + x as usize;
        let count = max_entries.min(self.data.len() - start);
        Ok(self.data[start..start + count]
            .iter()
            .map(|c| match mode {
                CharInfoMode::Text => c.codepoint,
                CharInfoMode::Attr => c.attr,
                _ => unreachable!("linear read only serves Text/Attr"),
            })
            .collect())
    }

    /// `read_output` for `CHAR_INFO_MODE_TEXTATTR`: a rectangular read,
    /// `width` columns by as many rows as fit in `max_cells`.
    pub fn read_output_rect(&self, x: i16, y: i16, width: i16, max_cells: usize) -> Result<(Rect, Vec<Cell>), Status> {
        if width == 0 || x >= self.width || y >= self.height || x < 0 || y < 0 {
            return Err(Status::InvalidParameter);
        }
        let width = width.min(self.width - x);
        let rows = (max_cells / width.max(1) as usize).min((self.height - y) as usize);
        let mut out = Vec::with_capacity(rows * width as usize);
        for row in 0..rows {
            let start = (y as usize + row) * self.width as usize + x as usize;
            out.extend_from_slice(&self.data[start..start + width as usize]);
        }
        let rect = Rect::new(x, y, x + width, y + rows as i16);
        Ok((rect, out))
    }

    /// `fill_output`: fills from `(x, y)` for `count` cells, wrapping past
    /// the end of the row only if `wrap` is set, clamped to the buffer end.
    pub fn fill_output(&mut self, params: &FillOutputParams) -> Result<(u32, Dirty), Status> {
        if params.y >= self.height as i32 || params.y < 0 {
            return Ok((0, None));
        }
        let start = params.y as usize * self.width as usize + params.x as usize;
        if start >= self.data.len() {
            return Ok((0, None));
        }

        let end = if params.wrap {
            self.data.len()
        } else {
            (params.y as usize + 1) * self.width as usize
        };
        let count = (params.count.max(0) as usize).min(end.saturating_sub(start));

        for cell in &mut self.data[start..start + count] {
            match params.mode {
                CharInfoMode::Text => cell.codepoint = params.ch,
                CharInfoMode::Attr => cell.attr = params.attr,
                CharInfoMode::TextAttr => {
                    cell.codepoint = params.ch;
                    cell.attr = params.attr;
                }
                CharInfoMode::TextStdAttr => {
                    cell.codepoint = params.ch;
                    cell.attr = self.attr;
                }
            }
        }

        if count == 0 {
            return Ok((0, None));
        }

        let last = start + count - 1;
        let first_row = (start / self.width as usize) as i16;
        let last_row = (last / self.width as usize) as i16;
        let dirty = if first_row == last_row {
            Rect::new(
                (start % self.width as usize) as i16,
                first_row,
                (last % self.width as usize) as i16 + 1,
                first_row + 1,
            )
        } else {
            Rect::new(0, first_row, self.width, last_row + 1)
        };

        Ok((count as u32, Some(dirty)))
    }

    /// `scroll_output`: clips the scroll/origin rects against `clip`, then
    /// memmove-copies the surviving block and fills the vacated cells.
    pub fn scroll(&mut self, params: &ScrollParams) -> Result<Dirty, Status> {
        let width = self.width;
        let height = self.height;

        let clip = Rect::new(
            params.clip.a.x.max(0),
            params.clip.a.y.max(0),
            params.clip.b.x.min(width - 1),
            params.clip.b.y.min(height - 1),
        );

        let w = params.scroll.b.x - params.scroll.a.x + 1;
        let h = params.scroll.b.y - params.scroll.a.y + 1;

        if clip.a.x > clip.b.x
            || clip.a.y > clip.b.y
            || params.scroll.a.x < 0
            || params.scroll.a.y < 0
            || params.scroll.b.x >= width
            || params.scroll.b.y >= height
            || params.scroll.b.x < params.scroll.a.x
            || params.scroll.a.y > params.scroll.b.y
            || params.origin.x < 0
            || params.origin.x >= width
            || params.origin.y < 0
            || params.origin.y >= height
        {
            return Err(Status::InvalidParameter);
        }

        let mut xsrc = params.scroll.a.x;
        let mut ysrc = params.scroll.a.y;
        let mut w = w;
        let mut h = h;

        let src = Rect::new(
            xsrc.max(clip.a.x),
            ysrc.max(clip.a.y),
            (xsrc + w - 1).min(clip.b.x),
            (ysrc + h - 1).min(clip.b.y),
        );

        let mut dst = Rect::new(
            params.origin.x,
            params.origin.y,
            params.origin.x + w - 1,
            params.origin.y + h - 1,
        );

        if dst.a.x < clip.a.x {
            xsrc += clip.a.x - dst.a.x;
            w -= clip.a.x - dst.a.x;
            dst.a.x = clip.a.x;
        }
        if dst.a.y < clip.a.y {
            ysrc += clip.a.y - dst.a.y;
            h -= clip.a.y - dst.a.y;
            dst.a.y = clip.a.y;
        }
        if dst.b.x > clip.b.x {
            w -= dst.b.x - clip.b.x;
        }
        if dst.b.y > clip.b.y {
            h -= dst.b.y - clip.b.y;
        }

        if w > 0 && h > 0 {
            let width = self.width as usize;
            let w = w as usize;
            let h = h as usize;
            if ysrc < dst.a.y {
                // destination is below source: copy bottom-up to avoid
                // clobbering rows not yet read.
                for row in (0..h).rev() {
                    let src_row = (ysrc as usize + row) * width + xsrc as usize;
                    let dst_row = (dst.a.y as usize + row) * width + dst.a.x as usize;
                    self.data.copy_within(src_row..src_row + w, dst_row);
                }
            } else {
                for row in 0..h {
                    let src_row = (ysrc as usize + row) * width + xsrc as usize;
                    let dst_row = (dst.a.y as usize + row) * width + dst.a.x as usize;
                    self.data.copy_within(src_row..src_row + w, dst_row);
                }
            }
        }

        let fill = Cell::new(params.fill_ch, params.fill_attr);
        for y in src.a.y..=src.b.y {
            let mut left = src.a.x;
            let mut right = src.b.x;
            if dst.a.y <= y && y <= dst.b.y {
                if dst.a.x <= src.a.x {
                    left = left.max(dst.b.x + 1);
                }
                if dst.a.x >= src.a.x {
                    right = right.min(dst.a.x - 1);
                }
            }
            for x in left..=right {
                if let Some(idx) = self.index(x, y) {
                    self.data[idx] = fill;
                }
            }
        }

        let dirty = Rect::new(
            src.a.x.min(dst.a.x),
            src.a.y.min(dst.a.y),
            src.b.x.max(dst.b.x),
            src.b.y.max(dst.b.y),
        );
        Ok(Some(dirty))
    }
}

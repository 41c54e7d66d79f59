// (C) 2025 - Enzo Lombardi

//! The console itself: input mode, the screen buffer set, history, title
//! and input-codepage/edition-mode bookkeeping, tied together the way
//! `struct console` does in `conhost.c`.

use std::collections::HashMap;

use crate::console::history::{HistoryMode, HistoryRing};
use crate::console::input::InputQueue;
use crate::console::screen_buffer::ScreenBuffer;
use crate::protocol::{
    InputInfo, SetInputInfoParams, Status, SET_INPUT_INFO_EDITION_MODE,
    SET_INPUT_INFO_HISTORY_MODE, SET_INPUT_INFO_HISTORY_SIZE, SET_INPUT_INFO_INPUT_CODEPAGE,
    SET_INPUT_INFO_OUTPUT_CODEPAGE,
};

const DEFAULT_HISTORY_SIZE: usize = 50;

pub struct Console {
    pub mode: u32,
    buffers: HashMap<u32, ScreenBuffer>,
    active: Option<u32>,
    next_id: u32,
    input: InputQueue,
    title: String,
    history: HistoryRing,
    edition_mode: u32,
    input_cp: u32,
    output_cp: u32,
}

impl Console {
    pub fn new(width: i16, height: i16) -> Self {
        let mut buffers = HashMap::new();
        let id = 0;
        buffers.insert(id, ScreenBuffer::new(id, width, height));

        Self {
            mode: 0,
            buffers,
            active: Some(id),
            next_id: id + 1,
            input: InputQueue::new(),
            title: String::new(),
            history: HistoryRing::new(DEFAULT_HISTORY_SIZE),
            edition_mode: 0,
            input_cp: 0,
            output_cp: 0,
        }
    }

    pub fn active_buffer(&self) -> Option<&ScreenBuffer> {
        self.active.and_then(|id| self.buffers.get(&id))
    }

    pub fn active_buffer_mut(&mut self) -> Option<&mut ScreenBuffer> {
        self.active.and_then(move |id| self.buffers.get_mut(&id))
    }

    pub fn buffer(&self, id: u32) -> Option<&ScreenBuffer> {
        self.buffers.get(&id)
    }

    pub fn buffer_mut(&mut self, id: u32) -> Option<&mut ScreenBuffer> {
        self.buffers.get_mut(&id)
    }

    pub fn create_buffer(&mut self, width: i16, height: i16) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.buffers.insert(id, ScreenBuffer::new(id, width, height));
        id
    }

    /// `IOCTL_CONDRV_CLOSE_OUTPUT`'s `destroy_screen_buffer`.
    pub fn close_buffer(&mut self, id: u32) {
        if self.active == Some(id) {
            self.active = None;
        }
        self.buffers.remove(&id);
    }

    /// `IOCTL_CONDRV_ACTIVATE`'s `screen_buffer_activate`.
    pub fn activate(&mut self, id: u32) -> Result<(), Status> {
        if !self.buffers.contains_key(&id) {
            return Err(Status::InvalidHandle);
        }
        self.active = Some(id);
        Ok(())
    }

    pub fn input(&self) -> &InputQueue {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputQueue {
        &mut self.input
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// `set_console_title`.
    pub fn set_title(&mut self, title: String) {
        self.title = title;
    }

    pub fn history(&self) -> &HistoryRing {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryRing {
        &mut self.history
    }

    /// `IOCTL_CONDRV_GET_INPUT_INFO`.
    pub fn input_info(&self) -> InputInfo {
        InputInfo {
            input_cp: self.input_cp,
            output_cp: self.output_cp,
            history_mode: self.history.mode().0,
            history_size: self.history.capacity() as u32,
            history_index: self.history.len() as u32,
            edition_mode: self.edition_mode,
            input_count: self.input.len() as u32,
        }
    }

    /// `IOCTL_CONDRV_SET_INPUT_INFO`.
    pub fn set_input_info(&mut self, params: &SetInputInfoParams) -> Result<(), Status> {
        if params.mask & SET_INPUT_INFO_HISTORY_MODE != 0 {
            self.history.set_mode(HistoryMode(params.history_mode));
        }
        if params.mask & SET_INPUT_INFO_HISTORY_SIZE != 0
            && self.history.capacity() != params.history_size as usize
        {
            self.history.resize(params.history_size as usize);
        }
        if params.mask & SET_INPUT_INFO_EDITION_MODE != 0 {
            self.edition_mode = params.edition_mode;
        }
        if params.mask & SET_INPUT_INFO_INPUT_CODEPAGE != 0 {
            self.input_cp = params.input_cp;
        }
        if params.mask & SET_INPUT_INFO_OUTPUT_CODEPAGE != 0 {
            self.output_cp = params.output_cp;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_console_has_one_active_buffer() {
        let console = Console::new(80, 25);
        assert!(console.active_buffer().is_some());
        assert_eq!(console.active_buffer().unwrap().width(), 80);
    }

    #[test]
    fn create_and_activate_second_buffer() {
        let mut console = Console::new(80, 25);
        let id2 = console.create_buffer(40, 12);
        assert!(console.activate(id2).is_ok());
        assert_eq!(console.active_buffer().unwrap().width(), 40);
    }

    #[test]
    fn activating_unknown_id_is_invalid_handle() {
        let mut console = Console::new(80, 25);
        assert_eq!(console.activate(999), Err(Status::InvalidHandle));
    }

    #[test]
    fn closing_active_buffer_clears_active() {
        let mut console = Console::new(80, 25);
        console.close_buffer(0);
        assert!(console.active_buffer().is_none());
    }

    #[test]
    fn set_input_info_resizes_history() {
        let mut console = Console::new(80, 25);
        let params = SetInputInfoParams {
            mask: SET_INPUT_INFO_HISTORY_SIZE,
            history_mode: false,
            history_size: 10,
            edition_mode: 0,
            input_cp: 0,
            output_cp: 0,
        };
        console.set_input_info(&params).unwrap();
        assert_eq!(console.history().capacity(), 10);
    }
}

// (C) 2025 - Enzo Lombardi

//! Console-level state: the active screen buffer set, the input queue,
//! history and title, tied together by [`Console`].

pub mod console;
pub mod history;
pub mod input;
pub mod screen_buffer;

pub use console::Console;

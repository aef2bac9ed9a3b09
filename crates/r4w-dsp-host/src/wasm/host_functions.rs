//! Host functions imported by DSP modules.
//!
//! DSP modules print diagnostics one character at a time through the
//! `spectest` namespace:
//! ```wat
//! (import "spectest" "print_char" (func $print_char (param i32)))
//! ```
//! Characters are collected into buffers that are allocated up front. The
//! module may print from `process_block`, so nothing here logs: completed
//! lines wait in the console until a control-thread call drains them to
//! `tracing` at debug level.

use wasmtime::{Caller, Linker};

use super::runtime::HostState;
use crate::error::InitError;

/// Import namespace of the console functions.
pub const CONSOLE_MODULE: &str = "spectest";

/// Longest line kept; further characters are dropped until the newline.
const MAX_LINE: usize = 1024;

/// Bytes of completed lines held between drains.
const MAX_BACKLOG: usize = 16 * 1024;

/// Line buffer for module console output.
#[derive(Debug)]
pub struct Console {
    line: String,
    /// Completed lines, each terminated by a newline
    backlog: String,
    lines_printed: u64,
    lines_dropped: u64,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// Create an empty console.
    pub fn new() -> Self {
        Self {
            line: String::with_capacity(MAX_LINE),
            backlog: String::with_capacity(MAX_BACKLOG),
            lines_printed: 0,
            lines_dropped: 0,
        }
    }

    /// Append one character code; a newline completes the line.
    ///
    /// Never allocates and never logs.
    pub fn push_char(&mut self, code: i32) {
        if code == '\n' as i32 {
            if self.backlog.len() + self.line.len() < MAX_BACKLOG {
                self.backlog.push_str(&self.line);
                self.backlog.push('\n');
            } else {
                self.lines_dropped += 1;
            }
            self.line.clear();
            self.lines_printed += 1;
            return;
        }
        let ch = char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
        if self.line.len() + ch.len_utf8() <= MAX_LINE {
            self.line.push(ch);
        }
    }

    /// Log the completed lines and empty the backlog. Returns how many were logged.
    pub fn drain(&mut self) -> usize {
        let mut logged = 0;
        for line in self.backlog.lines() {
            tracing::debug!(target: "r4w_dsp_host::module", "{}", line);
            logged += 1;
        }
        if self.lines_dropped > 0 {
            tracing::debug!(
                target: "r4w_dsp_host::module",
                "{} console lines dropped",
                self.lines_dropped
            );
            self.lines_dropped = 0;
        }
        self.backlog.clear();
        logged
    }

    /// Text received since the last newline.
    pub fn pending(&self) -> &str {
        &self.line
    }

    /// Completed lines not yet drained.
    pub fn backlog(&self) -> &str {
        &self.backlog
    }

    /// Number of completed lines.
    pub fn lines_printed(&self) -> u64 {
        self.lines_printed
    }
}

/// Console host functions exposed to DSP modules.
pub struct ConsoleHostFunctions;

impl ConsoleHostFunctions {
    /// Register all console host functions with the wasmtime linker.
    pub fn register(linker: &mut Linker<HostState>) -> Result<(), InitError> {
        linker
            .func_wrap(
                CONSOLE_MODULE,
                "print_char",
                |mut caller: Caller<'_, HostState>, code: i32| {
                    caller.data_mut().console.push_char(code);
                },
            )
            .map_err(|e| {
                InitError::ContextFailed(format!("failed to register print_char: {}", e))
            })?;
        Ok(())
    }
}

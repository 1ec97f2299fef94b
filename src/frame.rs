// (C) 2020 Brandon Lewis
//
// Frames record transient scopes: function calls, try/catch handlers,
// loops, and switches. Call frames and handler frames share one shape
// and one stack, so exception unwinding can pop through pending calls
// until it finds a handler.

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LoopKind {
    For,
    While,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LoopFrame {
    // Where CONTINUE and the loop back-edge go.
    pub start: usize,
    // Where BREAK and a failed condition go.
    pub end: usize,
    pub kind: LoopKind,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SwitchFrame {
    pub end_addr: usize,
    pub default_addr: Option<usize>,
}

// A call frame, or, with is_handler set, an exception handler. The
// handler variant also snapshots the loop and switch depths so that
// unwinding restores every frame stack, not just the operand stack.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CallFrame {
    pub return_addr: usize,
    pub base: usize,
    pub saved_bp: usize,
    pub saved_sp: usize,
    pub arg_count: usize,
    pub is_handler: bool,
    pub catch_addr: usize,
    pub saved_loops: usize,
    pub saved_switches: usize,
}

impl CallFrame {
    pub fn call(return_addr: usize, saved_bp: usize, base: usize, arg_count: usize) -> CallFrame {
        CallFrame {
            return_addr,
            base,
            saved_bp,
            saved_sp: base,
            arg_count,
            is_handler: false,
            catch_addr: 0,
            saved_loops: 0,
            saved_switches: 0,
        }
    }

    pub fn handler(
        catch_addr: usize,
        return_addr: usize,
        saved_bp: usize,
        saved_sp: usize,
        saved_loops: usize,
        saved_switches: usize,
    ) -> CallFrame {
        CallFrame {
            return_addr,
            base: saved_sp,
            saved_bp,
            saved_sp,
            arg_count: 0,
            is_handler: true,
            catch_addr,
            saved_loops,
            saved_switches,
        }
    }
}

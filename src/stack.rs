/// One call-stack entry: the callee's name and the call-site position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function_name: String,
    pub line: u32,
    pub column: u32,
}

/// LIFO record of active user-function calls, kept for diagnostics.
///
/// Frames are pushed on function entry and popped on every exit path,
/// including erroring ones; `stack_trace` snapshots the frames so a
/// `Diagnostic` can outlive the unwinding.
#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<StackFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    pub fn peek(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    pub fn stack_trace(&self) -> Vec<StackFrame> {
        self.frames.clone()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

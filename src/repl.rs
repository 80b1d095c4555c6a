use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    diagnostics::{CallaError, Result},
    runtime::{Interpreter, RuntimeEvent, RuntimeOptions},
};

pub struct Repl {
    interpreter: Interpreter,
}

impl Repl {
    pub fn new(options: RuntimeOptions) -> Self {
        let mut interpreter = Interpreter::new(options);
        interpreter.on(|event| {
            if let RuntimeEvent::Output(line) = event {
                println!("{line}");
            }
        });
        Self { interpreter }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(|err| {
            CallaError::from(std::io::Error::new(std::io::ErrorKind::Other, err))
        })?;
        loop {
            match self.read_input(&mut editor) {
                Ok(Some(input)) => {
                    let trimmed = input.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    match self.interpreter.eval_source(trimmed, None) {
                        Ok(value) => {
                            if !value.is_null() {
                                println!("{value}");
                            }
                        }
                        Err(CallaError::Diagnostic(diagnostic)) => {
                            eprintln!("{diagnostic}");
                        }
                        Err(other) => eprintln!("error: {other}"),
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    return Err(CallaError::from(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        err,
                    )));
                }
            }
        }
        Ok(())
    }

    /// Reads one logical input, continuing across lines while more blocks
    /// have been opened than closed.
    fn read_input(
        &mut self,
        editor: &mut DefaultEditor,
    ) -> std::result::Result<Option<String>, ReadlineError> {
        let mut input = match editor.readline(">> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err),
        };
        while open_blocks(&input) > 0 {
            match editor.readline(".. ") {
                Ok(line) => {
                    input.push('\n');
                    input.push_str(&line);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(None),
                Err(err) => return Err(err),
            }
        }
        Ok(Some(input))
    }
}

fn open_blocks(input: &str) -> i32 {
    let mut depth = 0;
    let mut in_string = false;
    let mut in_comment = false;
    for c in input.chars() {
        match c {
            '\n' => in_comment = false,
            '"' if !in_comment => in_string = !in_string,
            '#' if !in_string => in_comment = true,
            '{' if !in_string && !in_comment => depth += 1,
            '}' if !in_string && !in_comment => depth -= 1,
            _ => {}
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::open_blocks;

    #[test]
    fn counts_unbalanced_braces() {
        assert_eq!(open_blocks("check x > 1 {"), 1);
        assert_eq!(open_blocks("check x > 1 {\nsay x\n}"), 0);
    }

    #[test]
    fn ignores_braces_in_strings_and_comments() {
        assert_eq!(open_blocks("say \"{\""), 0);
        assert_eq!(open_blocks("# {"), 0);
    }
}

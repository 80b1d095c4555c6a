use std::{fs, path::PathBuf};

use clap::{Args as ClapArgs, Parser, Subcommand};

use calla::{CallaError, Interpreter, Repl, RuntimeEvent, RuntimeOptions};

#[derive(Parser)]
#[command(author, version, about = "Calla language interpreter")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(ClapArgs)]
struct Options {
    /// Report uncaught errors through runtime events
    #[arg(long)]
    debug: bool,
    /// Trace user function calls and returns
    #[arg(long)]
    trace: bool,
    /// Abort after this many executed statements
    #[arg(long)]
    max_steps: Option<u64>,
    /// Pin time and randomness to fixed values
    #[arg(long)]
    deterministic: bool,
}

impl Options {
    fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            debug: self.debug,
            trace: self.trace,
            max_steps: self.max_steps,
            deterministic: self.deterministic,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run a Calla script file
    Run {
        script: PathBuf,
        #[command(flatten)]
        options: Options,
    },
    /// Start an interactive REPL session
    Repl {
        #[command(flatten)]
        options: Options,
    },
    /// Evaluate a snippet of Calla code
    Eval {
        source: String,
        #[command(flatten)]
        options: Options,
    },
}

fn main() -> Result<(), CallaError> {
    let args = Args::parse();
    match args.command.unwrap_or(Command::Repl {
        options: Options {
            debug: false,
            trace: false,
            max_steps: None,
            deterministic: false,
        },
    }) {
        Command::Run { script, options } => {
            let source = fs::read_to_string(&script)?;
            let mut interpreter = new_interpreter(options.runtime_options());
            interpreter.eval_source(&source, script.to_str())?;
            Ok(())
        }
        Command::Repl { options } => {
            let mut repl = Repl::new(options.runtime_options());
            repl.run()
        }
        Command::Eval { source, options } => {
            let mut interpreter = new_interpreter(options.runtime_options());
            interpreter.eval_source(&source, None)?;
            Ok(())
        }
    }
}

fn new_interpreter(options: RuntimeOptions) -> Interpreter {
    let mut interpreter = Interpreter::new(options);
    interpreter.on(|event| match event {
        RuntimeEvent::Output(line) => println!("{line}"),
        RuntimeEvent::Call { name, line, column } => {
            eprintln!("trace: call {name} at {line}:{column}")
        }
        RuntimeEvent::Return { name } => eprintln!("trace: return {name}"),
        RuntimeEvent::Error(message) => eprintln!("trace: error {message}"),
    });
    interpreter
}

use rustyline::{DefaultEditor, error::ReadlineError};

use crate::{
    diagnostics::{BouquetError, Result},
    loader::Module,
};

/// Line-at-a-time evaluation inside one module, so bindings persist
/// between lines.
pub struct Repl {
    module: Module,
}

impl Repl {
    pub fn new(module: Module) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(std::io::Error::other)?;
        loop {
            match editor.readline(">> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    match self.module.eval(trimmed) {
                        Ok(value) if value.is_unit() => {}
                        Ok(value) => println!("{value}"),
                        Err(BouquetError::Eval(diag)) => {
                            eprintln!("{:?}: {}", diag.kind, diag.message);
                        }
                        Err(other) => eprintln!("error: {other}"),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(std::io::Error::other(err).into()),
            }
        }
        Ok(())
    }
}

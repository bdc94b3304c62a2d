//! Interactive terminal prompts

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Ask a yes/no question on the terminal. Blocks the calling thread.
///
/// Empty input, Ctrl+C and Ctrl+D all count as "no".
pub fn confirm(prompt: &str) -> Result<bool> {
    let mut rl = DefaultEditor::new()?;
    let prompt = format!("{} [y/N] ", prompt);

    loop {
        match rl.readline(&prompt) {
            Ok(line) => match parse_answer(&line) {
                Some(answer) => return Ok(answer),
                None => println!("Please answer 'y' or 'n'"),
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
    }
}

fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "" | "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y"), Some(true));
        assert_eq!(parse_answer("  YES \n"), Some(true));
        assert_eq!(parse_answer(""), Some(false));
        assert_eq!(parse_answer("No"), Some(false));
        assert_eq!(parse_answer("maybe"), None);
    }
}

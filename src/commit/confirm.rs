// src/commit/confirm.rs

use super::Prompt;
use std::io::{BufRead, Write};

/// Asks on stdout and reads the answer from stdin
///
/// An empty answer, end of input and anything starting with `y`/`Y` accept.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&mut self, question: &str) -> bool {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(question.as_bytes());
        let _ = stdout.flush();
        drop(stdout);

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => accepts(&answer),
            Err(_) => false,
        }
    }
}

fn accepts(answer: &str) -> bool {
    matches!(answer.chars().next(), None | Some('y' | 'Y' | '\n' | '\r'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers() {
        assert!(accepts(""));
        assert!(accepts("\n"));
        assert!(accepts("y\n"));
        assert!(accepts("Yes\n"));
        assert!(!accepts("n\n"));
        assert!(!accepts(" y\n"));
    }
}

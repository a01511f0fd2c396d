use anyhow::Result;
use std::io::{self, BufRead, Write};

pub fn prompt_string(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    read_line(&mut io::stdin().lock())
}

fn read_line(input: &mut impl BufRead) -> Result<String> {
    let mut s = String::new();
    input.read_line(&mut s)?;
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    Ok(s)
}

pub fn prompt_password_hidden(prompt: &str) -> Result<String> {
    let pw = rpassword::prompt_password(prompt)?;
    Ok(pw)
}

/// Yes/no question; anything but `y`/`yes` is a no.
pub fn confirm(question: &str) -> Result<bool> {
    let answer = prompt_string(&format!("{question} [y/N]: "))?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endings_are_stripped() {
        let mut input = io::Cursor::new("otpauth://totp/a\r\nrest");
        assert_eq!(read_line(&mut input).unwrap(), "otpauth://totp/a");
    }

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("nope"));
    }
}

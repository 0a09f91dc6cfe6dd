use anyhow::Result;
use std::io::{self, Write};

pub fn prompt_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim_end_matches(['\r', '\n']).to_string())
}

/// Ask a yes/no question; anything but "y"/"yes" is a no.
pub fn confirm(question: &str) -> Result<bool> {
    let answer = prompt_line(&format!("{question} [y/N]: "))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Read a secret or otpauth:// URI without echoing it.
pub fn prompt_secret(prompt: &str) -> Result<String> {
    let s = rpassword::prompt_password(prompt)?;
    Ok(s)
}

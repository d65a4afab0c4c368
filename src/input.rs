use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};

/// Ask until a non-empty line is entered
pub fn prompt_non_empty<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
) -> Result<String> {
    loop {
        let line = read_line(input, output, prompt)?;
        if !line.is_empty() {
            return Ok(line);
        }
        writeln!(output, "Input cannot be empty. Please try again.")?;
    }
}

/// Ask for a page count; a blank answer takes `default`
pub fn prompt_page_count<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    default: u32,
) -> Result<u32> {
    let prompt = format!("Enter number of pages to scrape (default {}): ", default);
    loop {
        let line = read_line(input, output, &prompt)?;
        if line.is_empty() {
            return Ok(default);
        }
        match line.parse::<u32>() {
            Ok(pages) => return Ok(pages),
            Err(_) => writeln!(output, "'{}' is not a page count. Please try again.", line)?,
        }
    }
}

fn read_line<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> Result<String> {
    write!(output, "{}", prompt)?;
    output
        .flush()
        .context("Failed to flush stdout while prompting for input")?;

    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .context("Failed to read prompt input")?;
    if read == 0 {
        bail!("Input closed before an answer was given");
    }

    Ok(line.trim().to_string())
}

use std::io::{self, BufRead, Write};
use std::path::Path;

use hlsdl_engine::output::default_output_name;
use tracing::{info, warn};

/// Longest extension (including the dot) kept as typed; anything else gets `.mp4`.
const MAX_EXTENSION_LEN: usize = 4;

fn read_line(input: &mut impl BufRead, output: &mut impl Write, prompt: &str) -> io::Result<String> {
    write!(output, "{prompt}")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
    }
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Normalizes a typed file name: adds `.mp4` when the extension is missing or too long.
pub fn with_media_extension(name: &str) -> String {
    let extension_len = Path::new(name)
        .extension()
        .map(|ext| ext.len() + 1)
        .unwrap_or(0);
    if extension_len == 0 || extension_len > MAX_EXTENSION_LEN {
        info!("Added mp4 extension");
        format!("{name}.mp4")
    } else {
        name.to_string()
    }
}

/// Asks for the output file name until an unused one is entered.
///
/// An empty answer selects `<unix timestamp>.mp4`.
pub fn read_output_filename(input: &mut impl BufRead, output: &mut impl Write) -> io::Result<String> {
    loop {
        let line = read_line(input, output, "Filename: ")?;
        if line.is_empty() {
            return Ok(default_output_name());
        }
        let name = with_media_extension(&line);
        if Path::new(&name).exists() {
            warn!("'{name}' already exists");
            continue;
        }
        return Ok(name);
    }
}

/// Asks for the manifest URL until a non-empty one is entered.
pub fn read_url(input: &mut impl BufRead, output: &mut impl Write) -> io::Result<String> {
    loop {
        let line = read_line(input, output, "Enter m3u URL: ")?;
        let line = line.trim();
        if !line.is_empty() {
            return Ok(line.to_string());
        }
    }
}

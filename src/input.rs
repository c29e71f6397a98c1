//! Typed operator input.
//!
//! A reader thread forwards trimmed, non-empty lines; the channel disconnects
//! at EOF so the coordinator can tell "nothing typed yet" from "stdin closed".

use crate::log_debug;
use crossbeam_channel::{unbounded, Receiver};
use std::io::{self, BufRead};
use std::thread;

/// Spawn the stdin reader.
pub fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    spawn_line_reader(io::BufReader::new(io::stdin()))
}

/// Spawn a reader over any line source. The thread ends at EOF or on the
/// first read error.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (sender, receiver) = unbounded();
    thread::Builder::new()
        .name("walkie-stdin".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        log_debug(&format!("stdin read failed: {err}"));
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if sender.send(line.to_string()).is_err() {
                    break;
                }
            }
            log_debug("stdin reader finished");
        })?;
    Ok(receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn forwards_trimmed_lines_then_disconnects() {
        let lines = spawn_line_reader(Cursor::new("  有人吗？ \n\n保存\n")).expect("reader");
        let timeout = Duration::from_secs(1);
        assert_eq!(lines.recv_timeout(timeout).ok().as_deref(), Some("有人吗？"));
        assert_eq!(lines.recv_timeout(timeout).ok().as_deref(), Some("保存"));
        assert!(lines.recv_timeout(timeout).is_err());
    }
}

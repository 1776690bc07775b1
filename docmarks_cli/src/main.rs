//! Docmarks - replays edits against a document and reports mark statistics.
//!
//! Usage: docmarks FILE [insert OFFSET TEXT | remove OFFSET LEN]...
//!
//! `\n` inside TEXT stands for a line feed.

use docmarks_core::{DocumentConfig, DocumentOps, Language, StandardLexer, TextBuffer};
use std::env;
use std::path::Path;
use std::process::ExitCode;

/// One edit given on the command line.
#[derive(Debug)]
enum Command {
    Insert { offset: usize, text: String },
    Remove { offset: usize, len: usize },
}

fn parse_offset(value: Option<&String>, what: &str) -> Result<usize, String> {
    let value = value.ok_or_else(|| format!("missing {what}"))?;
    value
        .parse()
        .map_err(|_| format!("invalid {what} '{value}'"))
}

fn parse_commands(args: &[String]) -> Result<Vec<Command>, String> {
    let mut commands = Vec::new();
    let mut iter = args.iter();
    while let Some(word) = iter.next() {
        let command = match word.as_str() {
            "insert" => {
                let offset = parse_offset(iter.next(), "insert offset")?;
                let text = iter.next().ok_or("missing insert text")?;
                Command::Insert {
                    offset,
                    text: text.replace("\\n", "\n"),
                }
            }
            "remove" => Command::Remove {
                offset: parse_offset(iter.next(), "remove offset")?,
                len: parse_offset(iter.next(), "remove length")?,
            },
            other => return Err(format!("unknown command '{other}'")),
        };
        commands.push(command);
    }
    Ok(commands)
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("Usage: docmarks FILE [insert OFFSET TEXT | remove OFFSET LEN]...");
        return ExitCode::FAILURE;
    };
    let commands = match parse_commands(&args[2..]) {
        Ok(commands) => commands,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("Opening file: {}", path);
    let buffer = match TextBuffer::from_file(path) {
        Ok(buffer) => buffer,
        Err(e) => {
            log::error!("Failed to open file '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };
    let language = Language::from_path(Path::new(path));
    let mut ops = match DocumentOps::with_parts(
        buffer,
        StandardLexer::new(language),
        DocumentConfig::default(),
    ) {
        Ok(ops) => ops,
        Err(e) => {
            log::error!("Failed to set up document: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for command in &commands {
        let result = match command {
            Command::Insert { offset, text } => ops.insert_text(*offset, text),
            Command::Remove { offset, len } => ops.remove_text(*offset, *len),
        };
        match result {
            Ok(edit) => log::info!(
                "{:?} at {}: {} chars, rescan stopped at {:?}",
                edit.kind,
                edit.offset,
                edit.len(),
                edit.syntax_update_offset
            ),
            Err(e) => {
                log::error!("{:?} failed: {}", command, e);
                return ExitCode::FAILURE;
            }
        }
    }

    println!("language:    {}", language.name());
    println!("length:      {}", ops.len());
    println!("lines:       {}", ops.line_count());
    println!("checkpoints: {}", ops.checkpoints().len());
    println!("marks:       {}", ops.marks().len());
    println!("tree depth:  {}", ops.marks().depth());
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        let commands = parse_commands(&args(&["insert", "3", "a\\nb", "remove", "0", "2"])).unwrap();
        assert_eq!(commands.len(), 2);
        match &commands[0] {
            Command::Insert { offset, text } => assert_eq!((*offset, text.as_str()), (3, "a\nb")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(commands[1], Command::Remove { offset: 0, len: 2 }));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_commands(&args(&["insert", "x", "a"])).is_err());
        assert!(parse_commands(&args(&["remove", "1"])).is_err());
        assert!(parse_commands(&args(&["rename"])).is_err());
    }
}

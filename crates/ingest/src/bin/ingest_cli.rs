use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use ingest::{LineSource, UNKNOWN_PROJECT, parse_content};
use usage_core::TokenCounts;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: ingest_cli <path|->");
        std::process::exit(2);
    }

    let path = &args[1];
    let mut data = String::new();
    if path == "-" {
        io::stdin().read_to_string(&mut data).unwrap_or_else(|err| {
            eprintln!("failed to read stdin: {}", err);
            std::process::exit(1);
        });
    } else {
        let bytes = fs::read(path).unwrap_or_else(|err| {
            eprintln!("failed to read {}: {}", path, err);
            std::process::exit(1);
        });
        data = String::from_utf8_lossy(&bytes).to_string();
    }

    let project = Path::new(path)
        .parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| UNKNOWN_PROJECT.to_string());
    let source = LineSource {
        file_path: path,
        project_path: &project,
        file_modified_at: 0,
    };
    let parsed = parse_content(&data, &source);

    let tokens = parsed
        .entries
        .iter()
        .fold(TokenCounts::default(), |acc, entry| acc.add(entry.tokens));
    let cost: f64 = parsed.entries.iter().map(|entry| entry.cost_usd).sum();

    println!("lines {}", parsed.line_count);
    println!("entries {}", parsed.entries.len());
    println!("errors {}", parsed.errors.len());
    println!("input_tokens {}", tokens.input_tokens);
    println!("output_tokens {}", tokens.output_tokens);
    println!("cache_creation_input_tokens {}", tokens.cache_creation_input_tokens);
    println!("cache_read_input_tokens {}", tokens.cache_read_input_tokens);
    println!("total_tokens {}", tokens.total());
    println!("cost_usd {:.6}", cost);

    for error in &parsed.errors {
        match error.line_number {
            Some(line) => eprintln!("line {}: {}", line, error.message),
            None => eprintln!("{}", error.message),
        }
    }
    if parsed.entries.is_empty() {
        std::process::exit(3);
    }
}

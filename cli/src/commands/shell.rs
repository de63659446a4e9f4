//! # Shell Command
//!
//! Interactive question loop. One pipeline, and therefore one result
//! cache, serves every question asked in the session.
//!
//! Meta commands: `:stats`, `:clear`, `:help`, `:quit`.

use std::io::Write;

use anyhow::Result;
use askdb_rag::{AskOptions, SqlPipeline};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::context;
use crate::errors::report_rag_error;
use crate::exit_codes::*;
use crate::output::print_answer;

#[derive(Debug)]
pub struct ShellArgs {
    /// Run every generated query
    pub execute: bool,
    pub limit: Option<usize>,
    pub verbose: bool,
}

/// What one line of input asks the shell to do.
#[derive(Debug, PartialEq, Eq)]
pub enum ShellInput<'a> {
    Question(&'a str),
    Stats,
    Clear,
    Help,
    Quit,
    Empty,
    Unknown(&'a str),
}

pub fn parse_input(line: &str) -> ShellInput<'_> {
    let line = line.trim();
    match line {
        "" => ShellInput::Empty,
        ":stats" => ShellInput::Stats,
        ":clear" => ShellInput::Clear,
        ":help" | ":h" | "?" => ShellInput::Help,
        ":quit" | ":q" | ":exit" | "exit" | "quit" => ShellInput::Quit,
        meta if meta.starts_with(':') => ShellInput::Unknown(meta),
        question => ShellInput::Question(question),
    }
}

pub async fn execute(args: ShellArgs, config: &Config) -> Result<i32> {
    let pipeline = match context::pipeline(config).await {
        Ok(pipeline) => pipeline,
        Err(e) => return Ok(report_rag_error(&e, args.verbose)),
    };

    println!("{}", "askdb shell".bold());
    println!(
        "{}",
        "Ask a question, or :help for commands. Ctrl-D to leave.".dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", "askdb>".cyan().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        match parse_input(&line) {
            ShellInput::Empty => continue,
            ShellInput::Quit => break,
            ShellInput::Help => print_help(),
            ShellInput::Stats => print_stats(&pipeline),
            ShellInput::Clear => {
                pipeline.cache().clear();
                println!("{} Cache cleared", "✓".green().bold());
            }
            ShellInput::Unknown(command) => {
                println!("{} Unknown command {command}, try :help", "⚠".yellow().bold());
            }
            ShellInput::Question(question) => {
                let options = AskOptions {
                    execute: args.execute,
                    limit: args.limit,
                    top_k: None,
                };
                match pipeline.answer(question, &options).await {
                    Ok(answer) => print_answer(&answer, args.verbose),
                    Err(e) => {
                        report_rag_error(&e, args.verbose);
                    }
                }
                println!();
            }
        }
    }

    Ok(EXIT_SUCCESS)
}

fn print_help() {
    println!("  {}  result cache statistics", ":stats".cyan());
    println!("  {}  empty the result cache", ":clear".cyan());
    println!("  {}   leave the shell", ":quit".cyan());
}

fn print_stats(pipeline: &SqlPipeline) {
    let stats = pipeline.cache().stats();
    println!(
        "  {} {}/{}",
        "Entries:".dimmed(),
        stats.size,
        stats.max_size
    );
    println!(
        "  {} {} hits, {} misses ({:.1}%)",
        "Lookups:".dimmed(),
        stats.hits,
        stats.misses,
        stats.hit_rate * 100.0
    );
}

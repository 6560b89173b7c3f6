//! latebind CLI: drive the demo automation object by name

mod args;
mod demo;
mod output;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use latebind::{CallKind, ConversionRegistry, Dispatch, ForeignHeap, InvokeConfig, Invoker, Value};

use args::{parse_literal, Cli, Commands};
use output::{CallReport, FailureReport, MemberReport};

fn main() -> ExitCode {
    // LATEBIND_LOG=debug for call tracing, LATEBIND_LOG=trace for every phase
    let filter = EnvFilter::try_from_env("LATEBIND_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let registry = ConversionRegistry::shared();
    let heap = ForeignHeap::shared();
    let object = demo::build(&registry);
    let config = InvokeConfig::new()
        .with_enum_batch_size(cli.batch)
        .with_trace(cli.trace);
    let invoker = Invoker::new(Arc::clone(&registry), Arc::clone(&heap)).with_config(config);

    let code = match cli.command {
        Commands::Members { json } => {
            let info = object
                .type_info()
                .map_err(|status| anyhow::anyhow!("{} has no type information: {}", object.name(), status))?;
            let members: Vec<MemberReport> = info.members.iter().map(MemberReport::from).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&members)?);
            } else {
                for member in &members {
                    println!("{}", member.to_text());
                }
            }
            ExitCode::SUCCESS
        }
        Commands::Call {
            member,
            args,
            kind,
            json,
        } => {
            let args = args
                .iter()
                .map(|text| parse_literal(text))
                .collect::<anyhow::Result<Vec<Value>>>()
                .context("parsing arguments")?;
            let kind = CallKind::from(kind);
            let target = Arc::clone(&object).into_ref();
            match invoker.call(&*target, &member, kind, &args) {
                Ok(value) => {
                    let report = CallReport::new(&member, kind, &value);
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        println!("{}", report.display);
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    let report = FailureReport::from(&e);
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        eprintln!("{}", report.to_text());
                    }
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Enumerate { json } => {
            let target = Arc::clone(&object).into_ref();
            let mut items = Vec::new();
            let walked = invoker.for_each(&*target, |value| items.push(value));
            if let Err(e) = walked {
                eprintln!("{}", FailureReport::from(&e).to_text());
                return Ok(ExitCode::FAILURE);
            }
            if json {
                let values: Vec<serde_json::Value> = items.iter().map(output::to_json).collect();
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else {
                for (index, item) in items.iter().enumerate() {
                    println!("{:>4}  {}", index + 1, item);
                }
            }
            ExitCode::SUCCESS
        }
    };

    if !heap.is_clean() {
        tracing::warn!(
            strings = heap.live_strings(),
            "foreign heap still holds allocations at exit"
        );
    }
    Ok(code)
}

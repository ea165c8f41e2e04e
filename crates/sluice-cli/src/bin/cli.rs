use clap::{value_parser, Arg, ArgMatches, Command};
use sluice::prelude::*;
use sluice::{CpuBackendConfig, LoopReport, RuntimeConfig};

pub fn start_logger(level: log::LevelFilter) {
    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply();
    match logger {
        Ok(_) => log::info!("Logging initialized."),
        Err(error) => eprintln!("Error initializing logging: {:?}", error),
    }
}

fn print_result<T: serde::Serialize>(report: LoopReport, values: Vec<T>) -> anyhow::Result<()> {
    let out = serde_json::json!({
        "iterations": report.iterations,
        "values": values,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// `a += 1`, `niters` times.
fn handle_increment(rt: &mut Runtime<CpuBackend>, matches: &ArgMatches) -> anyhow::Result<()> {
    let len = *matches.get_one::<usize>("len").unwrap_or(&4);
    let niters = matches.get_one::<u64>("niters").copied();
    let a = rt.zeros(shape![len], DType::F64)?;
    let report = do_while(rt, niters, |rt| {
        rt.ufunc(Opcode::Add, &[(&a).into(), (&a).into(), 1.0.into()])?;
        Ok(None)
    })?;
    let values = rt.to_vec::<f64>(&a)?;
    print_result(report, values)
}

/// `a += 1` while `sum(a) < limit`.
fn handle_while_below(rt: &mut Runtime<CpuBackend>, matches: &ArgMatches) -> anyhow::Result<()> {
    let len = *matches.get_one::<usize>("len").unwrap_or(&4);
    let limit = *matches.get_one::<i64>("limit").unwrap_or(&10);
    let a = rt.zeros(shape![len], DType::I64)?;
    let report = do_while(rt, None, |rt| {
        rt.ufunc(Opcode::Add, &[(&a).into(), (&a).into(), 1.into()])?;
        let total = rt.sum(&a)?;
        let cond = rt.less(&total, limit)?;
        rt.release_view(&total)?;
        Ok(Some(cond))
    })?;
    let values = rt.to_vec::<i64>(&a)?;
    print_result(report, values)
}

/// Running product of `1..=len` computed with a sliding view.
fn handle_cumprod(rt: &mut Runtime<CpuBackend>, matches: &ArgMatches) -> anyhow::Result<()> {
    let len = *matches.get_one::<i64>("len").unwrap_or(&5);
    let a = rt.arange(1, len + 1, DType::I64)?;
    let report = do_while(rt, Some(len as u64 - 1), |rt| {
        let i = rt.iterator(1);
        let current = a.at(&idx![i])?;
        let previous = a.at(&idx![i - 1])?;
        rt.ufunc(
            Opcode::Multiply,
            &[(&current).into(), (&current).into(), (&previous).into()],
        )?;
        Ok(None)
    })?;
    let values = rt.to_vec::<i64>(&a)?;
    print_result(report, values)
}

fn main() -> anyhow::Result<()> {
    let matches = Command::new("sluice")
        .about("Runs recorded array loops on the reference backend")
        .version("0.1.0")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .global(true)
                .help("Increase log verbosity"),
        )
        .arg(
            Arg::new("memory-limit")
                .long("memory-limit")
                .global(true)
                .value_parser(value_parser!(usize))
                .help("Bytes the backend may allocate; defaults to SLUICE_MEMORY_LIMIT"),
        )
        .subcommand(
            Command::new("increment")
                .about("Adds one to an array a fixed number of times.")
                .arg(
                    Arg::new("len")
                        .short('l')
                        .long("len")
                        .default_value("4")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("niters")
                        .short('n')
                        .long("niters")
                        .default_value("5")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("while-below")
                .about("Adds one to an array until its sum reaches a limit.")
                .arg(
                    Arg::new("len")
                        .short('l')
                        .long("len")
                        .default_value("4")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .default_value("10")
                        .value_parser(value_parser!(i64)),
                ),
        )
        .subcommand(
            Command::new("cumprod")
                .about("Running product of 1..=len using a sliding view.")
                .arg(
                    Arg::new("len")
                        .short('l')
                        .long("len")
                        .default_value("5")
                        .value_parser(value_parser!(i64).range(2..)),
                ),
        )
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    start_logger(level);

    let mut backend_config = CpuBackendConfig::from_env();
    if let Some(limit) = matches.get_one::<usize>("memory-limit") {
        backend_config.memory_limit = Some(*limit);
    }
    let mut rt = Runtime::with_config(CpuBackend::new(backend_config), RuntimeConfig::from_env());

    let outcome = match matches.subcommand() {
        Some(("increment", sub)) => handle_increment(&mut rt, sub),
        Some(("while-below", sub)) => handle_while_below(&mut rt, sub),
        Some(("cumprod", sub)) => handle_cumprod(&mut rt, sub),
        _ => unreachable!(),
    };
    rt.reset()?;
    outcome
}

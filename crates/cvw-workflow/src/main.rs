//! `cvw`: inspect the transition table and run the workflow simulator

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use cvw_workflow::config::EngineConfig;
use cvw_workflow::state_machine;
use cvw_workflow::telemetry::init_logging;
use cvw_workflow::test_harness::{run_simulator, SimulatorConfig};
use cvw_workflow::types::{DocumentRef, DocumentType, WorkflowState};

fn cli() -> Command {
    Command::new("cvw")
        .version(cvw_workflow::VERSION)
        .about("Carbon-credit project verification workflow")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("FILE")
                .help("TOML engine configuration"),
        )
        .subcommand(
            Command::new("transitions")
                .about("List states reachable from a state and what each requires")
                .arg(Arg::new("state").required(true).help("Current state, e.g. in-progress")),
        )
        .subcommand(
            Command::new("missing")
                .about("Show documents missing for a hypothetical transition")
                .arg(Arg::new("from").long("from").required(true).help("Current state"))
                .arg(Arg::new("to").long("to").required(true).help("Target state"))
                .arg(
                    Arg::new("doc")
                        .long("doc")
                        .action(ArgAction::Append)
                        .help("Document type already present (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run the randomized workflow simulator")
                .arg(
                    Arg::new("projects")
                        .long("projects")
                        .default_value("8")
                        .value_parser(value_parser!(usize))
                        .help("Projects driven concurrently"),
                )
                .arg(
                    Arg::new("steps")
                        .long("steps")
                        .default_value("200")
                        .value_parser(value_parser!(u64))
                        .help("Operations per project"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("contenders")
                        .long("contenders")
                        .default_value("8")
                        .value_parser(value_parser!(usize))
                        .help("Concurrent requests fired at one project"),
                )
                .arg(
                    Arg::new("keep-going")
                        .long("keep-going")
                        .action(ArgAction::SetTrue)
                        .help("Continue after the first violation"),
                ),
        )
}

fn parse_state(matches: &ArgMatches, name: &str) -> Result<WorkflowState> {
    let raw = matches
        .get_one::<String>(name)
        .with_context(|| format!("missing --{name}"))?;
    Ok(raw.parse()?)
}

fn print_transitions(from: WorkflowState) {
    println!("From {from}:");
    for target in state_machine::allowed_transitions(from) {
        let required = state_machine::required_documents(*target);
        if required.is_empty() {
            println!("  -> {target}");
        } else {
            let names: Vec<_> = required.iter().map(DocumentType::as_str).collect();
            println!("  -> {target} (requires {})", names.join(", "));
        }
    }
}

fn print_missing(matches: &ArgMatches) -> Result<bool> {
    let from = parse_state(matches, "from")?;
    let to = parse_state(matches, "to")?;
    let documents: Vec<DocumentRef> = matches
        .get_many::<String>("doc")
        .into_iter()
        .flatten()
        .map(|tag| DocumentRef::new(tag.as_str()))
        .collect();

    if !state_machine::is_reachable(from, to) {
        println!("{to} is not reachable from {from}");
        return Ok(false);
    }
    let missing = state_machine::missing_documents(to, &documents);
    if missing.is_empty() {
        println!("{from} -> {to}: all prerequisites present");
        Ok(true)
    } else {
        println!("{from} -> {to}: missing");
        for document_type in &missing {
            println!("  {document_type}");
        }
        Ok(false)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config from {path}"))?,
        None => EngineConfig::default(),
    };
    init_logging(&config.logging);

    match matches.subcommand() {
        Some(("transitions", args)) => {
            print_transitions(parse_state(args, "state")?);
        }
        Some(("missing", args)) => {
            if !print_missing(args)? {
                std::process::exit(1);
            }
        }
        Some(("simulate", args)) => {
            let sim = SimulatorConfig {
                seed: *args.get_one::<u64>("seed").context("seed")?,
                projects: *args.get_one::<usize>("projects").context("projects")?,
                steps_per_project: *args.get_one::<u64>("steps").context("steps")?,
                contenders: *args.get_one::<usize>("contenders").context("contenders")?,
                stop_on_first_violation: !args.get_flag("keep-going"),
                engine: config,
            };

            println!("Running workflow simulator...");
            println!("Projects: {}", sim.projects);
            println!("Steps per project: {}", sim.steps_per_project);
            println!("Seed: {}", sim.seed);
            println!();

            let report = run_simulator(sim).await;
            println!("{}", report.generate_text());

            if !report.passed() {
                std::process::exit(1);
            }
        }
        Some((other, _)) => bail!("unknown command {other}"),
        None => bail!("no command given"),
    }

    Ok(())
}

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use hydrobench_core::benchmark::{
    run_all, run_exphydro_internals, run_gr4j, write_exphydro_internals, write_gr4j_internals, Variant,
};
use hydrobench_core::config::{import_from_toml, BenchmarkConfig, Gr4jConfig};
use hydrobench_core::forcing::{Forcing, Gr4jForcing};
use std::path::PathBuf;

fn command() -> Command {
    Command::new("hydrobench")
        .about("Benchmarks ODE and implicit-Euler solutions of the ExpHydro bucket model.")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("path")
                .help("Path of a TOML config file; defaults are used when omitted")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("data")
                .long("data")
                .short('d')
                .help("Forcing CSV with tmean(C), dayl(day), prcp(mm/day) and flow(mm) columns")
                .value_name("CSV"),
        )
        .arg(
            Arg::new("length")
                .long("length")
                .short('n')
                .help("Number of forcing rows to use")
                .value_name("ROWS")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("variant")
                .long("variant")
                .short('s')
                .help("Variants to run: tsit5, rk45, rk4, implicit-euler")
                .value_name("NAME")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("repeats")
                .long("repeats")
                .short('r')
                .help("Timed repetitions per variant")
                .value_name("NUM")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("gradient")
                .long("gradient")
                .short('g')
                .help("Also compute the loss gradient for differentiable variants")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("exphydro-internals")
                .long("exphydro-internals")
                .help("Write daily states and fluxes of the implicit-euler ExpHydro unit to this CSV")
                .value_name("CSV"),
        )
        .arg(
            Arg::new("gr4j")
                .long("gr4j")
                .help("Run the GR4J element model on this CSV (prec, pet columns)")
                .value_name("CSV"),
        )
        .arg(
            Arg::new("internals")
                .long("internals")
                .help("Write GR4J internals to this CSV")
                .value_name("CSV"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Raise the logging level; repeat for more")
                .action(ArgAction::Count),
        )
}

/// Loads the config file, if any, and applies command line overrides.
fn configure(matches: &ArgMatches) -> Result<BenchmarkConfig> {
    let mut config = match matches.get_one::<String>("path") {
        Some(path) => import_from_toml::<BenchmarkConfig>(path)?,
        None => BenchmarkConfig::default(),
    };

    if let Some(data) = matches.get_one::<String>("data") {
        config.data_path = PathBuf::from(data);
    }
    if let Some(&length) = matches.get_one::<usize>("length") {
        config.data_length = Some(length);
    }
    if let Some(names) = matches.get_many::<String>("variant") {
        config.variants = names
            .map(|name| name.parse::<Variant>())
            .collect::<Result<Vec<_>>>()?;
    }
    if let Some(&repeats) = matches.get_one::<usize>("repeats") {
        config.repeats = repeats;
    }
    if matches.get_flag("gradient") {
        config.gradient = true;
    }
    if let Some(path) = matches.get_one::<String>("exphydro-internals") {
        config.internals_csv = Some(PathBuf::from(path));
    }
    if let Some(path) = matches.get_one::<String>("gr4j") {
        config.gr4j.get_or_insert_with(Gr4jConfig::default).data_path = PathBuf::from(path);
    }
    if let Some(path) = matches.get_one::<String>("internals") {
        config.gr4j.get_or_insert_with(Gr4jConfig::default).internals_csv = Some(PathBuf::from(path));
    }
    config.logging.level += matches.get_count("verbose") as usize;

    Ok(config)
}

fn main() -> Result<()> {
    let matches = command().get_matches();
    let config = configure(&matches)?;

    // Build environment logger.
    env_logger::builder().filter_level(config.logging.filter()).init();

    log::info!("Forcing: {}", config.data_path.display());
    log::info!("Logging Level: {}", config.logging.filter());
    log::info!(
        "Variants: {}",
        config
            .variants
            .iter()
            .map(|v| v.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let reports = run_all(&config)?;
    println!("{}", serde_json::to_string_pretty(&reports)?);

    if let Some(path) = &config.internals_csv {
        let length = config.data_length_for(Variant::ImplicitEuler);
        let forcing = Forcing::from_path(&config.data_path, Some(length))?;
        let internals = run_exphydro_internals(&config, &forcing)?;
        write_exphydro_internals(path, &internals).context("Failed to export ExpHydro internals")?;
        log::info!("ExpHydro internals written to {}", path.display());
    }

    if let Some(gr4j) = &config.gr4j {
        let forcing = Gr4jForcing::from_path(&gr4j.data_path, gr4j.data_length)?;
        let report = run_gr4j(gr4j, &forcing, config.root_finder, config.repeats)?;
        println!("{}", serde_json::to_string_pretty(&report)?);

        if let Some(path) = &gr4j.internals_csv {
            write_gr4j_internals(path, &report.internals)
                .context("Failed to export GR4J internals")?;
            log::info!("GR4J internals written to {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<BenchmarkConfig> {
        let matches = command().try_get_matches_from(args.iter().copied())?;
        configure(&matches)
    }

    #[test]
    fn defaults_without_arguments() {
        let config = parse(&["hydrobench"]).expect("defaults parse");
        assert_eq!(config, BenchmarkConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "hydrobench",
            "--data",
            "forcing.csv",
            "-n",
            "365",
            "--variant",
            "tsit5,rk4",
            "-g",
            "--internals",
            "out.csv",
            "--exphydro-internals",
            "states.csv",
            "-vv",
        ])
        .expect("flags parse");
        assert_eq!(config.data_path, PathBuf::from("forcing.csv"));
        assert_eq!(config.data_length, Some(365));
        assert_eq!(config.variants, vec![Variant::Tsit5, Variant::Rk4]);
        assert!(config.gradient);
        assert_eq!(config.internals_csv, Some(PathBuf::from("states.csv")));
        let gr4j = config.gr4j.expect("internals imply a GR4J run");
        assert_eq!(gr4j.internals_csv, Some(PathBuf::from("out.csv")));
        assert_eq!(config.logging.level, 4);
    }

    #[test]
    fn bad_variant_is_an_error() {
        let err = parse(&["hydrobench", "--variant", "euler"]).expect_err("unknown variant");
        assert!(format!("{err}").contains("Unknown variant"));
    }

    #[test]
    fn command_is_well_formed() {
        command().debug_assert();
    }
}

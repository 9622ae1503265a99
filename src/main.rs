// Copyright 2024 by the alocador developers
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::fs::File;

use alocador::{classes, io, loader, milp};

use log::{debug, error, info, warn};

fn main() {
    // Setup logging & parse command line arguments
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!(
        "This is the class allocation optimizer (alocador), version {}",
        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
    );
    let args = parse_cli_args();

    if args.get_one::<String>("OUTPUT").is_none() && !args.get_flag("print") {
        warn!(
            "No OUTPUT file and no --print option given. The allocation will not be exported \
             anywhere."
        );
    }

    // Open and read input table document
    let inpath: &String = args.get_one("INPUT").unwrap();
    debug!("Opening input file {} ...", inpath);
    let file = File::open(inpath).unwrap_or_else(|e| {
        error!("Could not open input file {}: {}", inpath, e);
        std::process::exit(exitcode::NOINPUT)
    });
    let data = io::dataset::read(file).unwrap_or_else(|e| {
        error!("Could not read input file: {}", e);
        std::process::exit(exitcode::DATAERR)
    });

    // Derive the model inputs
    let params = loader::parameters(&data).unwrap_or_else(|e| {
        error!("Invalid tuning parameters: {}", e);
        std::process::exit(exitcode::DATAERR)
    });
    let (enrolled, waitlisted) = loader::load_students(&data, &params).unwrap_or_else(|e| {
        error!("Could not load students: {}", e);
        std::process::exit(exitcode::DATAERR)
    });
    let candidate_classes = classes::build_candidate_classes(&data, &params, &enrolled, &waitlisted)
        .unwrap_or_else(|e| {
            error!("Could not build the candidate class set: {}", e);
            std::process::exit(exitcode::DATAERR)
        });

    // In debug build: Check consistency of the derived data
    if cfg!(debug_assertions) {
        io::assert_data_consistency(&enrolled, &waitlisted, &candidate_classes);
    }

    info!(
        "Found {} candidate classes, {} enrolled and {} waitlisted students for allocation.",
        candidate_classes.len(),
        enrolled.len(),
        waitlisted.len()
    );
    debug!(
        "Candidate classes:\n{}",
        io::debug_list_of_classes(&candidate_classes)
    );

    // Build and solve the allocation model
    let result = milp::solve(&params, &enrolled, &waitlisted, &candidate_classes)
        .unwrap_or_else(|e| {
            error!("{}", e);
            std::process::exit(exitcode::SOFTWARE)
        });

    match result {
        Some(allocation) => {
            println!("Alocação realizada com sucesso!");
            info!("Solution found with objective value {}.", allocation.objective);
            info!(
                "{} of {} students placed, {} of {} classes opened.",
                allocation.enrolled.iter().filter(|p| p.is_some()).count()
                    + allocation.waitlisted.iter().filter(|p| p.is_some()).count(),
                enrolled.len() + waitlisted.len(),
                allocation.opened.iter().filter(|o| **o).count(),
                candidate_classes.len()
            );

            if let Some(outpath) = args.get_one::<String>("OUTPUT") {
                let tables = io::dataset::solution_tables(
                    &data,
                    &params,
                    &enrolled,
                    &waitlisted,
                    &candidate_classes,
                    &allocation,
                );
                write_solution(outpath, &tables);
            }

            if args.get_flag("print") {
                print!(
                    "The allocation is:\n{}",
                    io::format_allocation(&allocation, &candidate_classes, &enrolled, &waitlisted)
                );
            }
        }
        None => {
            println!("Não há solução!");
            if let Some(outpath) = args.get_one::<String>("OUTPUT") {
                write_solution(outpath, &io::dataset::SolutionTables::empty());
            }
        }
    }
}

/// Replace the solution tables in the output file
fn write_solution(outpath: &str, tables: &io::dataset::SolutionTables) {
    debug!("Opening output file {} ...", outpath);
    match File::create(outpath) {
        Err(e) => error!("Could not open output file {}: {}.", outpath, e),
        Ok(file) => match io::dataset::write(file, tables) {
            Ok(_) => debug!("Solution tables written to {}.", outpath),
            Err(e) => error!("Could not write solution tables to {}: {}.", outpath, e),
        },
    }
}

/// Helper function to construct and execute parser for command line options
fn parse_cli_args() -> clap::ArgMatches {
    clap::command!()
        .arg(
            clap::Arg::new("print")
                .short('p')
                .long("print")
                .help("Print the calculated allocation to stdout in a human readable format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("INPUT")
                .help("Sets the input table document to use")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::new("OUTPUT")
                .help("Sets the output file for the solution tables")
                .index(2),
        )
        .get_matches()
}

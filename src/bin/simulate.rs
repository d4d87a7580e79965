use monaco::{simulate, ErrorEnvelope, SimulationRequest};
use std::env;
use std::error::Error;
use std::fs::read_to_string;
use std::time::Instant;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: simulate <request.json>");
        std::process::exit(2);
    }

    let payload = read_to_string(&args[1])?;
    let request: SimulationRequest = serde_json::from_str(&payload)?;

    let started = Instant::now();
    match simulate(&request) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            eprintln!(
                "{} scenarios in {:.2?}",
                report.num_iterations,
                started.elapsed()
            );
            Ok(())
        }
        Err(err) => {
            let envelope = ErrorEnvelope::from(&err);
            eprintln!("{}", serde_json::to_string_pretty(&envelope)?);
            std::process::exit(1);
        }
    }
}

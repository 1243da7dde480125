/*
Mail-merge sender.

To run it, use the following command from the project root:

cargo run --bin mail_merge -- [OPTIONS]

OPTIONS:
    -r, --restart            Send from the start, don't resume
    -d, --job-dir <DIR>      Job directory, relative to the executable (default: job0)

The job directory must contain config.json, the shared templates
(subject.txt, body.txt and/or body.html) and one subdirectory per recipient
with at least an email.txt. Progress is kept in <DIR>/redo.log.

SMTP_PASSWORD may be set in the environment or in a .env file when
config.json carries no password; otherwise it is asked for interactively.
*/
use std::env;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Arg, Command};
use dotenv::dotenv;
use log::{error, info};

use simple_mail_merge::{logging, JobRunner};

const DEFAULT_JOB_DIR: &str = "job0";

/// Joins `job_dir` onto the directory holding the executable. An absolute
/// `job_dir` replaces it.
fn resolve_job_dir(job_dir: &str) -> std::io::Result<PathBuf> {
    let exe = env::current_exe()?;
    let base = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(base.join(job_dir))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let matches = Command::new("Mails sender")
        .version("0.2")
        .about("Sends one mail per recipient directory, resuming where the last run stopped")
        .arg(Arg::new("restart")
            .short('r')
            .long("restart")
            .help("Send from the start, don't resume"))
        .arg(Arg::new("job-dir")
            .short('d')
            .long("job-dir")
            .value_name("DIR")
            .help("Job directory")
            .default_value(DEFAULT_JOB_DIR)
            .takes_value(true))
        .get_matches();

    let restart = matches.is_present("restart");
    let job_dir = resolve_job_dir(matches.value_of("job-dir").unwrap_or(DEFAULT_JOB_DIR))?;

    logging::init(&job_dir)?;
    info!("=== New session ===");

    let mut job = match JobRunner::load(&job_dir, restart) {
        Ok(job) => job,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = job.run().await {
        error!("{}", e);
        job.dispose();
        process::exit(1);
    }

    Ok(())
}

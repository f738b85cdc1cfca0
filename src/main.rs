use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use iriscapture_lib::RunOptions;

#[derive(Parser)]
#[command(name = "iriscapture")]
#[command(about = "Hands-free eye capture: waits for a steady, well-framed eye and takes the picture")]
#[command(version)]
struct Cli {
    /// Settings file (default: {config_dir}/IrisCapture/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Image file the camera keeps overwriting with its latest frame
    #[arg(short, long)]
    frame: Option<PathBuf>,

    /// Base URL of the eye detection service
    #[arg(long)]
    detection_url: Option<String>,

    /// Where captures are saved (default: ~/Pictures/IrisCapture)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Exit after the first capture
    #[arg(long)]
    once: bool,

    /// Disable countdown tones
    #[arg(long)]
    no_audio: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let options = RunOptions {
        config_path: cli.config,
        frame_source: cli.frame,
        detection_url: cli.detection_url,
        output_dir: cli.output_dir,
        no_audio: cli.no_audio,
        once: cli.once,
    };

    match iriscapture_lib::run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("iriscapture: {err}");
            ExitCode::FAILURE
        }
    }
}
